//! Pairing code documents
//!
//! A [`CodeRecord`] is one outstanding code: the 6-digit value the user types
//! on the companion device, the account it belongs to and when it stops being
//! redeemable. Records are immutable once written.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Number of digits in a pairing code
pub const CODE_LENGTH: usize = 6;

/// Rejected pairing code input
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("pairing code must be exactly {CODE_LENGTH} digits")]
pub struct MalformedCode;

/// A well-formed 6-digit pairing code
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PairingCode(String);

impl PairingCode {
    /// Validate user input as a pairing code
    pub fn parse(s: &str) -> Result<Self, MalformedCode> {
        if s.len() == CODE_LENGTH && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(MalformedCode)
        }
    }

    /// Generate a random zero-padded code
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let value: u32 = rng.gen_range(0..1_000_000);
        Self(format!("{:06}", value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Code with all but the last two digits masked, for logs
    pub fn redacted(&self) -> String {
        format!("****{}", &self.0[CODE_LENGTH - 2..])
    }
}

impl TryFrom<String> for PairingCode {
    type Error = MalformedCode;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PairingCode> for String {
    fn from(code: PairingCode) -> Self {
        code.0
    }
}

impl fmt::Display for PairingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque document identifier of a code record
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CodeId(pub Uuid);

impl CodeId {
    /// Generate a new random document ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the account that owns a code
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One outstanding pairing code document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeRecord {
    /// Document identifier, used for delete-by-reference
    pub id: CodeId,
    /// The code value
    pub code: PairingCode,
    /// Owning account
    pub user_id: UserId,
    /// Instant after which the code can no longer be redeemed
    pub expiry_time: DateTime<Utc>,
}

impl CodeRecord {
    /// Create a record with an explicit expiry
    pub fn new(code: PairingCode, user_id: UserId, expiry_time: DateTime<Utc>) -> Self {
        Self {
            id: CodeId::new(),
            code,
            user_id,
            expiry_time,
        }
    }

    /// Issue a fresh random code for `user_id`, valid for `ttl` from `now`.
    /// Returns `None` when the expiry is not representable.
    pub fn issue(user_id: UserId, now: DateTime<Utc>, ttl: Duration) -> Option<Self> {
        let expiry_time = now.checked_add_signed(ttl)?;
        Some(Self::new(PairingCode::generate(), user_id, expiry_time))
    }

    /// Whether the code can still be redeemed at `now`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time > now
    }

    /// Whether the sweeper may delete this record at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_time < now
    }

    /// Seconds left before expiry, clamped at zero
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> i64 {
        (self.expiry_time - now).num_seconds().max(0)
    }
}
