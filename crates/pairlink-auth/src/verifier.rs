//! Pairing code redemption
//!
//! Redeeming a code:
//! 1. Reject anything that is not six ASCII digits before touching a store
//! 2. Look up one document with a matching code whose expiry is in the future
//! 3. Load the owner's profile; a missing profile deletes the orphaned code
//! 4. Issue a token, then delete the matched document by its id
//!
//! The delete is keyed by the document id read in step 2 and happens only
//! after the token was issued. Of any number of concurrent redemptions of the
//! same code, only the caller whose delete actually removed the document is
//! told it succeeded. A failed or timed-out issuance leaves the code in place.

use crate::code::{PairingCode, UserId};
use crate::storage::{CodeQuery, CodeStore, ProfileStore};
use crate::token::TokenIssuer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default upper bound on a single token issuance
pub const DEFAULT_ISSUE_TIMEOUT: Duration = Duration::from_secs(10);

/// Message returned for codes that cannot be redeemed
pub const INVALID_OR_EXPIRED_MESSAGE: &str = "Invalid or expired code";

/// Message returned when a code's owner has no profile
pub const USER_NOT_FOUND_MESSAGE: &str = "User not found";

/// Failures surfaced to the caller of [`PairingVerifier::verify`]
///
/// A code that simply does not redeem is not an error; see [`VerifyOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("The code must be a 6-digit number")]
    InvalidArgument,
    #[error("Error processing request, please try again")]
    Internal,
}

impl VerifyError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            VerifyError::InvalidArgument => "invalid-argument",
            VerifyError::Internal => "internal",
        }
    }
}

/// Log the underlying failure and collapse it into [`VerifyError::Internal`]
fn internal(context: &str, err: impl Display) -> VerifyError {
    error!("Pairing verification failed while {}: {}", context, err);
    VerifyError::Internal
}

/// Why a well-formed code did not redeem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Never existed, already redeemed or expired; deliberately not told apart
    InvalidOrExpired,
    /// The code matched but its owner has no profile
    UserNotFound,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::InvalidOrExpired => "invalid_or_expired",
            RejectReason::UserNotFound => "user_not_found",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RejectReason::InvalidOrExpired => INVALID_OR_EXPIRED_MESSAGE,
            RejectReason::UserNotFound => USER_NOT_FOUND_MESSAGE,
        }
    }
}

/// A successful redemption
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairedSession {
    pub token: String,
    pub user_id: UserId,
    pub display_name: String,
    pub expires_at: DateTime<Utc>,
}

/// Result of a verification that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Paired(PairedSession),
    Rejected(RejectReason),
}

impl VerifyOutcome {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerifyOutcome::Paired(_))
    }
}

/// Request body for code verification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    /// The code typed on the companion device
    #[serde(default)]
    pub code: String,
}

/// Wire shape of a verification outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<RejectReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<VerifyOutcome> for VerifyResponse {
    fn from(outcome: VerifyOutcome) -> Self {
        match outcome {
            VerifyOutcome::Paired(session) => Self {
                valid: true,
                token: Some(session.token),
                user_id: Some(session.user_id.to_string()),
                display_name: Some(session.display_name),
                expires_at: Some(session.expires_at),
                reason: None,
                message: None,
            },
            VerifyOutcome::Rejected(reason) => Self {
                valid: false,
                token: None,
                user_id: None,
                display_name: None,
                expires_at: None,
                reason: Some(reason),
                message: Some(reason.message().to_string()),
            },
        }
    }
}

/// Redeems pairing codes for companion tokens
pub struct PairingVerifier {
    codes: Arc<dyn CodeStore>,
    profiles: Arc<dyn ProfileStore>,
    issuer: Arc<dyn TokenIssuer>,
    issue_timeout: Duration,
}

impl PairingVerifier {
    /// Create a verifier with the default issuance timeout
    pub fn new(
        codes: Arc<dyn CodeStore>,
        profiles: Arc<dyn ProfileStore>,
        issuer: Arc<dyn TokenIssuer>,
    ) -> Self {
        Self {
            codes,
            profiles,
            issuer,
            issue_timeout: DEFAULT_ISSUE_TIMEOUT,
        }
    }

    /// Builder pattern: set the issuance timeout
    pub fn with_issue_timeout(mut self, timeout: Duration) -> Self {
        self.issue_timeout = timeout;
        self
    }

    /// Verify a submitted code and redeem it
    pub async fn verify(&self, submitted: &str) -> Result<VerifyOutcome, VerifyError> {
        self.verify_at(submitted, Utc::now()).await
    }

    /// Verify a submitted code against the clock reading `now`
    pub async fn verify_at(
        &self,
        submitted: &str,
        now: DateTime<Utc>,
    ) -> Result<VerifyOutcome, VerifyError> {
        let code = PairingCode::parse(submitted).map_err(|_| VerifyError::InvalidArgument)?;

        let query = CodeQuery::new().code_eq(code.clone()).expires_after(now).limit(1);
        let matched = self
            .codes
            .query(&query)
            .await
            .map_err(|e| internal("looking up code", e))?;

        let Some(record) = matched.into_iter().next() else {
            debug!("No redeemable pairing code {}", code.redacted());
            return Ok(VerifyOutcome::Rejected(RejectReason::InvalidOrExpired));
        };

        let profile = self
            .profiles
            .get(&record.user_id)
            .await
            .map_err(|e| internal("loading profile", e))?;

        let Some(profile) = profile else {
            warn!(
                "Pairing code {} references missing user {}, discarding it",
                record.id, record.user_id
            );
            self.codes
                .delete(&record.id)
                .await
                .map_err(|e| internal("discarding orphaned code", e))?;
            return Ok(VerifyOutcome::Rejected(RejectReason::UserNotFound));
        };

        let issued = tokio::time::timeout(self.issue_timeout, self.issuer.issue(&record.user_id))
            .await
            .map_err(|_| internal("issuing token", "timed out"))?
            .map_err(|e| internal("issuing token", e))?;

        let consumed = self
            .codes
            .delete(&record.id)
            .await
            .map_err(|e| internal("consuming code", e))?;

        if !consumed {
            // Another redemption or the sweeper removed it first
            debug!("Pairing code {} was consumed concurrently", record.id);
            return Ok(VerifyOutcome::Rejected(RejectReason::InvalidOrExpired));
        }

        info!("User {} paired a companion device", record.user_id);

        Ok(VerifyOutcome::Paired(PairedSession {
            token: issued.token,
            user_id: record.user_id,
            display_name: profile.display_name_or_default().to_string(),
            expires_at: issued.expires_at,
        }))
    }
}
