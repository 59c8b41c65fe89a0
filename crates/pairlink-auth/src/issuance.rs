//! Code issuance for the primary device
//!
//! Codes are short enough to collide, so a new code is redrawn while another
//! redeemable document already carries the same value. This keeps two users
//! from sharing a live code without needing a uniqueness constraint at rest.

use crate::code::{CodeRecord, PairingCode, UserId};
use crate::storage::{CodeQuery, CodeStore, StorageError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Code issuance errors
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("Code lifetime must be positive and fit a timestamp: {0:?}")]
    InvalidTtl(std::time::Duration),

    #[error("Code expiry is out of range")]
    ExpiryOutOfRange,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// How many codes to draw before accepting a collision with a live one
const MAX_DRAWS: usize = 8;

/// Writes fresh pairing codes
pub struct CodeIssuer {
    codes: Arc<dyn CodeStore>,
    ttl: Duration,
}

impl CodeIssuer {
    /// Create an issuer whose codes stay valid for `ttl`; rejects a zero or
    /// unrepresentable lifetime
    pub fn new(codes: Arc<dyn CodeStore>, ttl: std::time::Duration) -> Result<Self, IssueError> {
        if ttl.is_zero() {
            return Err(IssueError::InvalidTtl(ttl));
        }
        let ttl = Duration::from_std(ttl).map_err(|_| IssueError::InvalidTtl(ttl))?;
        Ok(Self { codes, ttl })
    }

    /// Issue and store a new code for `user_id`
    pub async fn issue(&self, user_id: UserId) -> Result<CodeRecord, IssueError> {
        let now = Utc::now();
        let mut record =
            CodeRecord::issue(user_id, now, self.ttl).ok_or(IssueError::ExpiryOutOfRange)?;

        let mut draws = 1;
        loop {
            let live = CodeQuery::new()
                .code_eq(record.code.clone())
                .expires_after(now)
                .limit(1);
            if self.codes.query(&live).await?.is_empty() {
                break;
            }
            if draws == MAX_DRAWS {
                warn!(
                    "Issuing pairing code {} that is already live",
                    record.code.redacted()
                );
                break;
            }
            debug!("Pairing code {} already live, redrawing", record.code.redacted());
            record.code = PairingCode::generate();
            draws += 1;
        }

        self.codes.insert(record.clone()).await?;
        info!(
            "Issued pairing code for user {} valid for {}s",
            record.user_id,
            self.ttl.num_seconds()
        );
        Ok(record)
    }
}
