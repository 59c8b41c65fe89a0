//! pairlink Auth - Companion device pairing codes
//!
//! A primary device hands out short-lived 6-digit codes; a companion device
//! redeems one for a signed token scoped to the same user.
//!
//! # Pairing Flow
//!
//! 1. The primary device calls [`CodeIssuer::issue`] to store a new code
//! 2. The code is shown to the user, who types it on the companion device
//! 3. The companion submits it to [`PairingVerifier::verify`]
//! 4. On success the code is consumed and the companion receives a token
//! 5. The companion presents the token; [`SignedTokenIssuer::validate`] checks it
//!
//! Meanwhile an [`ExpirySweeper`] deletes codes that expired unredeemed.
//!
//! # Example
//!
//! ```no_run
//! use pairlink_auth::{
//!     CodeIssuer, CodeStorage, PairingVerifier, ProfileStorage, SignedTokenIssuer, UserId,
//!     VerifyOutcome,
//! };
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! async fn example() {
//!     let codes = Arc::new(CodeStorage::in_memory());
//!     let profiles = Arc::new(ProfileStorage::in_memory());
//!     let tokens = Arc::new(
//!         SignedTokenIssuer::new(
//!             b"a secret of at least thirty-two bytes".to_vec(),
//!             "pairlink",
//!             "pairlink-companion",
//!             Duration::from_secs(3600),
//!         )
//!         .unwrap(),
//!     );
//!
//!     let issued = CodeIssuer::new(codes.clone(), Duration::from_secs(300))
//!         .unwrap()
//!         .issue(UserId::new("u1"))
//!         .await
//!         .unwrap();
//!     println!("Enter code on companion: {}", issued.code);
//!
//!     let verifier = PairingVerifier::new(codes, profiles, tokens);
//!     if let Ok(VerifyOutcome::Paired(session)) = verifier.verify(issued.code.as_str()).await {
//!         println!("Paired as {}", session.display_name);
//!     }
//! }
//! ```

pub mod code;
pub mod issuance;
pub mod profile;
pub mod storage;
pub mod sweeper;
pub mod token;
pub mod verifier;

pub use code::{CodeId, CodeRecord, MalformedCode, PairingCode, UserId, CODE_LENGTH};
pub use issuance::{CodeIssuer, IssueError};
pub use profile::{UserProfile, DEFAULT_DISPLAY_NAME};
pub use storage::{
    CodeQuery, CodeStorage, CodeStore, ProfileStorage, ProfileStore, StorageError, StorageResult,
};
pub use sweeper::{ExpirySweeper, SweepError, SweepReport, DEFAULT_SWEEP_INTERVAL};
pub use token::{IssuedToken, SignedTokenIssuer, TokenClaims, TokenError, TokenIssuer, TokenResult};
pub use verifier::{
    PairedSession, PairingVerifier, RejectReason, VerifyError, VerifyOutcome, VerifyRequest,
    VerifyResponse, DEFAULT_ISSUE_TIMEOUT,
};
