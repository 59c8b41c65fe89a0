//! Shared application state

use pairlink_auth::{PairingVerifier, SignedTokenIssuer};
use pairlink_core::Config;
use std::sync::Arc;

/// Shared application state
pub struct AppState {
    /// Configuration
    pub config: Config,
    /// Redeems pairing codes
    pub verifier: Arc<PairingVerifier>,
    /// Validates tokens presented by paired companions
    pub tokens: Arc<SignedTokenIssuer>,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        config: Config,
        verifier: Arc<PairingVerifier>,
        tokens: Arc<SignedTokenIssuer>,
    ) -> Self {
        Self {
            config,
            verifier,
            tokens,
        }
    }
}
