//! Configuration types for pairlink

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Minimum length in bytes of the token signing secret
pub const MIN_SECRET_LEN: usize = 32;

/// Longest accepted value for any configured duration (ten years)
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main configuration for pairlink
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to bind the HTTP server to
    pub bind: IpAddr,
    /// Server port
    pub port: u16,
    /// Seconds a freshly issued pairing code stays valid
    pub code_ttl_secs: u64,
    /// Seconds between expiry sweeps
    pub sweep_interval_secs: u64,
    /// Seconds an issued companion token stays valid
    pub token_ttl_secs: u64,
    /// Seconds to wait for token issuance before giving up
    pub issue_timeout_secs: u64,
    /// `iss` claim embedded in issued tokens
    pub token_issuer: String,
    /// `aud` claim embedded in and required from issued tokens
    pub token_audience: String,
    /// Directory holding the code and profile documents
    pub data_dir: Option<PathBuf>,
    /// HMAC key used to sign tokens
    #[serde(skip_serializing, default)]
    pub token_secret: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: IpAddr::from([0, 0, 0, 0]),
            port: 8080,
            code_ttl_secs: 300,
            sweep_interval_secs: 60,
            token_ttl_secs: 3600,
            issue_timeout_secs: 10,
            token_issuer: "pairlink".to_string(),
            token_audience: "pairlink-companion".to_string(),
            data_dir: None,
            token_secret: String::new(),
        }
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind", &self.bind)
            .field("port", &self.port)
            .field("code_ttl_secs", &self.code_ttl_secs)
            .field("sweep_interval_secs", &self.sweep_interval_secs)
            .field("token_ttl_secs", &self.token_ttl_secs)
            .field("issue_timeout_secs", &self.issue_timeout_secs)
            .field("token_issuer", &self.token_issuer)
            .field("token_audience", &self.token_audience)
            .field("data_dir", &self.data_dir)
            .field("token_secret", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set bind address
    pub fn with_bind(mut self, bind: IpAddr) -> Self {
        self.bind = bind;
        self
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set code validity window
    pub fn with_code_ttl_secs(mut self, secs: u64) -> Self {
        self.code_ttl_secs = secs;
        self
    }

    /// Builder pattern: set sweep period
    pub fn with_sweep_interval_secs(mut self, secs: u64) -> Self {
        self.sweep_interval_secs = secs;
        self
    }

    /// Builder pattern: set token lifetime
    pub fn with_token_ttl_secs(mut self, secs: u64) -> Self {
        self.token_ttl_secs = secs;
        self
    }

    /// Builder pattern: set issuance timeout
    pub fn with_issue_timeout_secs(mut self, secs: u64) -> Self {
        self.issue_timeout_secs = secs;
        self
    }

    /// Builder pattern: set token issuer claim
    pub fn with_token_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.token_issuer = issuer.into();
        self
    }

    /// Builder pattern: set token audience claim
    pub fn with_token_audience(mut self, audience: impl Into<String>) -> Self {
        self.token_audience = audience.into();
        self
    }

    /// Builder pattern: set data directory
    pub fn with_data_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.data_dir = dir;
        self
    }

    /// Builder pattern: set token signing secret
    pub fn with_token_secret(mut self, secret: impl Into<String>) -> Self {
        self.token_secret = secret.into();
        self
    }

    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn issue_timeout(&self) -> Duration {
        Duration::from_secs(self.issue_timeout_secs)
    }

    /// Resolve the data directory, falling back to `<data dir>/pairlink`
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(dirs::data_dir().ok_or(Error::NoDataDir)?.join("pairlink")),
        }
    }

    /// Path of the pairing code collection
    pub fn codes_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("pairing_codes.json"))
    }

    /// Path of the user profile collection
    pub fn profiles_path(&self) -> Result<PathBuf> {
        Ok(self.resolve_data_dir()?.join("profiles.json"))
    }

    /// Check that every duration lies in `1..=MAX_DURATION_SECS`
    pub fn validate_durations(&self) -> Result<()> {
        let durations = [
            ("code_ttl", self.code_ttl_secs),
            ("sweep_interval", self.sweep_interval_secs),
            ("token_ttl", self.token_ttl_secs),
            ("issue_timeout", self.issue_timeout_secs),
        ];
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs == 0) {
            return Err(Error::config(format!("{} must be greater than zero", name)));
        }
        if let Some((name, _)) = durations.iter().find(|(_, secs)| *secs > MAX_DURATION_SECS) {
            return Err(Error::config(format!(
                "{} must be at most {} seconds",
                name, MAX_DURATION_SECS
            )));
        }
        Ok(())
    }

    /// Check durations, the signing secret and the token audience
    pub fn validate(&self) -> Result<()> {
        self.validate_durations()?;

        if self.token_secret.len() < MIN_SECRET_LEN {
            return Err(Error::config(format!(
                "token secret must be at least {} bytes",
                MIN_SECRET_LEN
            )));
        }

        if self.token_audience.is_empty() {
            return Err(Error::config("token audience must not be empty"));
        }

        Ok(())
    }
}
