//! pairlink Core - Shared configuration and error types
//!
//! This crate provides the foundational types used across all pairlink components.

pub mod config;
pub mod error;

pub use config::{Config, MAX_DURATION_SECS, MIN_SECRET_LEN};
pub use error::{Error, Result};
