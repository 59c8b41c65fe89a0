//! pairlink Server - Axum-based HTTP API
//!
//! This crate exposes code verification and token checks to companion devices.

pub mod http;
pub mod state;

pub use http::{create_router, ApiError};
pub use state::AppState;
