//! Request guards.

pub mod auth;

pub use auth::{require_status_token, StatusToken};
