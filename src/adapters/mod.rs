//! Adapters - Implementations of port interfaces.
//!
//! - `postgres` - sqlx repositories for every storage port
//! - `memory` - in-memory repositories for tests and local runs
//! - `stripe` - Stripe REST gateway and a recording mock
//! - `backend_api` - church directory provisioning API client
//! - `tasks` - background provisioning dispatchers
//! - `http` - axum routes, middleware and error mapping

pub mod backend_api;
pub mod http;
pub mod memory;
pub mod postgres;
pub mod stripe;
pub mod tasks;
