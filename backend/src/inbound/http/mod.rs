//! HTTP inbound adapter exposing REST endpoints.

pub mod admin;
pub mod auth;
pub mod cache_control;
pub mod catalogue;
pub mod error;
pub mod health;
pub mod idempotency;
pub mod loans;
pub mod session;
pub mod state;
pub mod students;

pub use error::ApiResult;
