//! Outbound adapters implementing domain ports.
//!
//! - **persistence**: PostgreSQL repositories and the loan ledger (Diesel)
//! - **cache**: Redis-backed shared cache
//! - **security**: JWT token codec and Argon2 password hashing
//!
//! Adapters translate between domain types and infrastructure
//! representations. They contain no business logic.

pub mod cache;
pub mod persistence;
pub mod security;
