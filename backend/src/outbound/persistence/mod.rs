//! PostgreSQL persistence adapters using Diesel with `diesel-async` and `bb8`.
//!
//! Adapters only translate between row structs and domain types. Row structs
//! (`models.rs`) and table definitions (`schema.rs`) stay private to this
//! module, and every driver error is classified once before it leaves.
//!
//! # Example
//!
//! ```ignore
//! use lending::outbound::persistence::{DbPool, DieselLoanLedger, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/library")).await?;
//! let ledger = DieselLoanLedger::new(pool);
//! ```

mod diesel_admin_repository;
mod diesel_basic_error_mapping;
mod diesel_catalogue_repository;
mod diesel_loan_ledger;
mod diesel_student_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_admin_repository::DieselAdminRepository;
pub use diesel_catalogue_repository::DieselCatalogueRepository;
pub use diesel_loan_ledger::DieselLoanLedger;
pub use diesel_student_repository::DieselStudentRepository;
pub use migrations::{MigrationError, run_migrations};
pub use pool::{DbPool, OwnedConnection, PoolConfig, PoolError};
