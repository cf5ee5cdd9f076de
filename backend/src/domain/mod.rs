//! Domain rules, services and ports.
//!
//! Purpose: hold everything that decides what the library does, with the
//! relational store, the shared cache and the security primitives reached
//! only through the traits in [`ports`].
//!
//! Public surface:
//! - Error / ErrorCode: transport-agnostic failure payload.
//! - Entities: students, books, loans and their identifiers.
//! - Services: catalogue, loans, returns, sessions, admin, registration.
//! - Guards: idempotency and rate limiting.

pub mod admin;
pub mod book;
pub mod catalogue;
pub mod error;
pub mod idempotency;
pub mod loan;
pub mod loans;
pub mod ports;
pub mod rate_limit;
pub mod registration;
pub mod returns;
pub mod rules;
pub mod session;
mod single_flight;
pub mod student;
pub mod trace_id;

pub use self::admin::{AdminService, LOAN_REPORT_TTL};
pub use self::book::{
    Book, BookId, CategoryId, CategoryRef, Listing, NewBook, NewCategory, PAGE_SIZE, Page,
};
pub use self::catalogue::{CATALOGUE_CACHE_TTL, CatalogueService};
pub use self::error::{
    Error, ErrorCode, ErrorValidationError, FieldViolation, TRACE_ID_HEADER,
};
pub use self::loan::{
    ConfirmRequest, LoanId, LoanReceipt, LoanRecord, LoanRequest, LoanStatusFilter, NewLoan,
    OpenLoan, ReturnReceipt,
};
pub use self::loans::LoanService;
pub use self::rate_limit::{RateLimitPolicy, RateLimiter};
pub use self::registration::RegistrationService;
pub use self::returns::ReturnService;
pub use self::session::{Session, SessionService, TokenPair, TokenPolicy};
pub use self::single_flight::SingleFlight;
pub use self::student::{
    LoginCredentials, NewStudent, Registration, Role, StudentCredentials, StudentId, StudentRef,
};
pub use self::trace_id::TraceId;
