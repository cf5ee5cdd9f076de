//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Ports describe how the domain reaches the relational store, the shared
//! cache and the security primitives. Each port exposes a typed error so
//! adapters classify driver failures once and services never inspect raw
//! driver errors.

mod macros;
pub(crate) use macros::define_port_error;

mod admin_repository;
mod cache_key;
mod catalogue_repository;
mod loan_ledger;
mod password_hasher;
mod shared_cache;
mod student_repository;
mod token_codec;

#[cfg(test)]
pub use admin_repository::MockAdminRepository;
pub use admin_repository::{AdminRepository, AdminRepositoryError};
pub use cache_key::{CacheKey, CacheKeyValidationError, KEY_DOMAIN};
#[cfg(test)]
pub use catalogue_repository::MockCatalogueRepository;
pub use catalogue_repository::{CatalogueRepository, CatalogueRepositoryError};
#[cfg(test)]
pub use loan_ledger::MockLoanLedger;
pub use loan_ledger::{LedgerError, LedgerTransaction, LoanLedger};
#[cfg(test)]
pub use password_hasher::MockPasswordHasher;
pub use password_hasher::{PasswordHasher, PasswordHasherError};
#[cfg(test)]
pub use shared_cache::MockSharedCache;
pub use shared_cache::{
    CacheBatch, CacheCommand, CacheReplies, CacheReply, SharedCache, SharedCacheError,
    SharedCacheExt,
};
#[cfg(test)]
pub use student_repository::MockStudentRepository;
pub use student_repository::{StudentRepository, StudentRepositoryError};
#[cfg(test)]
pub use token_codec::MockTokenCodec;
pub use token_codec::{IssuedToken, TokenClaims, TokenCodec, TokenCodecError, TokenKind};
