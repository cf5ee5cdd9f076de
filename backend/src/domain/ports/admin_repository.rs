//! Port for administrative catalogue writes and loan reports.

use async_trait::async_trait;

use crate::domain::{BookId, CategoryId, LoanRecord, LoanStatusFilter, NewBook, NewCategory, Page};

use super::define_port_error;

define_port_error! {
    /// Errors raised by admin repository adapters.
    pub enum AdminRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } => "admin repository connection failed: {message}",
        /// Query failed during execution or row conversion.
        Query { message: String } => "admin repository query failed: {message}",
        /// A unique column already holds the value.
        Duplicate { field: String } => "{field} already exists",
        /// A referenced row does not exist.
        MissingReference { entity: String } => "{entity} does not exist",
    }
}

/// Port for catalogue administration.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AdminRepository: Send + Sync {
    /// Insert a category.
    async fn insert_category(
        &self,
        category: &NewCategory,
    ) -> Result<CategoryId, AdminRepositoryError>;

    /// Insert a book together with its category connections in one
    /// transaction.
    async fn insert_book(&self, book: &NewBook) -> Result<BookId, AdminRepositoryError>;

    /// One page of the loan report, newest first.
    async fn list_loans(
        &self,
        filter: LoanStatusFilter,
        page: Page,
    ) -> Result<Vec<LoanRecord>, AdminRepositoryError>;
}
