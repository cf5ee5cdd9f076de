//! Read-side port for paginated book listings.
//!
//! This is the authoritative source behind the catalogue cache; every cached
//! listing can be rebuilt from it.

use async_trait::async_trait;

use crate::domain::{Book, Listing, Page};

use super::define_port_error;

define_port_error! {
    /// Errors raised when reading book listings.
    pub enum CatalogueRepositoryError {
        /// Repository connection could not be established.
        Connection { message: String } =>
            "catalogue read connection failed: {message}",
        /// Query failed during execution or row conversion.
        Query { message: String } =>
            "catalogue read query failed: {message}",
    }
}

/// Port for reading book listings.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogueRepository: Send + Sync {
    /// Return one page of `listing`, ordered by book id.
    ///
    /// Each book appears at most once even when it matches several category
    /// filters. An empty page yields an empty vector rather than an error.
    async fn list_books(
        &self,
        listing: &Listing,
        page: Page,
    ) -> Result<Vec<Book>, CatalogueRepositoryError>;
}
