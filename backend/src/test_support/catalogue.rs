//! In-process catalogue with query counting.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::ports::{CatalogueRepository, CatalogueRepositoryError};
use crate::domain::{Book, Listing, PAGE_SIZE, Page};

/// Book listing held in process memory, ordered by id.
#[derive(Default)]
pub struct InMemoryCatalogue {
    books: Mutex<Vec<Book>>,
    queries: AtomicUsize,
    latency: Option<Duration>,
}

impl InMemoryCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every query, so concurrent readers overlap.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn add(&self, book: Book) {
        let mut books = self.lock();
        books.push(book);
        books.sort_by_key(|book| book.id);
    }

    /// Queries served so far.
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Book>> {
        match self.books.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn matches(listing: &Listing, book: &Book) -> bool {
    match listing {
        Listing::All => true,
        Listing::ByAuthor(author) => book
            .author
            .to_lowercase()
            .contains(&author.trim().to_lowercase()),
        Listing::ByCategories(names) => book.categories.iter().any(|category| {
            names
                .iter()
                .any(|name| name.eq_ignore_ascii_case(&category.name))
        }),
    }
}

#[async_trait]
impl CatalogueRepository for InMemoryCatalogue {
    async fn list_books(
        &self,
        listing: &Listing,
        page: Page,
    ) -> Result<Vec<Book>, CatalogueRepositoryError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let skip = usize::try_from(page.offset())
            .map_err(|err| CatalogueRepositoryError::query(err.to_string()))?;
        Ok(self
            .lock()
            .iter()
            .filter(|book| matches(listing, book))
            .skip(skip)
            .take(usize::try_from(PAGE_SIZE).unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
