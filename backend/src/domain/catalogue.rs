//! Catalogue reads: cache-aside on the hit path, write-through on a miss,
//! with identical concurrent misses coalesced into one store query.
//!
//! The shared cache holds, per listing page, an ordered set of book ids and,
//! per book, a hash of display attributes. Both expire after five minutes
//! and are always rebuildable from the store, so cache failures degrade to
//! store reads instead of failing requests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tracing::{debug, error, warn};

use super::ports::{
    CacheBatch, CacheKey, CatalogueRepository, CatalogueRepositoryError, SharedCache,
};
use super::single_flight::SingleFlight;
use super::{Book, BookId, CategoryRef, Error, Listing, PAGE_SIZE, Page};

/// Lifetime of cached listing indexes and book hashes.
pub const CATALOGUE_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

type ListingResult = Result<Vec<Book>, Error>;

/// Catalogue query service.
pub struct CatalogueService {
    repo: Arc<dyn CatalogueRepository>,
    cache: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
    flights: SingleFlight<CacheKey, ListingResult>,
    ttl: Duration,
}

impl CatalogueService {
    /// Create a service with the default cache lifetime.
    pub fn new(
        repo: Arc<dyn CatalogueRepository>,
        cache: Arc<dyn SharedCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repo,
            cache,
            clock,
            flights: SingleFlight::new(),
            ttl: CATALOGUE_CACHE_TTL,
        }
    }

    /// Override the cache lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Return one page of `listing`.
    pub async fn list(&self, listing: Listing, page: Page) -> ListingResult {
        let key = CacheKey::listing(&listing, page);
        if let Some(books) = read_cached(self.cache.as_ref(), &key).await {
            debug!(key = %key, count = books.len(), "catalogue cache hit");
            return Ok(books);
        }

        let repo = Arc::clone(&self.repo);
        let cache = Arc::clone(&self.cache);
        let clock = Arc::clone(&self.clock);
        let ttl = self.ttl;
        let flight_key = key.clone();
        self.flights
            .run(flight_key, move || async move {
                let books = repo
                    .list_books(&listing, page)
                    .await
                    .map_err(map_catalogue_error)?;
                let books = dedup_books(books);
                write_through(cache.as_ref(), clock.as_ref(), &key, &books, ttl).await;
                Ok(books)
            })
            .await
    }
}

/// Drop a book's cached attributes so the next read refetches it.
///
/// Failures are logged; the store remains authoritative.
pub async fn evict_book(cache: &dyn SharedCache, book: BookId) {
    let key = CacheKey::book(book);
    if let Err(err) = cache.execute(CacheBatch::new().delete(key.clone())).await {
        warn!(key = %key, error = %err, "failed to evict cached book");
    }
}

fn map_catalogue_error(err: CatalogueRepositoryError) -> Error {
    error!(error = %err, "catalogue query failed");
    match err {
        CatalogueRepositoryError::Connection { .. } => {
            Error::service_unavailable("catalogue temporarily unavailable")
        }
        CatalogueRepositoryError::Query { .. } => Error::internal(err.to_string()),
    }
}

fn dedup_books(books: Vec<Book>) -> Vec<Book> {
    let mut seen = HashSet::new();
    books.into_iter().filter(|book| seen.insert(book.id)).collect()
}

fn dedup_ids(members: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    members
        .into_iter()
        .filter(|member| seen.insert(member.clone()))
        .collect()
}

/// Any failure or incomplete entry counts as a miss.
async fn read_cached(cache: &dyn SharedCache, key: &CacheKey) -> Option<Vec<Book>> {
    let stop = isize::try_from(PAGE_SIZE).map_or(isize::MAX, |size| size - 1);
    let ids = match cache
        .execute(CacheBatch::new().sorted_set_range(key.clone(), 0, stop))
        .await
        .and_then(|mut replies| replies.members())
    {
        Ok(ids) => dedup_ids(ids),
        Err(err) => {
            warn!(key = %key, error = %err, "catalogue index read failed; treating as miss");
            return None;
        }
    };
    if ids.is_empty() {
        return None;
    }

    let mut lookups = CacheBatch::new();
    for id in &ids {
        let book_id = id.parse::<i32>().ok().map(BookId::new)?;
        lookups = lookups.hash_get_all(CacheKey::book(book_id));
    }
    let mut replies = match cache.execute(lookups).await {
        Ok(replies) => replies,
        Err(err) => {
            warn!(key = %key, error = %err, "catalogue hash read failed; treating as miss");
            return None;
        }
    };

    let mut books = Vec::with_capacity(ids.len());
    for _ in &ids {
        let fields = replies.fields().ok()?;
        match decode_book(&fields) {
            Some(book) => books.push(book),
            None => {
                debug!(key = %key, "catalogue entry incomplete; treating as miss");
                return None;
            }
        }
    }
    Some(books)
}

async fn write_through(
    cache: &dyn SharedCache,
    clock: &dyn Clock,
    key: &CacheKey,
    books: &[Book],
    ttl: Duration,
) {
    if books.is_empty() {
        return;
    }
    // Scores record insertion time; the per-book offset keeps store order.
    let base = clock.utc().timestamp_millis();
    let mut batch = CacheBatch::atomic().delete(key.clone());
    for (offset, book) in (0_i64..).zip(books) {
        let book_key = CacheKey::book(book.id);
        batch = batch
            .sorted_set_add(key.clone(), base + offset, book.id.to_string())
            .hash_set(book_key.clone(), encode_book(book))
            .expire(book_key, ttl);
    }
    batch = batch.expire(key.clone(), ttl);

    if let Err(err) = cache.execute(batch).await {
        warn!(key = %key, error = %err, "catalogue write-through failed");
    }
}

fn encode_book(book: &Book) -> Vec<(String, String)> {
    let categories = serde_json::to_string(&book.categories).unwrap_or_else(|_| "[]".to_owned());
    vec![
        ("id".to_owned(), book.id.to_string()),
        ("name".to_owned(), book.name.clone()),
        ("author".to_owned(), book.author.clone()),
        ("publisher".to_owned(), book.publisher.clone()),
        ("description".to_owned(), book.description.clone()),
        ("availableStock".to_owned(), book.available_stock.to_string()),
        ("categories".to_owned(), categories),
    ]
}

fn decode_book(fields: &BTreeMap<String, String>) -> Option<Book> {
    let categories: Vec<CategoryRef> = serde_json::from_str(fields.get("categories")?).ok()?;
    Some(Book {
        id: BookId::new(fields.get("id")?.parse().ok()?),
        name: fields.get("name")?.clone(),
        author: fields.get("author")?.clone(),
        publisher: fields.get("publisher")?.clone(),
        description: fields.get("description")?.clone(),
        available_stock: fields.get("availableStock")?.parse().ok()?,
        categories,
    })
}

#[cfg(test)]
#[path = "catalogue_tests.rs"]
mod tests;
