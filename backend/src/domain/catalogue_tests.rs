//! Tests for the catalogue cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use rstest::{fixture, rstest};

use super::*;
use crate::domain::ports::MockCatalogueRepository;
use crate::domain::{CategoryId, ErrorCode};
use crate::test_support::{InMemorySharedCache, MutableClock};

fn book(id: i32, categories: &[(i32, &str)]) -> Book {
    Book {
        id: BookId::new(id),
        name: format!("Book {id}"),
        author: "Ursula K. Le Guin".to_owned(),
        publisher: "Ace".to_owned(),
        description: "A quiet book about ambiguity, walls and the people who keep them.".to_owned(),
        available_stock: id,
        categories: categories
            .iter()
            .map(|(cid, name)| CategoryRef {
                id: CategoryId::new(*cid),
                name: (*name).to_owned(),
            })
            .collect(),
    }
}

#[fixture]
fn clock() -> Arc<MutableClock> {
    Arc::new(MutableClock::default())
}

fn cache_for(clock: &Arc<MutableClock>) -> Arc<InMemorySharedCache> {
    Arc::new(InMemorySharedCache::new(clock.clone()))
}

fn service(
    repo: MockCatalogueRepository,
    cache: &Arc<InMemorySharedCache>,
    clock: &Arc<MutableClock>,
) -> CatalogueService {
    CatalogueService::new(Arc::new(repo), cache.clone(), clock.clone())
}

#[rstest]
#[tokio::test]
async fn second_identical_query_is_served_from_cache(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let mut repo = MockCatalogueRepository::new();
    repo.expect_list_books()
        .times(1)
        .return_once(|_, _| Ok(vec![book(2, &[(1, "Fiction")]), book(1, &[])]));
    let svc = service(repo, &cache, &clock);

    let first = svc.list(Listing::All, Page::new(1)).await.expect("miss succeeds");
    let second = svc.list(Listing::All, Page::new(1)).await.expect("hit succeeds");

    assert_eq!(
        serde_json::to_vec(&first).expect("json"),
        serde_json::to_vec(&second).expect("json")
    );
    assert_eq!(second.first().map(|b| b.id), Some(BookId::new(2)));
}

#[rstest]
#[tokio::test]
async fn write_through_sets_five_minute_expiry(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let mut repo = MockCatalogueRepository::new();
    repo.expect_list_books()
        .return_once(|_, _| Ok(vec![book(9, &[])]));
    let svc = service(repo, &cache, &clock);
    svc.list(Listing::ByAuthor("Le Guin".into()), Page::new(2))
        .await
        .expect("list");

    assert_eq!(
        cache.ttl_of("library:books:author:le guin:page:2"),
        Some(CATALOGUE_CACHE_TTL)
    );
    assert_eq!(cache.ttl_of("library:book:id:9"), Some(CATALOGUE_CACHE_TTL));
}

#[rstest]
#[tokio::test]
async fn expired_entries_fall_back_to_the_store(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let mut repo = MockCatalogueRepository::new();
    repo.expect_list_books()
        .times(2)
        .returning(|_, _| Ok(vec![book(1, &[])]));
    let svc = service(repo, &cache, &clock);

    svc.list(Listing::All, Page::new(1)).await.expect("first");
    clock.advance(CATALOGUE_CACHE_TTL + Duration::from_secs(1));
    svc.list(Listing::All, Page::new(1)).await.expect("second");
}

#[rstest]
#[tokio::test]
async fn missing_book_hash_counts_as_miss(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let mut repo = MockCatalogueRepository::new();
    repo.expect_list_books()
        .times(2)
        .returning(|_, _| Ok(vec![book(1, &[]), book(2, &[])]));
    let svc = service(repo, &cache, &clock);

    svc.list(Listing::All, Page::new(1)).await.expect("first");
    evict_book(cache.as_ref(), BookId::new(2)).await;
    let books = svc.list(Listing::All, Page::new(1)).await.expect("second");
    assert_eq!(books.len(), 2);
}

#[rstest]
#[tokio::test]
async fn cache_outage_degrades_to_store_reads(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    cache.set_unavailable(true);
    let mut repo = MockCatalogueRepository::new();
    repo.expect_list_books()
        .times(2)
        .returning(|_, _| Ok(vec![book(3, &[])]));
    let svc = service(repo, &cache, &clock);

    for _ in 0..2 {
        let books = svc.list(Listing::All, Page::new(1)).await.expect("store read");
        assert_eq!(books.len(), 1);
    }
}

#[rstest]
#[tokio::test]
async fn category_listing_counts_each_book_once(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let shared = book(5, &[(1, "Fiction"), (2, "Fantasy")]);
    let mut repo = MockCatalogueRepository::new();
    repo.expect_list_books()
        .times(1)
        .return_once(move |_, _| Ok(vec![shared.clone(), shared, book(6, &[(2, "Fantasy")])]));
    let svc = service(repo, &cache, &clock);
    let listing = Listing::by_categories(["Fiction", "Fantasy"]);

    let miss = svc.list(listing.clone(), Page::new(1)).await.expect("miss");
    let hit = svc.list(listing, Page::new(1)).await.expect("hit");

    assert_eq!(miss.len(), 2);
    assert_eq!(hit, miss);
}

#[rstest]
#[tokio::test]
async fn store_connection_failure_is_unavailable(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let mut repo = MockCatalogueRepository::new();
    repo.expect_list_books()
        .return_once(|_, _| Err(CatalogueRepositoryError::connection("refused")));
    let svc = service(repo, &cache, &clock);

    let err = svc
        .list(Listing::All, Page::new(1))
        .await
        .expect_err("store down");
    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    assert!(!cache.contains("library:books:all:page:1"));
}

#[rstest]
#[tokio::test]
async fn empty_pages_are_not_cached(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let mut repo = MockCatalogueRepository::new();
    repo.expect_list_books().times(2).returning(|_, _| Ok(Vec::new()));
    let svc = service(repo, &cache, &clock);
    for _ in 0..2 {
        assert!(svc.list(Listing::All, Page::new(99)).await.expect("empty").is_empty());
    }
}

struct SlowRepository {
    calls: AtomicUsize,
}

#[async_trait]
impl CatalogueRepository for SlowRepository {
    async fn list_books(
        &self,
        _listing: &Listing,
        _page: Page,
    ) -> Result<Vec<Book>, CatalogueRepositoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(25)).await;
        Ok(vec![book(1, &[])])
    }
}

#[rstest]
#[tokio::test]
async fn concurrent_misses_query_the_store_once(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let repo = Arc::new(SlowRepository {
        calls: AtomicUsize::new(0),
    });
    let svc = CatalogueService::new(repo.clone(), cache.clone(), clock.clone());

    let results = join_all((0..8).map(|_| svc.list(Listing::All, Page::new(1)))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(repo.calls.load(Ordering::SeqCst), 1);
}

#[rstest]
#[tokio::test]
async fn different_category_sets_are_not_coalesced(clock: Arc<MutableClock>) {
    let cache = cache_for(&clock);
    let repo = Arc::new(SlowRepository {
        calls: AtomicUsize::new(0),
    });
    let svc = CatalogueService::new(repo.clone(), cache.clone(), clock.clone());

    let (a, b) = tokio::join!(
        svc.list(Listing::by_categories(["Fiction"]), Page::new(1)),
        svc.list(Listing::by_categories(["Poetry"]), Page::new(1)),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(repo.calls.load(Ordering::SeqCst), 2);
    assert!(cache.contains("library:books:category:fiction:page:1"));
    assert!(cache.contains("library:books:category:poetry:page:1"));
}
