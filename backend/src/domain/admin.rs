//! Catalogue administration and the loan report.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::idempotency::{GuardedOperation, IdempotencyGuard, IdempotencyKey, PayloadHash};
use super::ports::{
    AdminRepository, AdminRepositoryError, CacheKey, SharedCache, SharedCacheExt,
};
use super::{
    BookId, CategoryId, Error, FieldViolation, LoanRecord, LoanStatusFilter, NewBook,
    NewCategory, Page,
};

/// Lifetime of a cached loan report page.
pub const LOAN_REPORT_TTL: Duration = Duration::from_secs(3 * 60);

const DESCRIPTION_CHARS: std::ops::RangeInclusive<usize> = 50..=300;

/// Admin use cases.
#[derive(Clone)]
pub struct AdminService {
    repo: Arc<dyn AdminRepository>,
    cache: Arc<dyn SharedCache>,
    guard: IdempotencyGuard,
}

impl AdminService {
    pub fn new(repo: Arc<dyn AdminRepository>, cache: Arc<dyn SharedCache>) -> Self {
        let guard = IdempotencyGuard::new(Arc::clone(&cache));
        Self { repo, cache, guard }
    }

    /// Create a category once per idempotency key.
    pub async fn add_category(
        &self,
        key: &IdempotencyKey,
        category: NewCategory,
    ) -> Result<CategoryId, Error> {
        let category = NewCategory {
            name: category.name.trim().to_owned(),
        };
        if category.name.is_empty() {
            return Err(Error::validation(vec![FieldViolation::new(
                "name",
                "must not be empty",
            )]));
        }
        let payload = fingerprint(&category)?;
        self.guard
            .run(key, GuardedOperation::CreateCategory, &payload, || async {
                let id = self
                    .repo
                    .insert_category(&category)
                    .await
                    .map_err(map_admin_error)?;
                info!(category = id.get(), name = %category.name, "category created");
                Ok(id)
            })
            .await
    }

    /// Create a book and its category connections once per idempotency key.
    pub async fn add_book(&self, key: &IdempotencyKey, book: NewBook) -> Result<BookId, Error> {
        let book = normalise_book(book);
        validate_book(&book)?;
        let payload = fingerprint(&book)?;
        self.guard
            .run(key, GuardedOperation::CreateBook, &payload, || async {
                let id = self.repo.insert_book(&book).await.map_err(map_admin_error)?;
                info!(book = %id, isbn = %book.isbn, "book created");
                Ok(id)
            })
            .await
    }

    /// One page of the loan report, served from a short-lived cache.
    pub async fn loan_report(
        &self,
        filter: LoanStatusFilter,
        page: Page,
    ) -> Result<Vec<LoanRecord>, Error> {
        let key = CacheKey::loan_report(filter, page);
        match self.cache.get(key.clone()).await {
            Ok(Some(cached)) => match serde_json::from_str(&cached) {
                Ok(records) => {
                    debug!(key = %key, "loan report cache hit");
                    return Ok(records);
                }
                Err(err) => warn!(key = %key, error = %err, "discarding undecodable loan report"),
            },
            Ok(None) => {}
            Err(err) => warn!(key = %key, error = %err, "loan report cache read failed"),
        }

        let records = self
            .repo
            .list_loans(filter, page)
            .await
            .map_err(map_admin_error)?;
        if !records.is_empty() {
            match serde_json::to_string(&records) {
                Ok(encoded) => {
                    let written = self
                        .cache
                        .set_with_ttl(key.clone(), encoded, LOAN_REPORT_TTL)
                        .await;
                    if let Err(err) = written {
                        warn!(key = %key, error = %err, "loan report write-through failed");
                    }
                }
                Err(err) => warn!(key = %key, error = %err, "loan report not cacheable"),
            }
        }
        Ok(records)
    }
}

fn fingerprint<T: serde::Serialize>(payload: &T) -> Result<PayloadHash, Error> {
    PayloadHash::of(payload).map_err(|err| Error::internal(err.to_string()))
}

fn normalise_book(book: NewBook) -> NewBook {
    NewBook {
        isbn: book.isbn.trim().to_owned(),
        name: book.name.trim().to_owned(),
        author: book.author.trim().to_owned(),
        publisher: book.publisher.trim().to_owned(),
        description: book.description.trim().to_owned(),
        ..book
    }
}

fn validate_book(book: &NewBook) -> Result<(), Error> {
    let mut violations = Vec::new();
    for (field, value) in [
        ("isbn", &book.isbn),
        ("name", &book.name),
        ("author", &book.author),
        ("publisher", &book.publisher),
    ] {
        if value.is_empty() {
            violations.push(FieldViolation::new(field, "must not be empty"));
        }
    }
    if !DESCRIPTION_CHARS.contains(&book.description.chars().count()) {
        violations.push(FieldViolation::new(
            "description",
            "must be 50-300 characters",
        ));
    }
    if book.stock < 0 {
        violations.push(FieldViolation::new("stock", "must not be negative"));
    }
    if book.available_stock < 0 || book.available_stock > book.stock {
        violations.push(FieldViolation::new(
            "availableStock",
            "must be between 0 and stock",
        ));
    }
    let mut seen = HashSet::new();
    if book
        .category_ids
        .iter()
        .any(|id| id.get() <= 0 || !seen.insert(*id))
    {
        violations.push(FieldViolation::new(
            "categoryIds",
            "must be distinct positive ids",
        ));
    }
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::validation(violations))
    }
}

fn map_admin_error(err: AdminRepositoryError) -> Error {
    match err {
        AdminRepositoryError::Duplicate { field } => {
            Error::conflict(format!("{field} already exists"))
        }
        AdminRepositoryError::MissingReference { entity } => {
            Error::not_found(format!("{entity} does not exist"))
        }
        AdminRepositoryError::Connection { .. } => {
            error!(error = %err, "admin store unavailable");
            Error::service_unavailable("store temporarily unavailable")
        }
        AdminRepositoryError::Query { .. } => {
            error!(error = %err, "admin query failed");
            Error::internal(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockAdminRepository;
    use crate::domain::{ErrorCode, LoanId};
    use crate::test_support::{InMemorySharedCache, MutableClock};
    use chrono::{TimeZone, Utc};
    use futures_util::future::join_all;
    use rstest::{fixture, rstest};

    #[fixture]
    fn cache() -> Arc<InMemorySharedCache> {
        Arc::new(InMemorySharedCache::new(Arc::new(MutableClock::default())))
    }

    fn book() -> NewBook {
        NewBook {
            isbn: " 978-0441013593 ".into(),
            name: "Dune".into(),
            author: "Frank Herbert".into(),
            publisher: "Ace".into(),
            description: "A desert planet, a great house and a prophecy that may be engineered."
                .into(),
            stock: 4,
            available_stock: 4,
            category_ids: vec![CategoryId::new(1), CategoryId::new(2)],
        }
    }

    #[rstest]
    #[tokio::test]
    async fn same_key_creates_one_category(cache: Arc<InMemorySharedCache>) {
        let mut repo = MockAdminRepository::new();
        repo.expect_insert_category()
            .times(1)
            .returning(|_| Ok(CategoryId::new(11)));
        let service = AdminService::new(Arc::new(repo), cache);
        let key = IdempotencyKey::new("cat-1").expect("key");
        let input = NewCategory {
            name: "Poetry".into(),
        };

        let outcomes = join_all((0..4).map(|_| service.add_category(&key, input.clone()))).await;

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .filter_map(|o| o.as_ref().err())
                .all(|e| e.code() == ErrorCode::Conflict)
        );
    }

    #[rstest]
    #[tokio::test]
    async fn failed_insert_allows_retry_with_same_key(cache: Arc<InMemorySharedCache>) {
        let mut repo = MockAdminRepository::new();
        let mut seq = mockall::Sequence::new();
        repo.expect_insert_book()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(AdminRepositoryError::connection("reset")));
        repo.expect_insert_book()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(BookId::new(3)));
        let service = AdminService::new(Arc::new(repo), cache);
        let key = IdempotencyKey::new("book-1").expect("key");

        let first = service.add_book(&key, book()).await;
        let second = service.add_book(&key, book()).await;

        assert_eq!(
            first.expect_err("store down").code(),
            ErrorCode::ServiceUnavailable
        );
        assert_eq!(second.expect("retry"), BookId::new(3));
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_isbn_is_a_conflict(cache: Arc<InMemorySharedCache>) {
        let mut repo = MockAdminRepository::new();
        repo.expect_insert_book()
            .returning(|_| Err(AdminRepositoryError::duplicate("isbn")));
        let service = AdminService::new(Arc::new(repo), cache);

        let err = service
            .add_book(&IdempotencyKey::random(), book())
            .await
            .expect_err("duplicate");
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert_eq!(err.message(), "isbn already exists");
    }

    #[rstest]
    #[case::short_description(NewBook { description: "too short".into(), ..book() }, "description")]
    #[case::available_above_stock(NewBook { available_stock: 5, ..book() }, "availableStock")]
    #[case::blank_author(NewBook { author: "  ".into(), ..book() }, "author")]
    #[case::repeated_category(
        NewBook { category_ids: vec![CategoryId::new(2), CategoryId::new(2)], ..book() },
        "categoryIds"
    )]
    #[tokio::test]
    async fn invalid_books_never_reach_the_store(
        cache: Arc<InMemorySharedCache>,
        #[case] input: NewBook,
        #[case] field: &str,
    ) {
        let service = AdminService::new(Arc::new(MockAdminRepository::new()), cache.clone());
        let key = IdempotencyKey::new("book-x").expect("key");

        let err = service.add_book(&key, input).await.expect_err("invalid");

        assert_eq!(err.code(), ErrorCode::InvalidRequest);
        let fields = err.details().and_then(|d| d.get("fields")).cloned();
        assert_eq!(
            fields.and_then(|f| f[0].get("field").cloned()),
            Some(serde_json::json!(field))
        );
        assert!(!cache.contains("idempotency:key:book-x"));
    }

    #[rstest]
    #[tokio::test]
    async fn loan_report_is_cached_for_three_minutes(cache: Arc<InMemorySharedCache>) {
        let record = LoanRecord {
            loan_id: LoanId::new(1),
            book_name: "Dune".into(),
            student_name: "Ada Lovelace".into(),
            borrowed_at: Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).single().expect("ts"),
            due_at: Utc.with_ymd_and_hms(2026, 3, 5, 0, 0, 0).single().expect("ts"),
            returned_at: None,
            sanction: None,
        };
        let mut repo = MockAdminRepository::new();
        repo.expect_list_loans()
            .times(1)
            .return_once(move |_, _| Ok(vec![record]));
        let service = AdminService::new(Arc::new(repo), cache.clone());

        let first = service
            .loan_report(LoanStatusFilter::Outstanding, Page::new(1))
            .await
            .expect("store");
        let second = service
            .loan_report(LoanStatusFilter::Outstanding, Page::new(1))
            .await
            .expect("cache");

        assert_eq!(first, second);
        assert_eq!(
            cache.ttl_of("library:loandata:outstanding:page:1"),
            Some(LOAN_REPORT_TTL)
        );
    }
}
