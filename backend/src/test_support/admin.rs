//! In-process catalogue administration and loan report rows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::domain::ports::{AdminRepository, AdminRepositoryError};
use crate::domain::{
    BookId, CategoryId, LoanRecord, LoanStatusFilter, NewBook, NewCategory, PAGE_SIZE, Page,
};

#[derive(Default)]
struct Tables {
    categories: Vec<String>,
    books: Vec<NewBook>,
    loans: Vec<LoanRecord>,
}

/// Admin tables held in process memory.
#[derive(Default)]
pub struct InMemoryAdmin {
    tables: Mutex<Tables>,
    inserts: AtomicUsize,
    reports: AtomicUsize,
}

impl InMemoryAdmin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row to the loan report.
    pub fn record_loan(&self, record: LoanRecord) {
        self.lock().loans.push(record);
    }

    /// Successful category and book inserts so far.
    pub fn inserts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    /// Report queries served so far.
    pub fn reports(&self) -> usize {
        self.reports.load(Ordering::SeqCst)
    }

    pub fn book_count(&self) -> usize {
        self.lock().books.len()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn next_id(len: usize) -> Result<i32, AdminRepositoryError> {
    i32::try_from(len + 1).map_err(|err| AdminRepositoryError::query(err.to_string()))
}

#[async_trait]
impl AdminRepository for InMemoryAdmin {
    async fn insert_category(
        &self,
        category: &NewCategory,
    ) -> Result<CategoryId, AdminRepositoryError> {
        let mut tables = self.lock();
        if tables.categories.contains(&category.name) {
            return Err(AdminRepositoryError::duplicate("name"));
        }
        tables.categories.push(category.name.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        next_id(tables.categories.len() - 1).map(CategoryId::new)
    }

    async fn insert_book(&self, book: &NewBook) -> Result<BookId, AdminRepositoryError> {
        let mut tables = self.lock();
        if tables.books.iter().any(|stored| stored.isbn == book.isbn) {
            return Err(AdminRepositoryError::duplicate("isbn"));
        }
        let known = tables.categories.len();
        if book
            .category_ids
            .iter()
            .any(|id| usize::try_from(id.get()).map_or(true, |id| id == 0 || id > known))
        {
            return Err(AdminRepositoryError::missing_reference("category"));
        }
        tables.books.push(book.clone());
        self.inserts.fetch_add(1, Ordering::SeqCst);
        next_id(tables.books.len() - 1).map(BookId::new)
    }

    async fn list_loans(
        &self,
        filter: LoanStatusFilter,
        page: Page,
    ) -> Result<Vec<LoanRecord>, AdminRepositoryError> {
        self.reports.fetch_add(1, Ordering::SeqCst);
        let skip = usize::try_from(page.offset())
            .map_err(|err| AdminRepositoryError::query(err.to_string()))?;
        let mut rows: Vec<LoanRecord> = self
            .lock()
            .loans
            .iter()
            .filter(|record| match filter {
                LoanStatusFilter::All => true,
                LoanStatusFilter::Returned => record.returned_at.is_some(),
                LoanStatusFilter::Outstanding => record.returned_at.is_none(),
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            b.borrowed_at
                .cmp(&a.borrowed_at)
                .then(b.loan_id.get().cmp(&a.loan_id.get()))
        });
        let take = usize::try_from(PAGE_SIZE).unwrap_or(usize::MAX);
        Ok(rows.into_iter().skip(skip).take(take).collect())
    }
}
