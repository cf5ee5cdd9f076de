//! PostgreSQL-backed catalogue administration and loan reporting.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;

use crate::domain::ports::{AdminRepository, AdminRepositoryError};
use crate::domain::{
    BookId, CategoryId, LoanId, LoanRecord, LoanStatusFilter, NewBook, NewCategory, PAGE_SIZE,
    Page,
};

use super::diesel_basic_error_mapping::{DieselFailure, classify, names};
use super::models::{BookCategoryRow, LoanReportRow, NewBookRow, NewCategoryRow};
use super::pool::{DbPool, PoolError};
use super::schema::{book_categories, books, categories, loans, students};

/// Diesel-backed implementation of the admin repository port.
#[derive(Clone)]
pub struct DieselAdminRepository {
    pool: DbPool,
}

impl DieselAdminRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> AdminRepositoryError {
    AdminRepositoryError::connection(error.into_message())
}

fn map_diesel_error(error: diesel::result::Error) -> AdminRepositoryError {
    match classify(error) {
        DieselFailure::Unique { constraint } if names(constraint.as_deref(), "isbn") => {
            AdminRepositoryError::duplicate("isbn")
        }
        DieselFailure::Unique { constraint } if names(constraint.as_deref(), "categories") => {
            AdminRepositoryError::duplicate("name")
        }
        DieselFailure::Unique { constraint } => {
            AdminRepositoryError::duplicate(constraint.unwrap_or_else(|| "row".to_owned()))
        }
        DieselFailure::ForeignKey { .. } => AdminRepositoryError::missing_reference("category"),
        DieselFailure::Check { constraint } => AdminRepositoryError::query(format!(
            "check {} rejected the row",
            constraint.as_deref().unwrap_or("constraint")
        )),
        DieselFailure::NotFound => AdminRepositoryError::query("row vanished mid-statement"),
        DieselFailure::Connection { message } => AdminRepositoryError::connection(message),
        DieselFailure::Query { message } => AdminRepositoryError::query(message),
    }
}

fn row_to_record(row: LoanReportRow) -> LoanRecord {
    LoanRecord {
        loan_id: LoanId::new(row.loan_id),
        book_name: row.book_name,
        student_name: row.student_name,
        borrowed_at: row.borrowed_at,
        due_at: row.due_at,
        returned_at: row.returned_at,
        sanction: row.sanction,
    }
}

#[async_trait]
impl AdminRepository for DieselAdminRepository {
    async fn insert_category(
        &self,
        category: &NewCategory,
    ) -> Result<CategoryId, AdminRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(categories::table)
            .values(&NewCategoryRow {
                name: &category.name,
            })
            .returning(categories::id)
            .get_result::<i32>(&mut conn)
            .await
            .map(CategoryId::new)
            .map_err(map_diesel_error)
    }

    async fn insert_book(&self, book: &NewBook) -> Result<BookId, AdminRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let book = book.clone();
        conn.transaction(|conn| {
            async move {
                let id: i32 = diesel::insert_into(books::table)
                    .values(&NewBookRow {
                        isbn: &book.isbn,
                        name: &book.name,
                        author: &book.author,
                        publisher: &book.publisher,
                        description: &book.description,
                        stock: book.stock,
                        available_stock: book.available_stock,
                    })
                    .returning(books::id)
                    .get_result(conn)
                    .await?;
                let links: Vec<BookCategoryRow> = book
                    .category_ids
                    .iter()
                    .map(|category| BookCategoryRow {
                        book_id: id,
                        category_id: category.get(),
                    })
                    .collect();
                if !links.is_empty() {
                    diesel::insert_into(book_categories::table)
                        .values(&links)
                        .on_conflict_do_nothing()
                        .execute(conn)
                        .await?;
                }
                Ok::<_, diesel::result::Error>(BookId::new(id))
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }

    async fn list_loans(
        &self,
        filter: LoanStatusFilter,
        page: Page,
    ) -> Result<Vec<LoanRecord>, AdminRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let mut query = loans::table
            .inner_join(books::table)
            .inner_join(students::table)
            .into_boxed::<diesel::pg::Pg>();
        query = match filter {
            LoanStatusFilter::All => query,
            LoanStatusFilter::Returned => query.filter(loans::returned_at.is_not_null()),
            LoanStatusFilter::Outstanding => query.filter(loans::returned_at.is_null()),
        };
        let rows: Vec<LoanReportRow> = query
            .select((
                loans::id,
                books::name,
                students::name,
                loans::borrowed_at,
                loans::due_at,
                loans::returned_at,
                loans::sanction,
            ))
            .order_by((loans::borrowed_at.desc(), loans::id.desc()))
            .limit(i64::from(PAGE_SIZE))
            .offset(page.offset())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(row_to_record).collect())
    }
}
