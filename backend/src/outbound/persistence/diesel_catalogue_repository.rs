//! PostgreSQL-backed catalogue read adapter.

use std::collections::BTreeMap;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::Text;
use diesel_async::AsyncConnection as _;
use diesel_async::RunQueryDsl;
use diesel_async::scoped_futures::ScopedFutureExt as _;

use crate::domain::ports::{CatalogueRepository, CatalogueRepositoryError};
use crate::domain::{Book, BookId, CategoryId, CategoryRef, Listing, PAGE_SIZE, Page};

use super::diesel_basic_error_mapping::{DieselFailure, classify};
use super::models::BookRow;
use super::pool::{DbPool, PoolError};
use super::schema::{book_categories, books, categories};

diesel::define_sql_function! {
    /// SQL `lower()`.
    fn lower(value: Text) -> Text;
}

/// Diesel-backed implementation of the catalogue read port.
#[derive(Clone)]
pub struct DieselCatalogueRepository {
    pool: DbPool,
}

impl DieselCatalogueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> CatalogueRepositoryError {
    CatalogueRepositoryError::connection(error.into_message())
}

fn map_diesel_error(error: diesel::result::Error) -> CatalogueRepositoryError {
    match classify(error) {
        DieselFailure::Connection { message } => CatalogueRepositoryError::connection(message),
        DieselFailure::Query { message } => CatalogueRepositoryError::query(message),
        other => CatalogueRepositoryError::query(format!("{other:?}")),
    }
}

/// Escape `LIKE` metacharacters so the filter matches literally.
fn like_pattern(raw: &str) -> String {
    let mut pattern = String::with_capacity(raw.len() + 2);
    pattern.push('%');
    for ch in raw.trim().chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

fn assemble(rows: Vec<BookRow>, links: Vec<(i32, i32, String)>) -> Vec<Book> {
    let mut by_book: BTreeMap<i32, Vec<CategoryRef>> = BTreeMap::new();
    for (book_id, category_id, name) in links {
        by_book.entry(book_id).or_default().push(CategoryRef {
            id: CategoryId::new(category_id),
            name,
        });
    }
    rows.into_iter()
        .map(|row| Book {
            id: BookId::new(row.id),
            categories: by_book.remove(&row.id).unwrap_or_default(),
            name: row.name,
            author: row.author,
            publisher: row.publisher,
            description: row.description,
            available_stock: row.available_stock,
        })
        .collect()
}

#[async_trait]
impl CatalogueRepository for DieselCatalogueRepository {
    async fn list_books(
        &self,
        listing: &Listing,
        page: Page,
    ) -> Result<Vec<Book>, CatalogueRepositoryError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;

        let mut query = books::table.into_boxed::<diesel::pg::Pg>();
        match listing {
            Listing::All => {}
            Listing::ByAuthor(author) => {
                query = query.filter(books::author.ilike(like_pattern(author)));
            }
            Listing::ByCategories(names) => {
                let names: Vec<String> = names.iter().map(|name| name.to_lowercase()).collect();
                query = query.filter(
                    books::id.eq_any(
                        book_categories::table
                            .inner_join(categories::table)
                            .filter(lower(categories::name).eq_any(names))
                            .select(book_categories::book_id),
                    ),
                );
            }
        }
        let query = query
            .select(BookRow::as_select())
            .order_by(books::id)
            .limit(i64::from(PAGE_SIZE))
            .offset(page.offset());

        conn.transaction(|conn| {
            async move {
                let rows: Vec<BookRow> = query.load(conn).await?;
                let ids: Vec<i32> = rows.iter().map(|row| row.id).collect();
                let links: Vec<(i32, i32, String)> = book_categories::table
                    .inner_join(categories::table)
                    .filter(book_categories::book_id.eq_any(ids))
                    .select((book_categories::book_id, categories::id, categories::name))
                    .order_by((book_categories::book_id, categories::id))
                    .load(conn)
                    .await?;
                Ok::<_, diesel::result::Error>(assemble(rows, links))
            }
            .scope_boxed()
        })
        .await
        .map_err(map_diesel_error)
    }
}
