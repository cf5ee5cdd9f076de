//! Catalogue read endpoints for students.
//!
//! ```text
//! GET /api/v1/books?page=1
//! GET /api/v1/books/author?author=Herbert&page=1
//! GET /api/v1/books/category?categories=science,fiction&page=1
//! ```

use actix_web::{get, web};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::domain::{Book, Error, FieldViolation, Listing, Page};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::StudentSession;
use crate::inbound::http::state::HttpState;

/// `?page=n`, starting at 1. Missing or zero means the first page.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorQuery {
    /// Case-insensitive substring of the author name.
    pub author: String,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CategoryQuery {
    /// Comma-separated category names; a book matches any of them.
    pub categories: String,
    pub page: Option<u32>,
}

fn page(raw: Option<u32>) -> Page {
    raw.map(Page::new).unwrap_or_default()
}

fn blank(field: &str) -> Error {
    Error::validation(vec![FieldViolation::new(field, "must not be empty")])
}

/// List every book.
#[utoipa::path(
    get,
    path = "/api/v1/books",
    params(PageQuery),
    responses(
        (status = 200, description = "One page of books", body = [Book]),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Student role required", body = Error),
        (status = 503, description = "Catalogue unavailable", body = Error)
    ),
    tags = ["catalogue"],
    operation_id = "listBooks"
)]
#[get("/books")]
pub async fn list_books(
    state: web::Data<HttpState>,
    _session: StudentSession,
    query: web::Query<PageQuery>,
) -> ApiResult<web::Json<Vec<Book>>> {
    let books = state.catalogue.list(Listing::All, page(query.page)).await?;
    Ok(web::Json(books))
}

/// List books whose author matches.
#[utoipa::path(
    get,
    path = "/api/v1/books/author",
    params(AuthorQuery),
    responses(
        (status = 200, description = "One page of books", body = [Book]),
        (status = 400, description = "Author missing", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Student role required", body = Error)
    ),
    tags = ["catalogue"],
    operation_id = "listBooksByAuthor"
)]
#[get("/books/author")]
pub async fn list_books_by_author(
    state: web::Data<HttpState>,
    _session: StudentSession,
    query: web::Query<AuthorQuery>,
) -> ApiResult<web::Json<Vec<Book>>> {
    let AuthorQuery { author, page: raw } = query.into_inner();
    let author = author.trim();
    if author.is_empty() {
        return Err(blank("author"));
    }
    let books = state
        .catalogue
        .list(Listing::ByAuthor(author.to_owned()), page(raw))
        .await?;
    Ok(web::Json(books))
}

/// List books in any of the named categories.
#[utoipa::path(
    get,
    path = "/api/v1/books/category",
    params(CategoryQuery),
    responses(
        (status = 200, description = "One page of books", body = [Book]),
        (status = 400, description = "No category named", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Student role required", body = Error)
    ),
    tags = ["catalogue"],
    operation_id = "listBooksByCategory"
)]
#[get("/books/category")]
pub async fn list_books_by_category(
    state: web::Data<HttpState>,
    _session: StudentSession,
    query: web::Query<CategoryQuery>,
) -> ApiResult<web::Json<Vec<Book>>> {
    let CategoryQuery {
        categories,
        page: raw,
    } = query.into_inner();
    let listing = Listing::by_categories(categories.split(','));
    if matches!(&listing, Listing::ByCategories(names) if names.is_empty()) {
        return Err(blank("categories"));
    }
    let books = state.catalogue.list(listing, page(raw)).await?;
    Ok(web::Json(books))
}
