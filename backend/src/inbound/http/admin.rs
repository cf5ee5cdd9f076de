//! Administrator endpoints.
//!
//! ```text
//! POST /api/v1/admin/categories   Idempotency-Key: <key>  {"name":"Science"}
//! POST /api/v1/admin/books        Idempotency-Key: <key>  {"isbn":"...",...}
//! POST /api/v1/admin/loans/confirm {"student":"1234567890","isbn":"..."}
//! GET  /api/v1/admin/loans?status=outstanding&page=1
//! ```

use actix_web::{HttpRequest, HttpResponse, get, post, web};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{
    BookId, CategoryId, ConfirmRequest, Error, LoanRecord, LoanStatusFilter, NewBook, NewCategory,
    Page, ReturnReceipt, StudentRef,
};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::AdminSession;
use crate::inbound::http::idempotency::require_idempotency_key;
use crate::inbound::http::state::HttpState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedCategory {
    pub id: CategoryId,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatedBook {
    pub id: BookId,
}

/// Return confirmation body.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfirmBody {
    /// NIS when all digits, otherwise the student's exact name.
    #[schema(example = "1234567890")]
    pub student: String,
    #[schema(example = "978-0441013593")]
    pub isbn: String,
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LoanReportQuery {
    /// `all` (default), `returned` or `outstanding`.
    pub status: Option<LoanStatusFilter>,
    pub page: Option<u32>,
}

/// Create a category.
///
/// Any request reusing a key within its lifetime is rejected as a duplicate;
/// `details.samePayload` tells a retry apart from a key collision.
#[utoipa::path(
    post,
    path = "/api/v1/admin/categories",
    request_body = NewCategory,
    params(("Idempotency-Key" = String, Header, description = "Client-chosen request key")),
    responses(
        (status = 201, description = "Category created", body = CreatedCategory),
        (status = 400, description = "Invalid request or missing key", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Admin role required", body = Error),
        (status = 409, description = "Duplicate name or duplicate request", body = Error)
    ),
    tags = ["admin"],
    operation_id = "createCategory"
)]
#[post("/admin/categories")]
pub async fn create_category(
    req: HttpRequest,
    state: web::Data<HttpState>,
    _session: AdminSession,
    payload: web::Json<NewCategory>,
) -> ApiResult<HttpResponse> {
    let key = require_idempotency_key(req.headers())?;
    let id = state.admin.add_category(&key, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(CreatedCategory { id }))
}

/// Create a book with its category connections.
#[utoipa::path(
    post,
    path = "/api/v1/admin/books",
    request_body = NewBook,
    params(("Idempotency-Key" = String, Header, description = "Client-chosen request key")),
    responses(
        (status = 201, description = "Book created", body = CreatedBook),
        (status = 400, description = "Invalid request or missing key", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Admin role required", body = Error),
        (status = 404, description = "Unknown category", body = Error),
        (status = 409, description = "Duplicate ISBN or duplicate request", body = Error)
    ),
    tags = ["admin"],
    operation_id = "createBook"
)]
#[post("/admin/books")]
pub async fn create_book(
    req: HttpRequest,
    state: web::Data<HttpState>,
    _session: AdminSession,
    payload: web::Json<NewBook>,
) -> ApiResult<HttpResponse> {
    let key = require_idempotency_key(req.headers())?;
    let id = state.admin.add_book(&key, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(CreatedBook { id }))
}

/// Confirm that a student returned a book.
#[utoipa::path(
    post,
    path = "/api/v1/admin/loans/confirm",
    request_body = ConfirmBody,
    responses(
        (status = 200, description = "Loan closed", body = ReturnReceipt),
        (status = 400, description = "Blank student or ISBN", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Admin role required", body = Error),
        (status = 404, description = "Student, book or open loan not found", body = Error)
    ),
    tags = ["admin"],
    operation_id = "confirmReturn"
)]
#[post("/admin/loans/confirm")]
pub async fn confirm_return(
    state: web::Data<HttpState>,
    _session: AdminSession,
    payload: web::Json<ConfirmBody>,
) -> ApiResult<web::Json<ReturnReceipt>> {
    let ConfirmBody { student, isbn } = payload.into_inner();
    let receipt = state
        .returns
        .confirm(ConfirmRequest {
            student: StudentRef::parse(&student),
            isbn,
        })
        .await?;
    Ok(web::Json(receipt))
}

/// Loan report, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/admin/loans",
    params(LoanReportQuery),
    responses(
        (status = 200, description = "One page of loans", body = [LoanRecord]),
        (status = 400, description = "Unknown status filter", body = Error),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 403, description = "Admin role required", body = Error)
    ),
    tags = ["admin"],
    operation_id = "loanReport"
)]
#[get("/admin/loans")]
pub async fn loan_report(
    state: web::Data<HttpState>,
    _session: AdminSession,
    query: web::Query<LoanReportQuery>,
) -> ApiResult<web::Json<Vec<LoanRecord>>> {
    let LoanReportQuery { status, page } = query.into_inner();
    let records = state
        .admin
        .loan_report(
            status.unwrap_or_default(),
            page.map(Page::new).unwrap_or_default(),
        )
        .await?;
    Ok(web::Json(records))
}
