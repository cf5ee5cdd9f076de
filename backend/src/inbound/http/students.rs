//! Student self-registration.
//!
//! ```text
//! POST /api/v1/register {"nis":1234567890,"name":"Ada Lovelace",...}
//! ```

use actix_web::{HttpResponse, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Error, Registration, StudentId};
use crate::inbound::http::ApiResult;
use crate::inbound::http::state::HttpState;

/// Body returned once an account exists.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RegisteredStudent {
    pub nis: StudentId,
}

/// Register a student account.
///
/// Every rule violation is reported at once under `details.fields`.
#[utoipa::path(
    post,
    path = "/api/v1/register",
    request_body = Registration,
    responses(
        (status = 201, description = "Account created", body = RegisteredStudent),
        (status = 400, description = "Validation failed, duplicates included", body = Error),
        (status = 503, description = "Store unavailable", body = Error)
    ),
    tags = ["students"],
    operation_id = "register",
    security([])
)]
#[post("/register")]
pub async fn register(
    state: web::Data<HttpState>,
    payload: web::Json<Registration>,
) -> ApiResult<HttpResponse> {
    let nis = state.registration.register(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(RegisteredStudent { nis }))
}
