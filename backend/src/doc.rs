//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers every HTTP endpoint, the request and response
//! schemas they reference, and the two ways an access token may be
//! presented: the `access_token` cookie or an `Authorization: Bearer`
//! header. Swagger UI serves the document at `/docs`.

use utoipa::openapi::security::{ApiKey, ApiKeyValue, HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::domain::{
    Book, CategoryRef, Error, ErrorCode, LoanReceipt, LoanRecord, LoanStatusFilter, NewBook,
    NewCategory, Registration, ReturnReceipt, Role, TokenPair,
};
use crate::inbound::http::admin::{ConfirmBody, CreatedBook, CreatedCategory};
use crate::inbound::http::loans::LoanBody;
use crate::inbound::http::session::{LoginRequest, RefreshRequest};
use crate::inbound::http::students::RegisteredStudent;

/// Enrich the generated document with the token security schemes.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "AccessCookie",
            SecurityScheme::ApiKey(ApiKey::Cookie(ApiKeyValue::with_description(
                "access_token",
                "Access token cookie set by POST /api/v1/login.",
            ))),
        );
        components.add_security_scheme(
            "BearerToken",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

/// OpenAPI document for the REST API.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Lending backend API",
        description = "School library catalogue, loans and administration."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    security(("AccessCookie" = []), ("BearerToken" = [])),
    paths(
        crate::inbound::http::students::register,
        crate::inbound::http::session::login,
        crate::inbound::http::session::refresh,
        crate::inbound::http::session::logout,
        crate::inbound::http::catalogue::list_books,
        crate::inbound::http::catalogue::list_books_by_author,
        crate::inbound::http::catalogue::list_books_by_category,
        crate::inbound::http::loans::create_loan,
        crate::inbound::http::admin::create_category,
        crate::inbound::http::admin::create_book,
        crate::inbound::http::admin::confirm_return,
        crate::inbound::http::admin::loan_report,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        Error,
        ErrorCode,
        Book,
        CategoryRef,
        NewBook,
        NewCategory,
        Registration,
        Role,
        TokenPair,
        LoanReceipt,
        LoanRecord,
        LoanStatusFilter,
        ReturnReceipt,
        LoginRequest,
        RefreshRequest,
        LoanBody,
        ConfirmBody,
        CreatedBook,
        CreatedCategory,
        RegisteredStudent,
    )),
    tags(
        (name = "students", description = "Account registration"),
        (name = "session", description = "Login, token refresh and logout"),
        (name = "catalogue", description = "Book listings for students"),
        (name = "loans", description = "Borrowing"),
        (name = "admin", description = "Catalogue administration and returns"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;
