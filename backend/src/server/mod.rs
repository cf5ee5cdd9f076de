//! Server construction and middleware wiring.
//!
//! Middleware runs outermost first: `Trace` stamps the trace id, `Deadline`
//! bounds the request, `ErrorBoundary` turns panics into 500s, and the
//! `/api/v1` scope adds `RateLimit`. Health probes and the API docs sit
//! outside the rate limit.

mod config;
mod state_builders;

pub use config::{DEFAULT_REQUEST_TIMEOUT, ServerConfig};
pub use state_builders::{ServicePorts, build_http_state, build_rate_limiter};

use std::sync::Arc;
use std::time::Duration;

use actix_web::body::MessageBody;
use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::doc::ApiDoc;
use crate::domain::{Error, RateLimiter};
use crate::inbound::http::admin::{confirm_return, create_book, create_category, loan_report};
use crate::inbound::http::catalogue::{list_books, list_books_by_author, list_books_by_category};
use crate::inbound::http::health::{HealthState, live, ready};
use crate::inbound::http::loans::create_loan;
use crate::inbound::http::session::{login, logout, refresh};
use crate::inbound::http::state::HttpState;
use crate::inbound::http::students::register;
use crate::middleware::{Deadline, ErrorBoundary, RateLimit, Trace};

/// Shared state handed to every worker's `App`.
#[derive(Clone)]
pub struct AppDependencies {
    pub health_state: web::Data<HealthState>,
    pub http_state: web::Data<HttpState>,
    pub rate_limiter: Arc<RateLimiter>,
    pub request_timeout: Duration,
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .error_handler(|err, _req| Error::invalid_request(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| Error::invalid_request(err.to_string()).into())
}

/// Assemble the application for one worker.
pub fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
        rate_limiter,
        request_timeout,
    } = deps;

    // Specific paths precede `/books` so the bare listing never shadows them.
    let api = web::scope("/api/v1")
        .wrap(RateLimit::new(rate_limiter))
        .service(register)
        .service(login)
        .service(refresh)
        .service(logout)
        .service(list_books_by_author)
        .service(list_books_by_category)
        .service(list_books)
        .service(create_loan)
        .service(create_category)
        .service(create_book)
        .service(confirm_return)
        .service(loan_report);

    App::new()
        .app_data(health_state)
        .app_data(http_state)
        .app_data(json_config())
        .app_data(query_config())
        .wrap(ErrorBoundary)
        .wrap(Deadline::new(request_timeout))
        .wrap(Trace)
        .service(api)
        .service(ready)
        .service(live)
        .service(SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

/// Construct an Actix HTTP server using the provided health state and
/// configuration.
///
/// Readiness is not touched here; callers mark each dependency up as it
/// comes online.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let ServerConfig {
        bind_addr,
        http_state,
        rate_limiter,
        request_timeout,
    } = config;
    let http_state = web::Data::new(http_state);

    let server = HttpServer::new(move || {
        build_app(AppDependencies {
            health_state: health_state.clone(),
            http_state: http_state.clone(),
            rate_limiter: rate_limiter.clone(),
            request_timeout,
        })
    })
    .bind(bind_addr)?
    .run();

    info!(%bind_addr, "http server listening");
    Ok(server)
}
