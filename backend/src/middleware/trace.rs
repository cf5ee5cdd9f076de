//! Tracing middleware attaching a request-scoped trace identifier.
//!
//! Each request runs inside [`TraceId::scope`], so domain errors built while
//! handling it carry the identifier, and the response echoes it in the
//! `trace-id` header. A well-formed identifier supplied by the caller is
//! reused so logs correlate across services.

use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{error, info};

use crate::domain::{TRACE_ID_HEADER, TraceId};

/// Tracing middleware.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use lending::middleware::Trace;
///
/// let app = App::new().wrap(Trace);
/// ```
#[derive(Clone)]
pub struct Trace;

impl<S, B> Transform<S, ServiceRequest> for Trace
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TraceMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TraceMiddleware { service }))
    }
}

/// Service wrapper produced by [`Trace`].
pub struct TraceMiddleware<S> {
    service: S,
}

fn inbound_trace_id(req: &ServiceRequest) -> Option<TraceId> {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| raw.parse().ok())
}

impl<S, B> Service<ServiceRequest> for TraceMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let trace_id = inbound_trace_id(&req).unwrap_or_else(TraceId::generate);
        let method = req.method().clone();
        let path = req.path().to_owned();
        let started = Instant::now();
        let fut = self.service.call(req);
        Box::pin(TraceId::scope(trace_id, async move {
            let elapsed_ms = || u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            let mut res = match fut.await {
                Ok(res) => res,
                Err(err) => {
                    // Rendered by actix from the domain error, which already
                    // carries the trace id captured in this scope.
                    info!(
                        trace_id = %trace_id,
                        %method,
                        %path,
                        status = err.as_response_error().status_code().as_u16(),
                        elapsed_ms = elapsed_ms(),
                        "request failed"
                    );
                    return Err(err);
                }
            };
            info!(
                trace_id = %trace_id,
                %method,
                %path,
                status = res.status().as_u16(),
                elapsed_ms = elapsed_ms(),
                "request completed"
            );
            match HeaderValue::from_str(&trace_id.to_string()) {
                Ok(value) => {
                    res.response_mut()
                        .headers_mut()
                        .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
                }
                Err(error) => {
                    error!(%error, trace_id = %trace_id, "failed to encode trace identifier header");
                }
            }
            Ok(res)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, test, web};

    use crate::inbound::http::ApiResult;

    async fn call(request: test::TestRequest) -> (ServiceResponse, String) {
        let app = test::init_service(
            App::new()
                .wrap(Trace)
                .route(
                    "/",
                    web::get().to(|| async move {
                        let id = TraceId::current().expect("trace id in scope");
                        HttpResponse::Ok().body(id.to_string())
                    }),
                )
                .route(
                    "/fail",
                    web::get().to(|| async move {
                        ApiResult::<HttpResponse>::Err(crate::domain::Error::not_found("nope"))
                    }),
                ),
        )
        .await;
        let res = test::call_service(&app, request.to_request()).await;
        let header = res
            .headers()
            .get(TRACE_ID_HEADER)
            .expect("trace id header")
            .to_str()
            .expect("ascii header")
            .to_owned();
        (res, header)
    }

    #[actix_web::test]
    async fn handlers_see_the_header_value() {
        let (res, trace_id) = call(test::TestRequest::get().uri("/")).await;
        let body = test::read_body(res).await;
        assert_eq!(std::str::from_utf8(&body).expect("utf8 body"), trace_id);
    }

    #[actix_web::test]
    async fn caller_supplied_ids_are_reused() {
        let supplied = "4f8c5cf6-2a8e-4bde-9d0b-2b1f4bcf0a11";
        let (_, trace_id) = call(
            test::TestRequest::get()
                .uri("/")
                .insert_header((TRACE_ID_HEADER, supplied)),
        )
        .await;
        assert_eq!(trace_id, supplied);
    }

    #[actix_web::test]
    async fn malformed_caller_ids_are_replaced() {
        let (_, trace_id) = call(
            test::TestRequest::get()
                .uri("/")
                .insert_header((TRACE_ID_HEADER, "not-a-uuid")),
        )
        .await;
        assert!(trace_id.parse::<TraceId>().is_ok());
    }

    #[actix_web::test]
    async fn error_bodies_carry_the_same_id() {
        let (res, trace_id) = call(test::TestRequest::get().uri("/fail")).await;
        let body: crate::domain::Error = test::read_body_json(res).await;
        assert_eq!(body.trace_id(), Some(trace_id.as_str()));
    }
}
