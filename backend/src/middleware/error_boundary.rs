//! Top-level panic boundary.
//!
//! A handler that panics yields a redacted `internal_error` instead of
//! tearing down the connection. The panic message is logged with the
//! request's trace identifier.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::rc::Rc;
use std::task::{Context, Poll};

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use futures_util::FutureExt as _;
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::error;

use crate::domain::{Error as DomainError, TraceId};

/// Panic-catching middleware.
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorBoundary;

impl<S, B> Transform<S, ServiceRequest> for ErrorBoundary
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ErrorBoundaryMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ErrorBoundaryMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct ErrorBoundaryMiddleware<S> {
    service: Rc<S>,
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

impl<S, B> Service<ServiceRequest> for ErrorBoundaryMiddleware<S>
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
        let path = req.path().to_owned();
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { service.call(req).await })
                .catch_unwind()
                .await;
            match outcome {
                Ok(result) => result,
                Err(payload) => {
                    error!(
                        trace_id = ?TraceId::current(),
                        path = %path,
                        panic = panic_message(payload.as_ref()),
                        "handler panicked"
                    );
                    Err(DomainError::internal("handler panicked").into())
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, HttpResponse, test as actix_test, web};
    use rstest::rstest;

    use crate::domain::ErrorCode;

    async fn boom() -> HttpResponse {
        panic!("ledger invariant broken");
    }

    #[actix_web::test]
    async fn panics_become_redacted_500s() {
        let app = actix_test::init_service(
            App::new()
                .wrap(ErrorBoundary)
                .route("/", web::get().to(boom))
                .route("/ok", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let err = actix_test::try_call_service(
            &app,
            actix_test::TestRequest::get().uri("/").to_request(),
        )
        .await
        .err()
        .expect("panic surfaces as an error");
        let res = err.error_response();
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = actix_web::body::to_bytes(res.into_body())
            .await
            .expect("error body");
        let body: DomainError = serde_json::from_slice(&bytes).expect("error json");
        assert_eq!(body.code(), ErrorCode::InternalError);
        assert_eq!(body.message(), "Internal server error");

        let res =
            actix_test::call_service(&app, actix_test::TestRequest::get().uri("/ok").to_request())
                .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[rstest]
    fn panic_payloads_are_rendered() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let literal: Box<dyn Any + Send> = Box::new("literal");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(literal.as_ref()), "literal");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
