//! Per-request deadline.
//!
//! The wrapped service future is dropped when the deadline elapses. Dropping
//! it drops whatever the handler held, including an open ledger transaction,
//! whose connection the pool then discards. The middleware yields a
//! `service_unavailable` error, which actix renders through the domain
//! error's `ResponseError` impl.

use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::Duration;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::warn;

use crate::domain::Error as DomainError;

/// Deadline middleware.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    limit: Duration,
}

impl Deadline {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Deadline
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = DeadlineMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(DeadlineMiddleware {
            service: Rc::new(service),
            limit: self.limit,
        }))
    }
}

pub struct DeadlineMiddleware<S> {
    service: Rc<S>,
    limit: Duration,
}

impl<S, B> Service<ServiceRequest> for DeadlineMiddleware<S>
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
        let limit = self.limit;
        let fut = self.service.call(req);
        Box::pin(async move {
            match tokio::time::timeout(limit, fut).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        path = %path,
                        limit_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                        "request deadline elapsed"
                    );
                    Err(DomainError::service_unavailable("request timed out").into())
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
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::domain::ErrorCode;

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[actix_web::test]
    async fn fast_handlers_pass_through() {
        let app = actix_test::init_service(
            App::new()
                .wrap(Deadline::new(Duration::from_secs(1)))
                .route("/", web::get().to(|| async { HttpResponse::Ok().body("done") })),
        )
        .await;
        let res =
            actix_test::call_service(&app, actix_test::TestRequest::get().uri("/").to_request())
                .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn slow_handlers_are_cancelled_with_503() {
        let dropped = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&dropped);
        let app = actix_test::init_service(
            App::new()
                .wrap(Deadline::new(Duration::from_millis(20)))
                .route(
                    "/",
                    web::get().to(move || {
                        let guard = DropFlag(Arc::clone(&flag));
                        async move {
                            let _held = guard;
                            tokio::time::sleep(Duration::from_secs(5)).await;
                            HttpResponse::Ok().finish()
                        }
                    }),
                ),
        )
        .await;
        let err = actix_test::try_call_service(
            &app,
            actix_test::TestRequest::get().uri("/").to_request(),
        )
        .await
        .err()
        .expect("deadline error");
        let res = err.error_response();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
        let bytes = actix_web::body::to_bytes(res.into_body())
            .await
            .expect("error body");
        let body: DomainError = serde_json::from_slice(&bytes).expect("error json");
        assert_eq!(body.code(), ErrorCode::ServiceUnavailable);
        assert!(dropped.load(Ordering::SeqCst), "handler state must be dropped");
    }
}
