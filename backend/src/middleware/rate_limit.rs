//! Per-client request budget enforced before routing.
//!
//! Clients are keyed by their real remote address as reported by
//! [`actix_web::dev::ConnectionInfo::realip_remote_addr`].

use std::rc::Rc;
use std::sync::Arc;
use std::task::{Context, Poll};

use actix_web::Error;
use actix_web::body::EitherBody;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use futures_util::future::{LocalBoxFuture, Ready, ready};

use crate::domain::RateLimiter;

const UNKNOWN_CLIENT: &str = "unknown";

/// Rate limiting middleware backed by the shared-cache sliding window.
#[derive(Clone)]
pub struct RateLimit {
    limiter: Arc<RateLimiter>,
}

impl RateLimit {
    pub fn new(limiter: Arc<RateLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service: Rc::new(service),
            limiter: Arc::clone(&self.limiter),
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: Rc<S>,
    limiter: Arc<RateLimiter>,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<EitherBody<B>>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let client = req
            .connection_info()
            .realip_remote_addr()
            .unwrap_or(UNKNOWN_CLIENT)
            .to_owned();
        let limiter = Arc::clone(&self.limiter);
        let service = Rc::clone(&self.service);
        Box::pin(async move {
            if let Err(rejection) = limiter.allow(&client).await {
                return Ok(req.error_response(rejection).map_into_right_body());
            }
            service
                .call(req)
                .await
                .map(ServiceResponse::map_into_left_body)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::http::header::RETRY_AFTER;
    use actix_web::{App, HttpResponse, test, web};
    use std::net::SocketAddr;

    use crate::domain::RateLimitPolicy;
    use crate::test_support::{InMemorySharedCache, MutableClock};

    fn peer(last_octet: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, last_octet], 40_000))
    }

    #[actix_web::test]
    async fn budget_is_enforced_per_client() {
        let clock = Arc::new(MutableClock::default());
        let limiter = RateLimiter::new(
            Arc::new(InMemorySharedCache::new(clock.clone())),
            clock,
            RateLimitPolicy::per_minute(2),
        );
        let app = test::init_service(
            App::new()
                .wrap(RateLimit::new(Arc::new(limiter)))
                .route("/", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        for _ in 0..2 {
            let req = test::TestRequest::get().uri("/").peer_addr(peer(1)).to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        }
        let req = test::TestRequest::get().uri("/").peer_addr(peer(1)).to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(res.headers().contains_key(RETRY_AFTER));

        let req = test::TestRequest::get().uri("/").peer_addr(peer(2)).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
