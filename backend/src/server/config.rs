//! HTTP server configuration object.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::domain::RateLimiter;
use crate::inbound::http::state::HttpState;

/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) http_state: HttpState,
    pub(crate) rate_limiter: Arc<RateLimiter>,
    pub(crate) request_timeout: Duration,
}

impl ServerConfig {
    #[must_use]
    pub fn new(bind_addr: SocketAddr, http_state: HttpState, rate_limiter: Arc<RateLimiter>) -> Self {
        Self {
            bind_addr,
            http_state,
            rate_limiter,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Cap how long a single request may run before it is cancelled.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}
