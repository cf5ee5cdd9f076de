//! Liveness and readiness probes.
//!
//! Readiness flips to 200 only once the database pool, the cache pool and the
//! schema migrations have all come up. Liveness stays 200 until shutdown
//! begins.

use std::sync::atomic::{AtomicBool, Ordering};

use actix_web::{HttpResponse, get, http::header, web};

/// Dependencies readiness waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Database,
    Cache,
    Migrations,
}

/// Shared probe state.
pub struct HealthState {
    database: AtomicBool,
    cache: AtomicBool,
    migrations: AtomicBool,
    live: AtomicBool,
}

impl Default for HealthState {
    fn default() -> Self {
        Self {
            database: AtomicBool::new(false),
            cache: AtomicBool::new(false),
            migrations: AtomicBool::new(false),
            live: AtomicBool::new(true),
        }
    }
}

impl HealthState {
    /// Not ready, but live.
    pub fn new() -> Self {
        Self::default()
    }

    fn flag(&self, dependency: Dependency) -> &AtomicBool {
        match dependency {
            Dependency::Database => &self.database,
            Dependency::Cache => &self.cache,
            Dependency::Migrations => &self.migrations,
        }
    }

    /// Record that a dependency is up.
    pub fn mark_up(&self, dependency: Dependency) {
        self.flag(dependency).store(true, Ordering::Release);
    }

    /// Mark every dependency up at once.
    pub fn mark_ready(&self) {
        for dependency in [Dependency::Database, Dependency::Cache, Dependency::Migrations] {
            self.mark_up(dependency);
        }
    }

    /// Fail liveness so orchestrators drain the instance.
    pub fn mark_unhealthy(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.is_alive()
            && [Dependency::Database, Dependency::Cache, Dependency::Migrations]
                .into_iter()
                .all(|dependency| self.flag(dependency).load(Ordering::Acquire))
    }

    pub fn is_alive(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn probe_response(probe_ok: bool) -> HttpResponse {
        let mut response = if probe_ok {
            HttpResponse::Ok()
        } else {
            HttpResponse::ServiceUnavailable()
        };
        response
            .insert_header((header::CACHE_CONTROL, "no-store"))
            .finish()
    }
}

/// Readiness probe.
#[utoipa::path(
    get,
    path = "/health/ready",
    tags = ["health"],
    security([]),
    responses(
        (status = 200, description = "Database, cache and migrations are up"),
        (status = 503, description = "A dependency is not up yet")
    )
)]
#[get("/health/ready")]
pub async fn ready(state: web::Data<HealthState>) -> HttpResponse {
    HealthState::probe_response(state.is_ready())
}

/// Liveness probe.
#[utoipa::path(
    get,
    path = "/health/live",
    tags = ["health"],
    security([]),
    responses(
        (status = 200, description = "Process is alive"),
        (status = 503, description = "Process is shutting down")
    )
)]
#[get("/health/live")]
pub async fn live(state: web::Data<HealthState>) -> HttpResponse {
    HealthState::probe_response(state.is_alive())
}
