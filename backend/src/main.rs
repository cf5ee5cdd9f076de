//! Backend entry-point: loads configuration, brings up PostgreSQL and Redis,
//! applies migrations and serves the REST API.

use std::io;
use std::sync::Arc;

use actix_web::web;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use lending::config::AppConfig;
use lending::domain::TokenPolicy;
use lending::inbound::http::health::{Dependency, HealthState};
use lending::inbound::http::state::CookiePolicy;
use lending::outbound::cache;
use lending::outbound::persistence::{DbPool, PoolConfig, run_migrations};
use lending::server::{
    ServerConfig, ServicePorts, build_http_state, build_rate_limiter, create_server,
};

/// Application bootstrap.
#[actix_web::main]
async fn main() -> io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = AppConfig::from_process()
        .and_then(AppConfig::resolve)
        .map_err(io::Error::other)?;
    info!(settings = ?settings, "configuration loaded");

    let health_state = web::Data::new(HealthState::new());

    let applied = run_migrations(&settings.database_url)
        .await
        .map_err(io::Error::other)?;
    info!(applied, "database schema up to date");
    health_state.mark_up(Dependency::Migrations);

    let db = DbPool::new(
        PoolConfig::new(settings.database_url.clone()).with_max_size(settings.db_max_connections),
    )
    .await
    .map_err(io::Error::other)?;
    health_state.mark_up(Dependency::Database);

    let redis = cache::connect(&settings.redis_url, settings.db_max_connections)
        .await
        .map_err(io::Error::other)?;
    health_state.mark_up(Dependency::Cache);

    let ports = ServicePorts::production(&settings, db, redis);
    let http_state = build_http_state(
        &ports,
        TokenPolicy {
            access_ttl: settings.access_token_ttl,
            refresh_ttl: settings.refresh_token_ttl,
        },
        CookiePolicy {
            secure: settings.cookie_secure,
        },
    );
    let rate_limiter = Arc::new(build_rate_limiter(&ports, settings.rate_limit_per_minute));
    let config = ServerConfig::new(settings.bind_addr, http_state, rate_limiter)
        .with_request_timeout(settings.request_timeout);

    let server = create_server(health_state.clone(), config)?;
    let outcome = server.await;
    health_state.mark_unhealthy();
    outcome
}
