//! Builders wiring adapters into the domain services the handlers use.

use std::sync::Arc;

use mockable::{Clock, DefaultClock};

use crate::config::Settings;
use crate::domain::ports::{
    AdminRepository, CatalogueRepository, LoanLedger, PasswordHasher, SharedCache,
    StudentRepository, TokenCodec,
};
use crate::domain::{
    AdminService, CatalogueService, LoanService, RateLimitPolicy, RateLimiter,
    RegistrationService, ReturnService, SessionService, TokenPolicy,
};
use crate::inbound::http::state::{CookiePolicy, HttpState};
use crate::outbound::cache::{RedisPool, RedisSharedCache};
use crate::outbound::persistence::{
    DbPool, DieselAdminRepository, DieselCatalogueRepository, DieselLoanLedger,
    DieselStudentRepository,
};
use crate::outbound::security::{Argon2PasswordHasher, JwtTokenCodec};

/// Every outbound port the services depend on.
#[derive(Clone)]
pub struct ServicePorts {
    pub catalogue: Arc<dyn CatalogueRepository>,
    pub ledger: Arc<dyn LoanLedger>,
    pub admin: Arc<dyn AdminRepository>,
    pub students: Arc<dyn StudentRepository>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub tokens: Arc<dyn TokenCodec>,
    pub cache: Arc<dyn SharedCache>,
    pub clock: Arc<dyn Clock>,
}

impl ServicePorts {
    /// PostgreSQL, Redis, Argon2 and HS256 adapters over the given pools.
    pub fn production(settings: &Settings, db: DbPool, redis: RedisPool) -> Self {
        Self {
            catalogue: Arc::new(DieselCatalogueRepository::new(db.clone())),
            ledger: Arc::new(DieselLoanLedger::new(db.clone())),
            admin: Arc::new(DieselAdminRepository::new(db.clone())),
            students: Arc::new(DieselStudentRepository::new(db)),
            hasher: Arc::new(Argon2PasswordHasher::new()),
            tokens: Arc::new(JwtTokenCodec::new(settings.jwt_secret.to_vec())),
            cache: Arc::new(RedisSharedCache::new(redis)),
            clock: Arc::new(DefaultClock),
        }
    }
}

/// Build the handler state.
pub fn build_http_state(
    ports: &ServicePorts,
    tokens: TokenPolicy,
    cookies: CookiePolicy,
) -> HttpState {
    let ServicePorts {
        catalogue,
        ledger,
        admin,
        students,
        hasher,
        tokens: codec,
        cache,
        clock,
    } = ports.clone();
    HttpState {
        catalogue: Arc::new(CatalogueService::new(catalogue, cache.clone(), clock.clone())),
        loans: Arc::new(LoanService::new(ledger.clone(), cache.clone(), clock.clone())),
        returns: Arc::new(ReturnService::new(ledger, cache.clone(), clock.clone())),
        admin: Arc::new(AdminService::new(admin, cache.clone())),
        registration: Arc::new(RegistrationService::new(students.clone(), hasher.clone())),
        sessions: Arc::new(
            SessionService::new(students, hasher, codec, cache, clock).with_policy(tokens),
        ),
        cookies,
    }
}

/// Build the per-client request limiter.
pub fn build_rate_limiter(ports: &ServicePorts, per_minute: u32) -> RateLimiter {
    RateLimiter::new(
        ports.cache.clone(),
        ports.clock.clone(),
        RateLimitPolicy::per_minute(per_minute),
    )
}
