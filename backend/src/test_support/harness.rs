//! Fully wired services over in-memory adapters.

use std::sync::Arc;

use crate::domain::{
    AdminService, CatalogueService, Error, LoanService, LoginCredentials, RateLimitPolicy,
    RateLimiter, RegistrationService, ReturnService, Role, SessionService, StudentId, TokenPair,
    TokenPolicy,
};
use crate::inbound::http::state::{CookiePolicy, HttpState};
use crate::outbound::security::JwtTokenCodec;

use super::{
    InMemoryAdmin, InMemoryCatalogue, InMemoryLedger, InMemorySharedCache, InMemoryStudents,
    MutableClock, PlainPasswordHasher,
};

const SIGNING_SECRET: &[u8] = b"integration-signing-secret-0123456789";

/// In-memory adapters plus the clock they share.
pub struct TestHarness {
    pub clock: Arc<MutableClock>,
    pub cache: Arc<InMemorySharedCache>,
    pub ledger: Arc<InMemoryLedger>,
    pub students: Arc<InMemoryStudents>,
    pub catalogue: Arc<InMemoryCatalogue>,
    pub admin: Arc<InMemoryAdmin>,
    pub token_policy: TokenPolicy,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::with_catalogue(InMemoryCatalogue::new())
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::default()
    }

    /// Harness over a pre-built catalogue, e.g. one with latency.
    pub fn with_catalogue(catalogue: InMemoryCatalogue) -> Self {
        let clock = Arc::new(MutableClock::default());
        let cache = Arc::new(InMemorySharedCache::new(clock.clone()));
        Self {
            clock,
            cache,
            ledger: Arc::new(InMemoryLedger::new()),
            students: Arc::new(InMemoryStudents::new()),
            catalogue: Arc::new(catalogue),
            admin: Arc::new(InMemoryAdmin::new()),
            token_policy: TokenPolicy::default(),
        }
    }

    /// Create an account known to both the login store and the ledger.
    pub fn seed_student(&self, nis: i64, name: &str, role: Role, password: &str) -> StudentId {
        let id = StudentId::new(nis);
        self.students
            .seed(id, name, role, &PlainPasswordHasher::digest(password));
        self.ledger
            .add_student(id, name, crate::domain::rules::ALLOWANCE_CAP);
        id
    }

    /// Log a seeded account in.
    pub async fn login(&self, nis: i64, password: &str) -> Result<TokenPair, Error> {
        self.sessions()
            .login(&LoginCredentials::new(nis, password))
            .await
    }

    pub fn sessions(&self) -> SessionService {
        SessionService::new(
            self.students.clone(),
            Arc::new(PlainPasswordHasher),
            Arc::new(JwtTokenCodec::new(SIGNING_SECRET.to_vec())),
            self.cache.clone(),
            self.clock.clone(),
        )
        .with_policy(self.token_policy)
    }

    pub fn catalogue_service(&self) -> CatalogueService {
        CatalogueService::new(self.catalogue.clone(), self.cache.clone(), self.clock.clone())
    }

    pub fn loan_service(&self) -> LoanService {
        LoanService::new(self.ledger.clone(), self.cache.clone(), self.clock.clone())
    }

    pub fn return_service(&self) -> ReturnService {
        ReturnService::new(self.ledger.clone(), self.cache.clone(), self.clock.clone())
    }

    pub fn admin_service(&self) -> AdminService {
        AdminService::new(self.admin.clone(), self.cache.clone())
    }

    pub fn registration_service(&self) -> RegistrationService {
        RegistrationService::new(self.students.clone(), Arc::new(PlainPasswordHasher))
    }

    pub fn rate_limiter(&self, per_minute: u32) -> RateLimiter {
        RateLimiter::new(
            self.cache.clone(),
            self.clock.clone(),
            RateLimitPolicy::per_minute(per_minute),
        )
    }

    /// Handler state with insecure cookies so plain-HTTP tests see them.
    pub fn http_state(&self) -> HttpState {
        HttpState {
            catalogue: Arc::new(self.catalogue_service()),
            loans: Arc::new(self.loan_service()),
            returns: Arc::new(self.return_service()),
            admin: Arc::new(self.admin_service()),
            registration: Arc::new(self.registration_service()),
            sessions: Arc::new(self.sessions()),
            cookies: CookiePolicy { secure: false },
        }
    }
}
