//! Shared HTTP adapter state.
//!
//! Handlers receive this via `web::Data` and only reach the domain through
//! the services it carries, so they stay testable against in-memory ports.

use std::sync::Arc;

use crate::domain::{
    AdminService, CatalogueService, LoanService, RegistrationService, ReturnService,
    SessionService,
};

/// Attributes applied to the auth cookies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookiePolicy {
    /// Send cookies only over HTTPS.
    pub secure: bool,
}

impl Default for CookiePolicy {
    fn default() -> Self {
        Self { secure: true }
    }
}

/// Dependency bundle for HTTP handlers.
#[derive(Clone)]
pub struct HttpState {
    pub catalogue: Arc<CatalogueService>,
    pub loans: Arc<LoanService>,
    pub returns: Arc<ReturnService>,
    pub admin: Arc<AdminService>,
    pub registration: Arc<RegistrationService>,
    pub sessions: Arc<SessionService>,
    pub cookies: CookiePolicy,
}
