//! Access/refresh token lifecycle.
//!
//! The shared cache is the source of truth for liveness: the refresh record
//! under `library:accesstoken:id:{student}` names the only refresh token that
//! may be exchanged, and `blacklist:accesstoken:{token}` revokes an access
//! token before its natural expiry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use utoipa::ToSchema;

use super::ports::{
    CacheBatch, CacheKey, IssuedToken, PasswordHasher, SharedCache, SharedCacheError,
    SharedCacheExt, StudentRepository, StudentRepositoryError, TokenCodec, TokenCodecError,
    TokenKind,
};
use super::{Error, LoginCredentials, Role, StudentId};

/// Token lifetimes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::from_secs(3 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

/// Tokens handed to a client after login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Authenticated request context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub student: StudentId,
    pub role: Role,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Issues, validates, rotates and revokes sessions.
#[derive(Clone)]
pub struct SessionService {
    students: Arc<dyn StudentRepository>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<dyn TokenCodec>,
    cache: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
    policy: TokenPolicy,
}

impl SessionService {
    pub fn new(
        students: Arc<dyn StudentRepository>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<dyn TokenCodec>,
        cache: Arc<dyn SharedCache>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            students,
            hasher,
            tokens,
            cache,
            clock,
            policy: TokenPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: TokenPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> TokenPolicy {
        self.policy
    }

    /// Verify credentials and open a session, superseding any earlier one.
    pub async fn login(&self, credentials: &LoginCredentials) -> Result<TokenPair, Error> {
        let stored = self
            .students
            .find_credentials(credentials.nis())
            .await
            .map_err(map_student_error)?
            .ok_or_else(invalid_credentials)?;
        let matches = self
            .hasher
            .verify(credentials.password(), &stored.password_hash)
            .map_err(|err| {
                error!(student = %stored.id, error = %err, "password verification failed");
                Error::internal(err.to_string())
            })?;
        if !matches {
            return Err(invalid_credentials());
        }

        let pair = self.open(stored.id, stored.role).await?;
        info!(student = %stored.id, "student logged in");
        Ok(pair)
    }

    /// Authenticate an access token.
    ///
    /// A structurally invalid or expired token yields `Ok(None)` when
    /// `tolerate_invalid` is set (refresh requests) and `unauthorized`
    /// otherwise. Blacklisted tokens are always rejected.
    pub async fn validate(
        &self,
        token: &str,
        tolerate_invalid: bool,
    ) -> Result<Option<Session>, Error> {
        let claims = match self.tokens.verify(token, self.clock.utc()) {
            Ok(claims) if claims.kind == TokenKind::Access => claims,
            Ok(_) | Err(_) if tolerate_invalid => return Ok(None),
            Ok(_) => return Err(Error::unauthorized("invalid token")),
            Err(err) => return Err(map_token_error(err)),
        };

        let revoked = self
            .cache
            .get(CacheKey::blacklist(token))
            .await
            .map_err(|err| cache_unavailable("blacklist lookup", err))?;
        if revoked.is_some() {
            debug!(student = %claims.subject, "rejected blacklisted token");
            return Err(Error::unauthorized("token revoked"));
        }

        Ok(Some(Session {
            student: claims.subject,
            role: claims.role,
            access_token: token.to_owned(),
            expires_at: claims.expires_at,
        }))
    }

    /// Exchange a live refresh token for a new pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, Error> {
        let claims = match self.tokens.verify(refresh_token, self.clock.utc()) {
            Ok(claims) if claims.kind == TokenKind::Refresh => claims,
            Ok(_) => return Err(Error::unauthorized("invalid token")),
            Err(err) => return Err(map_token_error(err)),
        };

        let stored = self
            .cache
            .get(CacheKey::refresh_token(claims.subject))
            .await
            .map_err(|err| cache_unavailable("refresh lookup", err))?;
        if stored.as_deref() != Some(refresh_token) {
            warn!(student = %claims.subject, "refresh token superseded or revoked");
            return Err(Error::unauthorized("session expired"));
        }

        self.open(claims.subject, claims.role).await
    }

    /// Revoke the session: drop the refresh record and blacklist the access
    /// token for at least its remaining lifetime, in one atomic batch.
    pub async fn logout(&self, session: &Session) -> Result<(), Error> {
        let remaining = (session.expires_at - self.clock.utc())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .max(Duration::from_secs(1));
        let batch = CacheBatch::atomic()
            .delete(CacheKey::refresh_token(session.student))
            .set_with_ttl(CacheKey::blacklist(&session.access_token), "revoked", remaining);
        self.cache
            .execute(batch)
            .await
            .map_err(|err| cache_unavailable("logout", err))?;
        info!(student = %session.student, "student logged out");
        Ok(())
    }

    async fn open(&self, student: StudentId, role: Role) -> Result<TokenPair, Error> {
        let now = self.clock.utc();
        let access = self.issue(student, role, TokenKind::Access, now, self.policy.access_ttl)?;
        let refresh = self.issue(student, role, TokenKind::Refresh, now, self.policy.refresh_ttl)?;
        self.cache
            .set_with_ttl(
                CacheKey::refresh_token(student),
                refresh.token.clone(),
                self.policy.refresh_ttl,
            )
            .await
            .map_err(|err| cache_unavailable("refresh record write", err))?;
        Ok(TokenPair {
            access_token: access.token,
            access_expires_at: access.expires_at,
            refresh_token: refresh.token,
            refresh_expires_at: refresh.expires_at,
        })
    }

    fn issue(
        &self,
        student: StudentId,
        role: Role,
        kind: TokenKind,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<IssuedToken, Error> {
        self.tokens
            .issue(student, role, kind, now, ttl)
            .map_err(|err| {
                error!(student = %student, error = %err, "token signing failed");
                Error::internal(err.to_string())
            })
    }
}

fn invalid_credentials() -> Error {
    Error::unauthorized("invalid credentials")
}

fn map_token_error(err: TokenCodecError) -> Error {
    match err {
        TokenCodecError::Expired => Error::unauthorized("token expired"),
        TokenCodecError::Invalid { .. } => Error::unauthorized("invalid token"),
        TokenCodecError::Signing { message } => Error::internal(message),
    }
}

fn map_student_error(err: StudentRepositoryError) -> Error {
    error!(error = %err, "student lookup failed");
    match err {
        StudentRepositoryError::Connection { .. } => {
            Error::service_unavailable("student store unavailable")
        }
        other => Error::internal(other.to_string()),
    }
}

fn cache_unavailable(operation: &str, err: SharedCacheError) -> Error {
    error!(operation, error = %err, "session cache call failed");
    Error::service_unavailable("session store unavailable")
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
