//! Port for signing and verifying session tokens.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::{Role, StudentId};

use super::define_port_error;

define_port_error! {
    /// Errors raised by token codecs.
    pub enum TokenCodecError {
        /// Signature, structure or claims are invalid.
        Invalid { message: String } => "token is invalid: {message}",
        /// The token's expiry has passed.
        Expired => "token has expired",
        /// The token could not be signed.
        Signing { message: String } => "token signing failed: {message}",
    }
}

/// Which half of a session a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Short-lived token presented on every request.
    Access,
    /// Long-lived token exchanged for a new pair.
    Refresh,
}

/// Verified token contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    pub subject: StudentId,
    pub role: Role,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}

/// Freshly signed token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Port for the token codec. Every issued token is unique, even for the
/// same subject within the same second.
#[cfg_attr(test, mockall::automock)]
pub trait TokenCodec: Send + Sync {
    /// Sign a token for `subject` valid for `ttl` from `now`.
    fn issue(
        &self,
        subject: StudentId,
        role: Role,
        kind: TokenKind,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenCodecError>;

    /// Check signature and expiry against `now`, returning the claims.
    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenCodecError>;
}
