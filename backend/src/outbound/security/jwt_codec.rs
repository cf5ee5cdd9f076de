//! HS256 JSON Web Token codec.
//!
//! Signature checking is delegated to `jsonwebtoken`; expiry is checked here
//! against the caller's clock so tests and production share one time source.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::domain::ports::{IssuedToken, TokenClaims, TokenCodec, TokenCodecError, TokenKind};
use crate::domain::{Role, StudentId};

/// Shortest accepted signing secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum WireKind {
    Access,
    Refresh,
}

impl From<TokenKind> for WireKind {
    fn from(kind: TokenKind) -> Self {
        match kind {
            TokenKind::Access => Self::Access,
            TokenKind::Refresh => Self::Refresh,
        }
    }
}

impl From<WireKind> for TokenKind {
    fn from(kind: WireKind) -> Self {
        match kind {
            WireKind::Access => Self::Access,
            WireKind::Refresh => Self::Refresh,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    kind: WireKind,
    iat: i64,
    exp: i64,
    jti: String,
}

/// Token codec signing with a shared secret.
#[derive(Clone)]
pub struct JwtTokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl JwtTokenCodec {
    /// Build a codec from raw secret bytes. The buffer is wiped once the
    /// signing keys are derived.
    pub fn new(secret: Vec<u8>) -> Self {
        let secret = Zeroizing::new(secret);
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.required_spec_claims = HashSet::from(["exp".to_owned(), "sub".to_owned()]);
        Self {
            encoding: EncodingKey::from_secret(&secret),
            decoding: DecodingKey::from_secret(&secret),
            validation,
        }
    }
}

fn to_delta(ttl: Duration) -> Result<TimeDelta, TokenCodecError> {
    TimeDelta::from_std(ttl).map_err(|err| TokenCodecError::signing(err.to_string()))
}

impl TokenCodec for JwtTokenCodec {
    fn issue(
        &self,
        subject: StudentId,
        role: Role,
        kind: TokenKind,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<IssuedToken, TokenCodecError> {
        let expires_at = now + to_delta(ttl)?;
        let claims = Claims {
            sub: subject.to_string(),
            role,
            kind: kind.into(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|err| TokenCodecError::signing(err.to_string()))?;
        Ok(IssuedToken { token, expires_at })
    }

    fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenCodecError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|err| {
            match err.kind() {
                ErrorKind::InvalidSignature => TokenCodecError::invalid("signature mismatch"),
                ErrorKind::InvalidToken => TokenCodecError::invalid("malformed token"),
                _ => TokenCodecError::invalid(err.to_string()),
            }
        })?;
        let claims = data.claims;
        if now.timestamp() >= claims.exp {
            return Err(TokenCodecError::expired());
        }
        let subject = claims
            .sub
            .parse::<i64>()
            .map(StudentId::new)
            .map_err(|_| TokenCodecError::invalid("subject is not a student id"))?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| TokenCodecError::invalid("expiry out of range"))?;
        Ok(TokenClaims {
            subject,
            role: claims.role,
            kind: claims.kind.into(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::{fixture, rstest};

    const TTL: Duration = Duration::from_secs(180);

    #[fixture]
    fn codec() -> JwtTokenCodec {
        JwtTokenCodec::new(b"0123456789abcdef0123456789abcdef".to_vec())
    }

    #[fixture]
    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 9, 30, 0)
            .single()
            .expect("fixture timestamp")
    }

    #[rstest]
    fn verify_returns_issued_claims(codec: JwtTokenCodec, now: DateTime<Utc>) {
        let issued = codec
            .issue(StudentId::new(42), Role::Admin, TokenKind::Refresh, now, TTL)
            .expect("issue");
        assert_eq!(issued.expires_at, now + TimeDelta::minutes(3));

        let claims = codec.verify(&issued.token, now).expect("verify");
        assert_eq!(claims.subject, StudentId::new(42));
        assert_eq!(claims.role, Role::Admin);
        assert_eq!(claims.kind, TokenKind::Refresh);
        assert_eq!(claims.expires_at, issued.expires_at);
    }

    #[rstest]
    fn tokens_issued_in_the_same_second_differ(codec: JwtTokenCodec, now: DateTime<Utc>) {
        let first = codec
            .issue(StudentId::new(1), Role::Student, TokenKind::Access, now, TTL)
            .expect("first");
        let second = codec
            .issue(StudentId::new(1), Role::Student, TokenKind::Access, now, TTL)
            .expect("second");
        assert_ne!(first.token, second.token);
    }

    #[rstest]
    #[case(TimeDelta::seconds(179), true)]
    #[case(TimeDelta::seconds(180), false)]
    #[case(TimeDelta::hours(1), false)]
    fn expiry_is_checked_against_the_supplied_clock(
        codec: JwtTokenCodec,
        now: DateTime<Utc>,
        #[case] elapsed: TimeDelta,
        #[case] valid: bool,
    ) {
        let issued = codec
            .issue(StudentId::new(1), Role::Student, TokenKind::Access, now, TTL)
            .expect("issue");
        let outcome = codec.verify(&issued.token, now + elapsed);
        if valid {
            assert!(outcome.is_ok());
        } else {
            assert_eq!(outcome, Err(TokenCodecError::Expired));
        }
    }

    #[rstest]
    fn foreign_secret_is_rejected(codec: JwtTokenCodec, now: DateTime<Utc>) {
        let other = JwtTokenCodec::new(b"ffffffffffffffffffffffffffffffff".to_vec());
        let issued = other
            .issue(StudentId::new(1), Role::Student, TokenKind::Access, now, TTL)
            .expect("issue");
        let err = codec.verify(&issued.token, now).expect_err("foreign token");
        assert!(matches!(err, TokenCodecError::Invalid { .. }));
    }

    #[rstest]
    #[case("")]
    #[case("not.a.token")]
    #[case("eyJhbGciOiJIUzI1NiJ9.e30.c2ln")]
    fn garbage_is_invalid(codec: JwtTokenCodec, now: DateTime<Utc>, #[case] raw: &str) {
        let err = codec.verify(raw, now).expect_err("garbage");
        assert!(matches!(err, TokenCodecError::Invalid { .. }));
    }
}
