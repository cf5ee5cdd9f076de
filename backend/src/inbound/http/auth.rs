//! Request authentication.
//!
//! Access tokens are read from the `access_token` cookie or an
//! `Authorization: Bearer` header and validated by the session service.
//! Role-specific extractors reject the wrong role with `forbidden`.

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{FromRequest, HttpRequest, web};
use futures_util::future::LocalBoxFuture;

use crate::domain::{Error, Role, Session};

use super::state::HttpState;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

fn bearer(req: &HttpRequest) -> Option<String> {
    let raw = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = raw.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_owned())
}

/// The presented access token, cookie first.
pub(crate) fn access_token(req: &HttpRequest) -> Option<String> {
    req.cookie(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|token| !token.is_empty())
        .or_else(|| bearer(req))
}

async fn authenticate(req: HttpRequest, tolerate_invalid: bool) -> Result<Option<Session>, Error> {
    let state = req
        .app_data::<web::Data<HttpState>>()
        .cloned()
        .ok_or_else(|| Error::internal("HTTP state is not configured"))?;
    match access_token(&req) {
        Some(token) => state.sessions.validate(&token, tolerate_invalid).await,
        None if tolerate_invalid => Ok(None),
        None => Err(Error::unauthorized("login required")),
    }
}

fn require_role(session: Option<Session>, role: Role) -> Result<Session, Error> {
    let session = session.ok_or_else(|| Error::unauthorized("login required"))?;
    if session.role != role {
        return Err(Error::forbidden(format!("{} role required", role.as_str())));
    }
    Ok(session)
}

/// Authenticated student.
#[derive(Debug, Clone)]
pub struct StudentSession(pub Session);

/// Authenticated administrator.
#[derive(Debug, Clone)]
pub struct AdminSession(pub Session);

/// Session of any role, if the access token is still valid.
///
/// Invalid or expired access tokens yield `None` instead of an error; a
/// revoked token is still rejected. Only the refresh route uses this.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<Session>);

/// Session of any role.
#[derive(Debug, Clone)]
pub struct AnySession(pub Session);

impl FromRequest for StudentSession {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let session = authenticate(req, false).await?;
            require_role(session, Role::Student).map(Self)
        })
    }
}

impl FromRequest for AdminSession {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            let session = authenticate(req, false).await?;
            require_role(session, Role::Admin).map(Self)
        })
    }
}

impl FromRequest for AnySession {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move {
            authenticate(req, false)
                .await?
                .map(Self)
                .ok_or_else(|| Error::unauthorized("login required"))
        })
    }
}

impl FromRequest for MaybeSession {
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { authenticate(req, true).await.map(Self) })
    }
}
