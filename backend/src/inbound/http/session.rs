//! Login, token refresh and logout.
//!
//! ```text
//! POST /api/v1/login {"nis":1234567890,"password":"..."}
//! POST /api/v1/refresh {"refreshToken":"..."}
//! POST /api/v1/logout
//! ```
//!
//! Tokens travel both as HttpOnly cookies and in the JSON body so browser and
//! non-browser clients can use the same routes.

use std::time::Duration;

use actix_web::cookie::{Cookie, SameSite, time};
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder, post, web};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::domain::{Error, LoginCredentials, TokenPair};
use crate::inbound::http::ApiResult;
use crate::inbound::http::auth::{
    ACCESS_TOKEN_COOKIE, AnySession, MaybeSession, REFRESH_TOKEN_COOKIE,
};
use crate::inbound::http::cache_control::no_store_header;
use crate::inbound::http::state::{CookiePolicy, HttpState};

/// Login request body for `POST /api/v1/login`.
#[derive(Debug, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[schema(example = 1234567890)]
    pub nis: i64,
    pub password: String,
}

/// Optional body for `POST /api/v1/refresh` when the cookie is unavailable.
#[derive(Debug, Default, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

fn token_cookie(
    name: &'static str,
    value: String,
    ttl: Duration,
    policy: CookiePolicy,
) -> Cookie<'static> {
    let max_age = time::Duration::seconds(i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX));
    Cookie::build(name, value)
        .path("/")
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Strict)
        .max_age(max_age)
        .finish()
}

fn removal_cookie(name: &'static str, policy: CookiePolicy) -> Cookie<'static> {
    let mut cookie = Cookie::build(name, "")
        .path("/")
        .http_only(true)
        .secure(policy.secure)
        .same_site(SameSite::Strict)
        .finish();
    cookie.make_removal();
    cookie
}

fn issue(state: &HttpState, mut response: HttpResponseBuilder, pair: TokenPair) -> HttpResponse {
    let policy = state.sessions.policy();
    response
        .insert_header(no_store_header())
        .cookie(token_cookie(
            ACCESS_TOKEN_COOKIE,
            pair.access_token.clone(),
            policy.access_ttl,
            state.cookies,
        ))
        .cookie(token_cookie(
            REFRESH_TOKEN_COOKIE,
            pair.refresh_token.clone(),
            policy.refresh_ttl,
            state.cookies,
        ))
        .json(pair)
}

/// Authenticate a student and open a session.
#[utoipa::path(
    post,
    path = "/api/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Session opened", body = TokenPair,
            headers(("Set-Cookie" = String, description = "access_token and refresh_token cookies"))),
        (status = 400, description = "Invalid request", body = Error),
        (status = 401, description = "Invalid credentials", body = Error),
        (status = 503, description = "Session store unavailable", body = Error)
    ),
    tags = ["session"],
    operation_id = "login",
    security([])
)]
#[post("/login")]
pub async fn login(
    state: web::Data<HttpState>,
    payload: web::Json<LoginRequest>,
) -> ApiResult<HttpResponse> {
    let LoginRequest { nis, password } = payload.into_inner();
    let pair = state
        .sessions
        .login(&LoginCredentials::new(nis, password))
        .await?;
    Ok(issue(&state, HttpResponse::Ok(), pair))
}

/// Rotate the refresh token and issue a fresh access token.
///
/// An expired or malformed access token is tolerated here; a revoked one is
/// not.
#[utoipa::path(
    post,
    path = "/api/v1/refresh",
    request_body(content = RefreshRequest, description = "Needed only without the refresh_token cookie"),
    responses(
        (status = 200, description = "Tokens rotated", body = TokenPair),
        (status = 400, description = "No refresh token presented", body = Error),
        (status = 401, description = "Refresh token expired, superseded or revoked", body = Error),
        (status = 503, description = "Session store unavailable", body = Error)
    ),
    tags = ["session"],
    operation_id = "refresh",
    security([])
)]
#[post("/refresh")]
pub async fn refresh(
    req: HttpRequest,
    state: web::Data<HttpState>,
    _session: MaybeSession,
    payload: Option<web::Json<RefreshRequest>>,
) -> ApiResult<HttpResponse> {
    let token = req
        .cookie(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_owned())
        .filter(|token| !token.is_empty())
        .or_else(|| payload.and_then(|body| body.into_inner().refresh_token))
        .filter(|token| !token.trim().is_empty())
        .ok_or_else(|| Error::invalid_request("refresh token is required"))?;
    let pair = state.sessions.refresh(&token).await?;
    Ok(issue(&state, HttpResponse::Ok(), pair))
}

/// Revoke the current session and clear the auth cookies.
#[utoipa::path(
    post,
    path = "/api/v1/logout",
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "Unauthorised", body = Error),
        (status = 503, description = "Session store unavailable", body = Error)
    ),
    tags = ["session"],
    operation_id = "logout"
)]
#[post("/logout")]
pub async fn logout(state: web::Data<HttpState>, session: AnySession) -> ApiResult<HttpResponse> {
    state.sessions.logout(&session.0).await?;
    Ok(HttpResponse::NoContent()
        .insert_header(no_store_header())
        .cookie(removal_cookie(ACCESS_TOKEN_COOKIE, state.cookies))
        .cookie(removal_cookie(REFRESH_TOKEN_COOKIE, state.cookies))
        .finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::http::header::AUTHORIZATION;
    use actix_web::{App, test};
    use serde_json::Value;

    use crate::domain::Role;
    use crate::test_support::TestHarness;

    const PASSWORD: &str = "correct horse";

    fn harness() -> TestHarness {
        let harness = TestHarness::new();
        harness.seed_student(1001, "Ada Lovelace", Role::Student, PASSWORD);
        harness
    }

    macro_rules! app {
        ($harness:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($harness.http_state()))
                    .service(
                        web::scope("/api/v1")
                            .service(login)
                            .service(refresh)
                            .service(logout),
                    ),
            )
            .await
        };
    }

    fn login_request(password: &str) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/v1/login")
            .set_json(LoginRequest {
                nis: 1001,
                password: password.to_owned(),
            })
    }

    #[actix_web::test]
    async fn login_sets_http_only_cookies_and_returns_the_pair() {
        let harness = harness();
        let app = app!(harness);

        let res = test::call_service(&app, login_request(PASSWORD).to_request()).await;
        assert_eq!(res.status(), StatusCode::OK);
        let access = res
            .response()
            .cookies()
            .find(|cookie| cookie.name() == ACCESS_TOKEN_COOKIE)
            .expect("access cookie");
        assert_eq!(access.http_only(), Some(true));
        assert_eq!(access.same_site(), Some(SameSite::Strict));
        assert_eq!(access.max_age(), Some(time::Duration::seconds(180)));
        let access_value = access.value().to_owned();

        let body: Value = test::read_body_json(res).await;
        assert_eq!(body["accessToken"].as_str(), Some(access_value.as_str()));
        assert!(body["refreshToken"].as_str().is_some());
    }

    #[actix_web::test]
    async fn wrong_password_is_unauthorized() {
        let harness = harness();
        let app = app!(harness);
        let res = test::call_service(&app, login_request("wrong password").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_rotates_and_rejects_the_superseded_token() {
        let harness = harness();
        let app = app!(harness);
        let res = test::call_service(&app, login_request(PASSWORD).to_request()).await;
        let first: Value = test::read_body_json(res).await;
        let old_refresh = first["refreshToken"].as_str().expect("refresh").to_owned();

        let res = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/refresh")
                .insert_header((AUTHORIZATION, "Bearer not-a-jwt"))
                .set_json(RefreshRequest {
                    refresh_token: Some(old_refresh.clone()),
                })
                .to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::OK);
        let rotated: Value = test::read_body_json(res).await;
        assert_ne!(rotated["refreshToken"].as_str(), Some(old_refresh.as_str()));

        let replay = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/api/v1/refresh")
                .cookie(Cookie::new(REFRESH_TOKEN_COOKIE, old_refresh))
                .to_request(),
        )
        .await;
        assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn refresh_without_a_token_is_a_bad_request() {
        let harness = harness();
        let app = app!(harness);
        let res = test::call_service(
            &app,
            test::TestRequest::post().uri("/api/v1/refresh").to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn logout_revokes_the_access_token() {
        let harness = harness();
        let app = app!(harness);
        let res = test::call_service(&app, login_request(PASSWORD).to_request()).await;
        let pair: Value = test::read_body_json(res).await;
        let access = pair["accessToken"].as_str().expect("access").to_owned();

        let logout_request = || {
            test::TestRequest::post()
                .uri("/api/v1/logout")
                .cookie(Cookie::new(ACCESS_TOKEN_COOKIE, access.clone()))
                .to_request()
        };
        let res = test::call_service(&app, logout_request()).await;
        assert_eq!(res.status(), StatusCode::NO_CONTENT);
        let cleared = res
            .response()
            .cookies()
            .find(|cookie| cookie.name() == ACCESS_TOKEN_COOKIE)
            .expect("removal cookie");
        assert_eq!(cleared.value(), "");

        let again = test::call_service(&app, logout_request()).await;
        assert_eq!(again.status(), StatusCode::UNAUTHORIZED);
    }
}
