//! Access/refresh token lifecycle over the in-memory cache.

use std::time::Duration;

use lending::domain::{ErrorCode, Role};
use lending::test_support::TestHarness;
use rstest::{fixture, rstest};

const NIS: i64 = 4242;
const PASSWORD: &str = "open sesame";

#[fixture]
fn harness() -> TestHarness {
    let harness = TestHarness::new();
    harness.seed_student(NIS, "Grace Hopper", Role::Student, PASSWORD);
    harness
}

#[rstest]
#[tokio::test]
async fn refresh_rotates_and_retires_the_previous_token(harness: TestHarness) {
    let sessions = harness.sessions();
    let first = harness.login(NIS, PASSWORD).await.expect("login");

    let second = sessions.refresh(&first.refresh_token).await.expect("rotate");
    assert_ne!(second.refresh_token, first.refresh_token);
    assert_ne!(second.access_token, first.access_token);

    let replay = sessions
        .refresh(&first.refresh_token)
        .await
        .expect_err("superseded");
    assert_eq!(replay.code(), ErrorCode::Unauthorized);
    sessions
        .refresh(&second.refresh_token)
        .await
        .expect("current token still works");
}

#[rstest]
#[tokio::test]
async fn token_kinds_are_not_interchangeable(harness: TestHarness) {
    let sessions = harness.sessions();
    let pair = harness.login(NIS, PASSWORD).await.expect("login");

    let err = sessions
        .refresh(&pair.access_token)
        .await
        .expect_err("access token cannot refresh");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    let err = sessions
        .validate(&pair.refresh_token, false)
        .await
        .expect_err("refresh token cannot authenticate");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

#[rstest]
#[tokio::test]
async fn expired_access_tokens_are_only_tolerated_on_refresh(harness: TestHarness) {
    let sessions = harness.sessions();
    let pair = harness.login(NIS, PASSWORD).await.expect("login");
    harness.clock.advance(Duration::from_secs(181));

    let err = sessions
        .validate(&pair.access_token, false)
        .await
        .expect_err("expired");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
    let tolerated = sessions
        .validate(&pair.access_token, true)
        .await
        .expect("tolerated");
    assert!(tolerated.is_none());
    sessions
        .refresh(&pair.refresh_token)
        .await
        .expect("refresh outlives access");
}

#[rstest]
#[tokio::test]
async fn logout_revokes_both_tokens(harness: TestHarness) {
    let sessions = harness.sessions();
    let pair = harness.login(NIS, PASSWORD).await.expect("login");
    let session = sessions
        .validate(&pair.access_token, false)
        .await
        .expect("valid")
        .expect("session");

    sessions.logout(&session).await.expect("logout");

    for tolerate in [false, true] {
        let err = sessions
            .validate(&pair.access_token, tolerate)
            .await
            .expect_err("blacklisted");
        assert_eq!(err.code(), ErrorCode::Unauthorized);
    }
    let err = sessions
        .refresh(&pair.refresh_token)
        .await
        .expect_err("refresh record dropped");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

#[rstest]
#[tokio::test]
async fn a_new_login_supersedes_the_old_refresh_token(harness: TestHarness) {
    let sessions = harness.sessions();
    let first = harness.login(NIS, PASSWORD).await.expect("first login");
    let _second = harness.login(NIS, PASSWORD).await.expect("second login");

    let err = sessions
        .refresh(&first.refresh_token)
        .await
        .expect_err("superseded");
    assert_eq!(err.code(), ErrorCode::Unauthorized);
}

#[rstest]
#[tokio::test]
async fn an_unreachable_cache_fails_closed(harness: TestHarness) {
    let sessions = harness.sessions();
    let pair = harness.login(NIS, PASSWORD).await.expect("login");
    harness.cache.set_unavailable(true);

    let err = sessions
        .validate(&pair.access_token, false)
        .await
        .expect_err("blacklist unreadable");
    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
}
