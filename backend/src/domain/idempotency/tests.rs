//! Unit tests for the idempotency guard.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::future::join_all;
use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::domain::ErrorCode;
use crate::domain::ports::{CacheReplies, CacheReply, MockSharedCache};
use crate::test_support::{InMemorySharedCache, MutableClock};

#[fixture]
fn cache() -> Arc<InMemorySharedCache> {
    Arc::new(InMemorySharedCache::new(Arc::new(MutableClock::default())))
}

fn hash(value: serde_json::Value) -> PayloadHash {
    canonicalize_and_hash(&value).expect("hash")
}

#[rstest]
#[case("")]
#[case("has space")]
#[case("tab\tinside")]
fn malformed_keys_are_rejected(#[case] raw: &str) {
    assert!(IdempotencyKey::new(raw).is_err());
}

#[test]
fn overlong_keys_are_rejected() {
    let raw = "k".repeat(MAX_KEY_LEN + 1);
    assert_eq!(
        IdempotencyKey::new(raw),
        Err(IdempotencyKeyValidationError::TooLong { max: MAX_KEY_LEN })
    );
}

#[test]
fn key_order_does_not_change_fingerprint() {
    let a = hash(json!({"name": "Poetry", "meta": {"y": 1, "x": [2, 1]}}));
    let b = hash(json!({"meta": {"x": [2, 1], "y": 1}, "name": "Poetry"}));
    let c = hash(json!({"meta": {"x": [1, 2], "y": 1}, "name": "Poetry"}));
    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(a.to_hex().len(), 64);
}

#[rstest]
#[case(GuardedOperation::CreateCategory, 25 * 60)]
#[case(GuardedOperation::CreateBook, 24 * 60 * 60)]
fn operations_carry_their_ttl(#[case] op: GuardedOperation, #[case] secs: u64) {
    assert_eq!(op.ttl(), Duration::from_secs(secs));
}

#[rstest]
#[tokio::test]
async fn first_claim_wins_and_records_ttl(cache: Arc<InMemorySharedCache>) {
    let guard = IdempotencyGuard::new(cache.clone());
    let key = IdempotencyKey::new("abc-123").expect("key");
    let payload = hash(json!({"name": "Poetry"}));

    let first = guard
        .claim(&key, GuardedOperation::CreateCategory, &payload)
        .await
        .expect("claim");
    let second = guard
        .claim(&key, GuardedOperation::CreateCategory, &payload)
        .await
        .expect("claim");

    assert_eq!(first, Claim::First);
    assert_eq!(second, Claim::Duplicate { same_payload: Some(true) });
    assert_eq!(
        cache.ttl_of("idempotency:key:abc-123"),
        Some(GuardedOperation::CreateCategory.ttl())
    );
}

#[rstest]
#[tokio::test]
async fn concurrent_claims_admit_exactly_one(cache: Arc<InMemorySharedCache>) {
    let guard = IdempotencyGuard::new(cache);
    let key = IdempotencyKey::random();
    let payload = hash(json!({"isbn": "978-0"}));

    let claims = join_all(
        (0..10).map(|_| guard.claim(&key, GuardedOperation::CreateBook, &payload)),
    )
    .await;

    let firsts = claims
        .iter()
        .filter(|c| matches!(c, Ok(Claim::First)))
        .count();
    assert_eq!(firsts, 1);
}

#[rstest]
#[tokio::test]
async fn duplicate_with_different_payload_is_flagged(cache: Arc<InMemorySharedCache>) {
    let guard = IdempotencyGuard::new(cache);
    let key = IdempotencyKey::random();
    let op = GuardedOperation::CreateCategory;
    guard
        .run(&key, op, &hash(json!({"name": "A"})), || async { Ok::<_, Error>(1) })
        .await
        .expect("first run");

    let err = guard
        .run(&key, op, &hash(json!({"name": "B"})), || async { Ok::<_, Error>(2) })
        .await
        .expect_err("duplicate");

    assert_eq!(err.code(), ErrorCode::Conflict);
    assert_eq!(err.message(), "duplicate request");
    assert_eq!(
        err.details().and_then(|d| d.get("samePayload")),
        Some(&json!(false))
    );
}

#[rstest]
#[tokio::test]
async fn failed_work_releases_the_key(cache: Arc<InMemorySharedCache>) {
    let guard = IdempotencyGuard::new(cache.clone());
    let key = IdempotencyKey::new("retry-me").expect("key");
    let payload = hash(json!({"name": "A"}));
    let calls = AtomicUsize::new(0);

    let failed = guard
        .run(&key, GuardedOperation::CreateCategory, &payload, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::internal("insert failed"))
        })
        .await;
    assert!(failed.is_err());
    assert!(!cache.contains("idempotency:key:retry-me"));

    guard
        .run(&key, GuardedOperation::CreateCategory, &payload, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, Error>(())
        })
        .await
        .expect("retry succeeds");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert!(cache.contains("idempotency:key:retry-me"));
}

#[rstest]
#[tokio::test]
async fn abandoned_work_releases_the_key(cache: Arc<InMemorySharedCache>) {
    let guard = IdempotencyGuard::new(cache.clone());
    let key = IdempotencyKey::new("client-gave-up").expect("key");
    let payload = hash(json!({"name": "A"}));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(10),
        guard.run(&key, GuardedOperation::CreateCategory, &payload, || {
            std::future::pending::<Result<(), Error>>()
        }),
    )
    .await;
    assert!(abandoned.is_err());

    for _ in 0..10 {
        if !cache.contains("idempotency:key:client-gave-up") {
            break;
        }
        tokio::task::yield_now().await;
    }
    let retry = guard
        .claim(&key, GuardedOperation::CreateCategory, &payload)
        .await
        .expect("claim");
    assert_eq!(retry, Claim::First);
}

#[tokio::test]
async fn claim_fails_closed_when_cache_is_down() {
    let mut cache = MockSharedCache::new();
    cache
        .expect_execute()
        .returning(|_| Err(SharedCacheError::connection("refused")));
    let guard = IdempotencyGuard::new(Arc::new(cache));
    let ran = AtomicUsize::new(0);

    let err = guard
        .run(
            &IdempotencyKey::random(),
            GuardedOperation::CreateBook,
            &hash(json!({})),
            || async {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(())
            },
        )
        .await
        .expect_err("unavailable");

    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn release_failure_keeps_the_original_error() {
    let mut cache = MockSharedCache::new();
    let mut seq = mockall::Sequence::new();
    cache
        .expect_execute()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(CacheReplies::new(vec![CacheReply::Flag(true)])));
    cache
        .expect_execute()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(SharedCacheError::command("READONLY")));
    let guard = IdempotencyGuard::new(Arc::new(cache));

    let err = guard
        .run(
            &IdempotencyKey::random(),
            GuardedOperation::CreateBook,
            &hash(json!({})),
            || async { Err::<(), _>(Error::invalid_request("bad book")) },
        )
        .await
        .expect_err("work failed");

    assert_eq!(err.code(), ErrorCode::InvalidRequest);
    assert_eq!(err.message(), "bad book");
}
