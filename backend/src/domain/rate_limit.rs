//! Sliding-window request limiter keyed by client address.
//!
//! Each client owns an ordered set scored by arrival time in milliseconds.
//! One atomic batch trims arrivals older than the window, records the new
//! arrival and reads back the count and the oldest survivor. A rejected
//! arrival removes itself again so refused traffic does not extend the wait.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use tracing::warn;
use uuid::Uuid;

use super::Error;
use super::ports::{CacheBatch, CacheKey, SharedCache, SharedCacheError};

/// Capacity and window of the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    capacity: u32,
    window: Duration,
}

impl RateLimitPolicy {
    /// `capacity` requests per rolling minute.
    pub fn per_minute(capacity: u32) -> Self {
        Self {
            capacity: capacity.max(1),
            window: Duration::from_secs(60),
        }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

/// Shared-cache backed sliding window.
#[derive(Clone)]
pub struct RateLimiter {
    cache: Arc<dyn SharedCache>,
    clock: Arc<dyn Clock>,
    policy: RateLimitPolicy,
}

struct Window {
    count: u64,
    oldest_millis: Option<i64>,
}

impl RateLimiter {
    pub fn new(cache: Arc<dyn SharedCache>, clock: Arc<dyn Clock>, policy: RateLimitPolicy) -> Self {
        Self {
            cache,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Admit or reject one request from `client`.
    ///
    /// Rejections carry the time until the oldest arrival leaves the window.
    /// Cache failures admit the request.
    pub async fn allow(&self, client: &str) -> Result<(), Error> {
        let key = CacheKey::rate_limit(client);
        let now = self.clock.utc().timestamp_millis();
        let window_millis = i64::try_from(self.policy.window.as_millis()).unwrap_or(i64::MAX);
        let member = format!("{now}-{}", Uuid::new_v4().simple());

        let observed = match self.record(&key, now, window_millis, &member).await {
            Ok(observed) => observed,
            Err(err) => {
                warn!(client, error = %err, "rate limiter unavailable; admitting request");
                return Ok(());
            }
        };
        if observed.count <= u64::from(self.policy.capacity) {
            return Ok(());
        }

        let undo = CacheBatch::new().sorted_set_remove(key.clone(), member);
        if let Err(err) = self.cache.execute(undo).await {
            warn!(client, error = %err, "failed to drop rejected arrival");
        }
        let oldest = observed.oldest_millis.unwrap_or(now);
        let wait_millis = (oldest + window_millis - now).max(0);
        let retry_after = Duration::from_millis(u64::try_from(wait_millis).unwrap_or(0));
        Err(Error::rate_limited(retry_after))
    }

    async fn record(
        &self,
        key: &CacheKey,
        now: i64,
        window_millis: i64,
        member: &str,
    ) -> Result<Window, SharedCacheError> {
        let batch = CacheBatch::atomic()
            .sorted_set_remove_by_score(key.clone(), now - window_millis)
            .sorted_set_add(key.clone(), now, member)
            .sorted_set_count(key.clone())
            .sorted_set_range_with_scores(key.clone(), 0, 0)
            .expire(key.clone(), self.policy.window);
        let mut replies = self.cache.execute(batch).await?;
        replies.skip()?;
        replies.skip()?;
        let count = replies.count()?;
        let oldest_millis = replies
            .scored_members()?
            .first()
            .map(|(_, score)| *score);
        Ok(Window {
            count,
            oldest_millis,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::domain::ports::{CacheReplies, CacheReply, MockSharedCache};
    use crate::test_support::{InMemorySharedCache, MutableClock};
    use rstest::{fixture, rstest};

    #[fixture]
    fn clock() -> Arc<MutableClock> {
        Arc::new(MutableClock::default())
    }

    fn limiter(clock: &Arc<MutableClock>, capacity: u32) -> RateLimiter {
        let cache = Arc::new(InMemorySharedCache::new(clock.clone()));
        RateLimiter::new(cache, clock.clone(), RateLimitPolicy::per_minute(capacity))
    }

    #[rstest]
    #[tokio::test]
    async fn request_over_capacity_is_limited_with_retry_after(clock: Arc<MutableClock>) {
        let limiter = limiter(&clock, 3);
        for _ in 0..3 {
            limiter.allow("10.0.0.1").await.expect("within capacity");
            clock.advance(Duration::from_secs(10));
        }

        let err = limiter.allow("10.0.0.1").await.expect_err("fourth request");

        assert_eq!(err.code(), ErrorCode::RateLimited);
        assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    }

    #[rstest]
    #[tokio::test]
    async fn clients_are_counted_separately(clock: Arc<MutableClock>) {
        let limiter = limiter(&clock, 1);
        limiter.allow("10.0.0.1").await.expect("first client");
        limiter.allow("10.0.0.2").await.expect("second client");
        assert!(limiter.allow("10.0.0.1").await.is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn window_slides_as_arrivals_age_out(clock: Arc<MutableClock>) {
        let limiter = limiter(&clock, 2);
        limiter.allow("c").await.expect("t0");
        clock.advance(Duration::from_secs(30));
        limiter.allow("c").await.expect("t30");
        assert!(limiter.allow("c").await.is_err());

        clock.advance(Duration::from_secs(31));
        limiter.allow("c").await.expect("first arrival aged out");
    }

    #[rstest]
    #[tokio::test]
    async fn rejected_arrivals_do_not_extend_the_window(clock: Arc<MutableClock>) {
        let limiter = limiter(&clock, 1);
        limiter.allow("c").await.expect("first");
        for _ in 0..5 {
            clock.advance(Duration::from_secs(10));
            assert!(limiter.allow("c").await.is_err());
        }
        clock.advance(Duration::from_secs(11));
        limiter.allow("c").await.expect("window reopened");
    }

    #[tokio::test]
    async fn cache_failure_admits_the_request() {
        let mut cache = MockSharedCache::new();
        cache
            .expect_execute()
            .returning(|_| Err(SharedCacheError::connection("refused")));
        let limiter = RateLimiter::new(
            Arc::new(cache),
            Arc::new(MutableClock::default()),
            RateLimitPolicy::per_minute(1),
        );
        for _ in 0..3 {
            limiter.allow("c").await.expect("fail open");
        }
    }

    #[tokio::test]
    async fn window_replies_decode_in_submission_order() {
        let clock = Arc::new(MutableClock::default());
        let oldest = clock.utc().timestamp_millis() - 20_000;
        let mut cache = MockSharedCache::new();
        cache
            .expect_execute()
            .withf(|batch| batch.is_atomic())
            .times(1)
            .returning(move |_| {
                Ok(CacheReplies::new(vec![
                    CacheReply::Count(0),
                    CacheReply::Count(1),
                    CacheReply::Count(2),
                    CacheReply::ScoredMembers(vec![("earlier".to_owned(), oldest)]),
                    CacheReply::Flag(true),
                ]))
            });
        cache
            .expect_execute()
            .withf(|batch| !batch.is_atomic())
            .times(1)
            .returning(|_| Ok(CacheReplies::new(vec![CacheReply::Count(1)])));
        let limiter = RateLimiter::new(Arc::new(cache), clock, RateLimitPolicy::per_minute(1));

        let err = limiter.allow("c").await.expect_err("second arrival in window");

        assert_eq!(err.retry_after(), Some(Duration::from_secs(40)));
    }

    #[test]
    fn zero_capacity_is_clamped() {
        assert_eq!(RateLimitPolicy::per_minute(0).capacity(), 1);
    }
}
