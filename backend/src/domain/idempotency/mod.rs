//! First-writer-wins guard for mutating admin operations.
//!
//! A claim is a set-if-absent write of `idempotency:key:{key}` carrying the
//! operation name and the payload fingerprint. Only the first claimant within
//! the TTL proceeds; everyone else gets a conflict. A claim whose guarded
//! work fails, or is dropped before finishing, is released so the client may
//! retry with the same key, while a successful claim stays until it expires.

mod key;
mod payload;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, error, warn};

use super::Error;
use super::ports::{CacheKey, SharedCache, SharedCacheError, SharedCacheExt};

pub use key::{IdempotencyKey, IdempotencyKeyValidationError, MAX_KEY_LEN};
pub use payload::{PayloadHash, PayloadHashError, canonicalize_and_hash};

/// Header carrying the client key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Operations that require an idempotency key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GuardedOperation {
    CreateCategory,
    CreateBook,
}

impl GuardedOperation {
    /// How long a successful claim suppresses retries.
    pub fn ttl(self) -> Duration {
        match self {
            Self::CreateCategory => Duration::from_secs(25 * 60),
            Self::CreateBook => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateCategory => "create_category",
            Self::CreateBook => "create_book",
        }
    }
}

/// Outcome of [`IdempotencyGuard::claim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// This caller owns the key.
    First,
    /// Someone else holds the key. `same_payload` is `None` when the holder
    /// vanished between the claim and the lookup.
    Duplicate { same_payload: Option<bool> },
}

/// Idempotency guard over the shared cache.
#[derive(Clone)]
pub struct IdempotencyGuard {
    cache: Arc<dyn SharedCache>,
}

impl IdempotencyGuard {
    pub fn new(cache: Arc<dyn SharedCache>) -> Self {
        Self { cache }
    }

    /// Try to claim `key` for `operation`.
    ///
    /// Fails closed: a cache error is reported as unavailable rather than
    /// letting the operation run unguarded.
    pub async fn claim(
        &self,
        key: &IdempotencyKey,
        operation: GuardedOperation,
        payload: &PayloadHash,
    ) -> Result<Claim, Error> {
        let cache_key = CacheKey::idempotency(key.as_ref());
        let marker = marker(operation, payload);
        let first = self
            .cache
            .set_if_absent(cache_key.clone(), marker.clone(), operation.ttl())
            .await
            .map_err(claim_unavailable)?;
        if first {
            debug!(key = %key, operation = operation.as_str(), "idempotency key claimed");
            return Ok(Claim::First);
        }

        let same_payload = match self.cache.get(cache_key).await {
            Ok(stored) => stored.map(|stored| stored == marker),
            Err(err) => {
                warn!(key = %key, error = %err, "failed to read idempotency claim");
                None
            }
        };
        Ok(Claim::Duplicate { same_payload })
    }

    /// Drop a claim so the key can be reused.
    pub async fn release(&self, key: &IdempotencyKey) -> Result<(), SharedCacheError> {
        self.cache
            .delete(CacheKey::idempotency(key.as_ref()))
            .await
            .map(|_| ())
    }

    /// Run `work` under a claim on `key`.
    ///
    /// Duplicates are rejected with a conflict before `work` starts. When
    /// `work` fails the claim is released; a failed release is logged and
    /// the original error is returned. If the returned future is dropped
    /// mid-flight the release runs on a spawned task.
    pub async fn run<T, F, Fut>(
        &self,
        key: &IdempotencyKey,
        operation: GuardedOperation,
        payload: &PayloadHash,
        work: F,
    ) -> Result<T, Error>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        match self.claim(key, operation, payload).await? {
            Claim::First => {}
            Claim::Duplicate { same_payload } => {
                let mut details = json!({ "operation": operation.as_str() });
                if let Some(same) = same_payload {
                    details["samePayload"] = json!(same);
                }
                return Err(Error::conflict("duplicate request").with_details(details));
            }
        }

        let pending = PendingClaim::new(Arc::clone(&self.cache), key.clone());
        let outcome = work().await;
        match outcome {
            Ok(_) => pending.keep(),
            Err(_) => pending.release().await,
        }
        outcome
    }
}

/// A claim whose work has not settled yet. Dropping it unsettled releases
/// the key in the background.
struct PendingClaim {
    cache: Arc<dyn SharedCache>,
    key: IdempotencyKey,
    armed: bool,
}

impl PendingClaim {
    fn new(cache: Arc<dyn SharedCache>, key: IdempotencyKey) -> Self {
        Self {
            cache,
            key,
            armed: true,
        }
    }

    fn keep(mut self) {
        self.armed = false;
    }

    async fn release(mut self) {
        self.armed = false;
        release_claim(Arc::clone(&self.cache), self.key.clone()).await;
    }
}

impl Drop for PendingClaim {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cache = Arc::clone(&self.cache);
        let key = self.key.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(key = %key, "idempotent work abandoned; releasing key");
                handle.spawn(release_claim(cache, key));
            }
            Err(_) => warn!(key = %key, "no runtime to release abandoned idempotency key"),
        }
    }
}

async fn release_claim(cache: Arc<dyn SharedCache>, key: IdempotencyKey) {
    if let Err(err) = cache.delete(CacheKey::idempotency(key.as_ref())).await {
        warn!(key = %key, error = %err, "failed to release idempotency key");
    }
}

fn marker(operation: GuardedOperation, payload: &PayloadHash) -> String {
    format!("{}:{}", operation.as_str(), payload.to_hex())
}

fn claim_unavailable(err: SharedCacheError) -> Error {
    error!(error = %err, "idempotency claim failed");
    Error::service_unavailable("idempotency store unavailable")
}

#[cfg(test)]
mod tests;
