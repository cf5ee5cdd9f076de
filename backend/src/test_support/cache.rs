//! In-process stand-in for the shared cache.
//!
//! Follows Redis semantics for the commands the domain issues: keys expire
//! against the injected clock, ordered sets sort by score then member, and
//! emptied ordered sets disappear. A whole batch runs under one lock, so
//! every batch is atomic.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mockable::Clock;

use crate::domain::ports::{
    CacheBatch, CacheCommand, CacheReplies, CacheReply, SharedCache, SharedCacheError,
};

#[derive(Debug, Clone)]
enum Stored {
    Text(String),
    Sorted(Vec<(String, i64)>),
    Hash(BTreeMap<String, String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Stored,
    expires_at: Option<DateTime<Utc>>,
}

type Entries = HashMap<String, Entry>;

/// Shared cache held in process memory.
pub struct InMemorySharedCache {
    entries: Mutex<Entries>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemorySharedCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Make every subsequent call fail with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Whether `key` exists and has not expired.
    pub fn contains(&self, key: &str) -> bool {
        let now = self.clock.utc();
        live(&mut self.lock(), key, now).is_some()
    }

    /// Remaining lifetime of `key`.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = self.clock.utc();
        let mut entries = self.lock();
        let expires_at = live(&mut entries, key, now)?.expires_at?;
        (expires_at - now).to_std().ok()
    }

    /// String value stored under `key`.
    pub fn raw_value(&self, key: &str) -> Option<String> {
        let now = self.clock.utc();
        match &live(&mut self.lock(), key, now)?.value {
            Stored::Text(text) => Some(text.clone()),
            _ => None,
        }
    }

    /// Store a string without expiry.
    pub fn put_raw(&self, key: &str, value: &str) {
        self.lock().insert(
            key.to_owned(),
            Entry {
                value: Stored::Text(value.to_owned()),
                expires_at: None,
            },
        );
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn execute(&self, batch: CacheBatch) -> Result<CacheReplies, SharedCacheError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SharedCacheError::connection("cache offline"));
        }
        let now = self.clock.utc();
        let mut entries = self.lock();
        let replies = batch
            .into_commands()
            .into_iter()
            .map(|command| apply(&mut entries, command, now))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CacheReplies::new(replies))
    }
}

fn live<'a>(entries: &'a mut Entries, key: &str, now: DateTime<Utc>) -> Option<&'a mut Entry> {
    let expired = entries
        .get(key)
        .and_then(|entry| entry.expires_at)
        .is_some_and(|at| at <= now);
    if expired {
        entries.remove(key);
    }
    entries.get_mut(key)
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    TimeDelta::from_std(ttl).ok().map(|ttl| now + ttl)
}

fn wrong_type(key: &str) -> SharedCacheError {
    SharedCacheError::command(format!("WRONGTYPE {key}"))
}

fn sorted_mut<'a>(
    entries: &'a mut Entries,
    key: &str,
    now: DateTime<Utc>,
) -> Result<Option<&'a mut Vec<(String, i64)>>, SharedCacheError> {
    match live(entries, key, now) {
        None => Ok(None),
        Some(Entry {
            value: Stored::Sorted(members),
            ..
        }) => Ok(Some(members)),
        Some(_) => Err(wrong_type(key)),
    }
}

fn window(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = isize::try_from(len).ok()?;
    let start = if start < 0 { len + start } else { start }.max(0);
    let stop = if stop < 0 { len + stop } else { stop }.min(len - 1);
    if len == 0 || start > stop || start >= len {
        return None;
    }
    Some((usize::try_from(start).ok()?, usize::try_from(stop).ok()?))
}

fn apply(
    entries: &mut Entries,
    command: CacheCommand,
    now: DateTime<Utc>,
) -> Result<CacheReply, SharedCacheError> {
    match command {
        CacheCommand::Get { key } => match live(entries, key.as_str(), now) {
            None => Ok(CacheReply::Value(None)),
            Some(Entry {
                value: Stored::Text(text),
                ..
            }) => Ok(CacheReply::Value(Some(text.clone()))),
            Some(_) => Err(wrong_type(key.as_str())),
        },
        CacheCommand::SetWithTtl { key, value, ttl } => {
            entries.insert(
                key.as_str().to_owned(),
                Entry {
                    value: Stored::Text(value),
                    expires_at: expiry(now, ttl),
                },
            );
            Ok(CacheReply::Done)
        }
        CacheCommand::SetIfAbsent { key, value, ttl } => {
            if live(entries, key.as_str(), now).is_some() {
                return Ok(CacheReply::Flag(false));
            }
            entries.insert(
                key.as_str().to_owned(),
                Entry {
                    value: Stored::Text(value),
                    expires_at: expiry(now, ttl),
                },
            );
            Ok(CacheReply::Flag(true))
        }
        CacheCommand::Delete { key } => {
            let existed = live(entries, key.as_str(), now).is_some();
            entries.remove(key.as_str());
            Ok(CacheReply::Count(u64::from(existed)))
        }
        CacheCommand::SortedSetAdd { key, score, member } => {
            let members = match sorted_mut(entries, key.as_str(), now)? {
                Some(members) => members,
                None => {
                    entries.insert(
                        key.as_str().to_owned(),
                        Entry {
                            value: Stored::Sorted(Vec::new()),
                            expires_at: None,
                        },
                    );
                    sorted_mut(entries, key.as_str(), now)?
                        .ok_or_else(|| SharedCacheError::command("ZADD lost key"))?
                }
            };
            let added = match members.iter_mut().find(|(m, _)| *m == member) {
                Some(existing) => {
                    existing.1 = score;
                    0
                }
                None => {
                    members.push((member, score));
                    1
                }
            };
            members.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            Ok(CacheReply::Count(added))
        }
        CacheCommand::SortedSetRange { key, start, stop } => {
            let members = sorted_mut(entries, key.as_str(), now)?
                .map(|members| slice(members, start, stop))
                .unwrap_or_default();
            Ok(CacheReply::Members(
                members.into_iter().map(|(member, _)| member).collect(),
            ))
        }
        CacheCommand::SortedSetRangeWithScores { key, start, stop } => {
            let members = sorted_mut(entries, key.as_str(), now)?
                .map(|members| slice(members, start, stop))
                .unwrap_or_default();
            Ok(CacheReply::ScoredMembers(members))
        }
        CacheCommand::SortedSetRemoveByScore { key, max } => {
            let removed = remove_where(entries, key.as_str(), now, |(_, score)| *score <= max)?;
            Ok(CacheReply::Count(removed))
        }
        CacheCommand::SortedSetRemove { key, member } => {
            let removed = remove_where(entries, key.as_str(), now, |(m, _)| *m == member)?;
            Ok(CacheReply::Count(removed))
        }
        CacheCommand::SortedSetCount { key } => {
            let count = sorted_mut(entries, key.as_str(), now)?.map_or(0, |members| members.len());
            Ok(CacheReply::Count(u64::try_from(count).unwrap_or(u64::MAX)))
        }
        CacheCommand::HashSet { key, fields } => {
            let hash = match live(entries, key.as_str(), now) {
                Some(Entry {
                    value: Stored::Hash(hash),
                    ..
                }) => hash,
                Some(_) => return Err(wrong_type(key.as_str())),
                None => {
                    let entry = entries.entry(key.as_str().to_owned()).or_insert(Entry {
                        value: Stored::Hash(BTreeMap::new()),
                        expires_at: None,
                    });
                    match &mut entry.value {
                        Stored::Hash(hash) => hash,
                        _ => return Err(wrong_type(key.as_str())),
                    }
                }
            };
            let added = fields
                .into_iter()
                .filter(|(field, value)| hash.insert(field.clone(), value.clone()).is_none())
                .count();
            Ok(CacheReply::Count(u64::try_from(added).unwrap_or(u64::MAX)))
        }
        CacheCommand::HashGetAll { key } => match live(entries, key.as_str(), now) {
            None => Ok(CacheReply::Fields(BTreeMap::new())),
            Some(Entry {
                value: Stored::Hash(hash),
                ..
            }) => Ok(CacheReply::Fields(hash.clone())),
            Some(_) => Err(wrong_type(key.as_str())),
        },
        CacheCommand::Expire { key, ttl } => match live(entries, key.as_str(), now) {
            Some(entry) => {
                entry.expires_at = expiry(now, ttl);
                Ok(CacheReply::Flag(true))
            }
            None => Ok(CacheReply::Flag(false)),
        },
    }
}

fn slice(members: &[(String, i64)], start: isize, stop: isize) -> Vec<(String, i64)> {
    window(members.len(), start, stop)
        .map(|(from, to)| members[from..=to].to_vec())
        .unwrap_or_default()
}

fn remove_where<F>(
    entries: &mut Entries,
    key: &str,
    now: DateTime<Utc>,
    predicate: F,
) -> Result<u64, SharedCacheError>
where
    F: Fn(&(String, i64)) -> bool,
{
    let Some(members) = sorted_mut(entries, key, now)? else {
        return Ok(0);
    };
    let before = members.len();
    members.retain(|member| !predicate(member));
    let removed = before - members.len();
    if members.is_empty() {
        entries.remove(key);
    }
    Ok(u64::try_from(removed).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::{CacheKey, SharedCacheExt};
    use crate::test_support::MutableClock;

    fn key(raw: &str) -> CacheKey {
        CacheKey::new(raw).expect("key")
    }

    #[tokio::test]
    async fn ranges_follow_redis_indexing() {
        let cache = InMemorySharedCache::new(Arc::new(MutableClock::default()));
        let batch = CacheBatch::new()
            .sorted_set_add(key("z"), 3, "c")
            .sorted_set_add(key("z"), 1, "a")
            .sorted_set_add(key("z"), 2, "b")
            .sorted_set_range(key("z"), 0, -1)
            .sorted_set_range(key("z"), 1, 10)
            .sorted_set_range(key("z"), 5, 6);
        let mut replies = cache.execute(batch).await.expect("batch");
        for _ in 0..3 {
            replies.skip().expect("zadd");
        }
        assert_eq!(replies.members().expect("all"), ["a", "b", "c"]);
        assert_eq!(replies.members().expect("tail"), ["b", "c"]);
        assert!(replies.members().expect("out of range").is_empty());
    }

    #[tokio::test]
    async fn keys_expire_against_the_clock() {
        let clock = Arc::new(MutableClock::default());
        let cache = InMemorySharedCache::new(clock.clone());
        cache
            .set_with_ttl(key("k"), "v".into(), Duration::from_secs(5))
            .await
            .expect("set");
        clock.advance(Duration::from_secs(5));
        assert_eq!(cache.get(key("k")).await.expect("get"), None);
    }

    #[tokio::test]
    async fn set_if_absent_only_admits_first_writer() {
        let cache = InMemorySharedCache::new(Arc::new(MutableClock::default()));
        let ttl = Duration::from_secs(60);
        assert!(cache.set_if_absent(key("k"), "1".into(), ttl).await.expect("first"));
        assert!(!cache.set_if_absent(key("k"), "2".into(), ttl).await.expect("second"));
        assert_eq!(cache.raw_value("k").as_deref(), Some("1"));
    }
}
