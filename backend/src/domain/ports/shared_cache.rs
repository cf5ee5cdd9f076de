//! Port for the process-external shared cache.
//!
//! Callers describe work as a [`CacheBatch`]: enqueue commands, execute the
//! batch (optionally as one atomic unit), then read the replies back in
//! order from [`CacheReplies`].

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;

use super::{CacheKey, define_port_error};

define_port_error! {
    /// Errors raised by shared cache adapters.
    pub enum SharedCacheError {
        /// The cache could not be reached.
        Connection { message: String } => "shared cache connection failed: {message}",
        /// The cache rejected a command.
        Command { message: String } => "shared cache command failed: {message}",
        /// A reply did not have the expected shape.
        Decode { message: String } => "shared cache reply could not be decoded: {message}",
    }
}

/// One queued cache command.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheCommand {
    /// Read a string value. Replies [`CacheReply::Value`].
    Get { key: CacheKey },
    /// Unconditional write with expiry. Replies [`CacheReply::Done`].
    SetWithTtl { key: CacheKey, value: String, ttl: Duration },
    /// Write only when the key is absent. Replies [`CacheReply::Flag`].
    SetIfAbsent { key: CacheKey, value: String, ttl: Duration },
    /// Remove a key. Replies [`CacheReply::Count`].
    Delete { key: CacheKey },
    /// Add a scored member to an ordered set. Replies [`CacheReply::Count`].
    SortedSetAdd { key: CacheKey, score: i64, member: String },
    /// Members by rank, inclusive on both ends. Replies [`CacheReply::Members`].
    SortedSetRange { key: CacheKey, start: isize, stop: isize },
    /// Members with scores by rank. Replies [`CacheReply::ScoredMembers`].
    SortedSetRangeWithScores { key: CacheKey, start: isize, stop: isize },
    /// Remove members scored at or below `max`. Replies [`CacheReply::Count`].
    SortedSetRemoveByScore { key: CacheKey, max: i64 },
    /// Remove one member. Replies [`CacheReply::Count`].
    SortedSetRemove { key: CacheKey, member: String },
    /// Ordered set cardinality. Replies [`CacheReply::Count`].
    SortedSetCount { key: CacheKey },
    /// Write hash fields. Replies [`CacheReply::Count`].
    HashSet { key: CacheKey, fields: Vec<(String, String)> },
    /// Read every hash field. Replies [`CacheReply::Fields`].
    HashGetAll { key: CacheKey },
    /// Reset a key's expiry. Replies [`CacheReply::Flag`].
    Expire { key: CacheKey, ttl: Duration },
}

/// Decoded reply for one [`CacheCommand`].
#[derive(Debug, Clone, PartialEq)]
pub enum CacheReply {
    /// Command succeeded without a payload.
    Done,
    /// String read; `None` means the key is absent, distinct from `Some("")`.
    Value(Option<String>),
    /// Boolean outcome such as "was the key set".
    Flag(bool),
    /// Integer outcome such as a cardinality or removal count.
    Count(u64),
    /// Ordered set members.
    Members(Vec<String>),
    /// Ordered set members with their integral scores.
    ScoredMembers(Vec<(String, i64)>),
    /// Hash fields; empty when the key is absent.
    Fields(BTreeMap<String, String>),
}

/// Builder for a batch of cache commands.
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use lending::domain::ports::{CacheBatch, CacheKey};
///
/// let key = CacheKey::new("demo").unwrap();
/// let batch = CacheBatch::atomic()
///     .delete(key.clone())
///     .set_with_ttl(key, "v", Duration::from_secs(1));
/// assert!(batch.is_atomic());
/// assert_eq!(batch.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheBatch {
    atomic: bool,
    commands: Vec<CacheCommand>,
}

impl CacheBatch {
    /// Pipelined batch; commands may interleave with other clients.
    pub fn new() -> Self {
        Self::default()
    }

    /// Batch executed as a single atomic unit.
    pub fn atomic() -> Self {
        Self {
            atomic: true,
            commands: Vec::new(),
        }
    }

    /// Whether the batch must run atomically.
    pub fn is_atomic(&self) -> bool {
        self.atomic
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Queued commands in submission order.
    pub fn commands(&self) -> &[CacheCommand] {
        &self.commands
    }

    /// Consume the batch into its commands.
    pub fn into_commands(self) -> Vec<CacheCommand> {
        self.commands
    }

    /// Enqueue an arbitrary command.
    pub fn push(mut self, command: CacheCommand) -> Self {
        self.commands.push(command);
        self
    }

    pub fn get(self, key: CacheKey) -> Self {
        self.push(CacheCommand::Get { key })
    }

    pub fn set_with_ttl(self, key: CacheKey, value: impl Into<String>, ttl: Duration) -> Self {
        self.push(CacheCommand::SetWithTtl {
            key,
            value: value.into(),
            ttl,
        })
    }

    pub fn set_if_absent(self, key: CacheKey, value: impl Into<String>, ttl: Duration) -> Self {
        self.push(CacheCommand::SetIfAbsent {
            key,
            value: value.into(),
            ttl,
        })
    }

    pub fn delete(self, key: CacheKey) -> Self {
        self.push(CacheCommand::Delete { key })
    }

    pub fn sorted_set_add(self, key: CacheKey, score: i64, member: impl Into<String>) -> Self {
        self.push(CacheCommand::SortedSetAdd {
            key,
            score,
            member: member.into(),
        })
    }

    pub fn sorted_set_range(self, key: CacheKey, start: isize, stop: isize) -> Self {
        self.push(CacheCommand::SortedSetRange { key, start, stop })
    }

    pub fn sorted_set_range_with_scores(self, key: CacheKey, start: isize, stop: isize) -> Self {
        self.push(CacheCommand::SortedSetRangeWithScores { key, start, stop })
    }

    pub fn sorted_set_remove_by_score(self, key: CacheKey, max: i64) -> Self {
        self.push(CacheCommand::SortedSetRemoveByScore { key, max })
    }

    pub fn sorted_set_remove(self, key: CacheKey, member: impl Into<String>) -> Self {
        self.push(CacheCommand::SortedSetRemove {
            key,
            member: member.into(),
        })
    }

    pub fn sorted_set_count(self, key: CacheKey) -> Self {
        self.push(CacheCommand::SortedSetCount { key })
    }

    pub fn hash_set(self, key: CacheKey, fields: Vec<(String, String)>) -> Self {
        self.push(CacheCommand::HashSet { key, fields })
    }

    pub fn hash_get_all(self, key: CacheKey) -> Self {
        self.push(CacheCommand::HashGetAll { key })
    }

    pub fn expire(self, key: CacheKey, ttl: Duration) -> Self {
        self.push(CacheCommand::Expire { key, ttl })
    }
}

/// Replies of an executed batch, consumed in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheReplies {
    replies: VecDeque<CacheReply>,
}

impl CacheReplies {
    /// Wrap decoded replies.
    pub fn new(replies: Vec<CacheReply>) -> Self {
        Self {
            replies: replies.into(),
        }
    }

    fn take(&mut self, expected: &str) -> Result<CacheReply, SharedCacheError> {
        self.replies
            .pop_front()
            .ok_or_else(|| SharedCacheError::decode(format!("missing {expected} reply")))
    }

    fn mismatch(expected: &str, got: &CacheReply) -> SharedCacheError {
        SharedCacheError::decode(format!("expected {expected} reply, got {got:?}"))
    }

    /// Skip a reply whose payload is irrelevant.
    pub fn skip(&mut self) -> Result<(), SharedCacheError> {
        self.take("any").map(|_| ())
    }

    pub fn value(&mut self) -> Result<Option<String>, SharedCacheError> {
        match self.take("value")? {
            CacheReply::Value(value) => Ok(value),
            other => Err(Self::mismatch("value", &other)),
        }
    }

    pub fn flag(&mut self) -> Result<bool, SharedCacheError> {
        match self.take("flag")? {
            CacheReply::Flag(flag) => Ok(flag),
            other => Err(Self::mismatch("flag", &other)),
        }
    }

    pub fn count(&mut self) -> Result<u64, SharedCacheError> {
        match self.take("count")? {
            CacheReply::Count(count) => Ok(count),
            other => Err(Self::mismatch("count", &other)),
        }
    }

    pub fn members(&mut self) -> Result<Vec<String>, SharedCacheError> {
        match self.take("members")? {
            CacheReply::Members(members) => Ok(members),
            other => Err(Self::mismatch("members", &other)),
        }
    }

    pub fn scored_members(&mut self) -> Result<Vec<(String, i64)>, SharedCacheError> {
        match self.take("scored members")? {
            CacheReply::ScoredMembers(members) => Ok(members),
            other => Err(Self::mismatch("scored members", &other)),
        }
    }

    pub fn fields(&mut self) -> Result<BTreeMap<String, String>, SharedCacheError> {
        match self.take("fields")? {
            CacheReply::Fields(fields) => Ok(fields),
            other => Err(Self::mismatch("fields", &other)),
        }
    }
}

/// Port for the shared cache.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Execute every queued command and return one reply per command.
    ///
    /// Atomic batches either apply all commands or none.
    async fn execute(&self, batch: CacheBatch) -> Result<CacheReplies, SharedCacheError>;
}

/// Single-command conveniences over [`SharedCache`].
#[async_trait]
pub trait SharedCacheExt: SharedCache {
    /// Read a string value.
    async fn get(&self, key: CacheKey) -> Result<Option<String>, SharedCacheError> {
        self.execute(CacheBatch::new().get(key)).await?.value()
    }

    /// Write a string value with expiry.
    async fn set_with_ttl(
        &self,
        key: CacheKey,
        value: String,
        ttl: Duration,
    ) -> Result<(), SharedCacheError> {
        self.execute(CacheBatch::new().set_with_ttl(key, value, ttl))
            .await?
            .skip()
    }

    /// Atomically claim `key`; true only for the first caller.
    async fn set_if_absent(
        &self,
        key: CacheKey,
        value: String,
        ttl: Duration,
    ) -> Result<bool, SharedCacheError> {
        self.execute(CacheBatch::new().set_if_absent(key, value, ttl))
            .await?
            .flag()
    }

    /// Remove a key; true when it existed.
    async fn delete(&self, key: CacheKey) -> Result<bool, SharedCacheError> {
        let removed = self.execute(CacheBatch::new().delete(key)).await?.count()?;
        Ok(removed > 0)
    }
}

impl<T: SharedCache + ?Sized> SharedCacheExt for T {}
