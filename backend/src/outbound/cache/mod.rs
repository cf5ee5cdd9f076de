//! Redis-backed shared cache adapter.
//!
//! A [`CacheBatch`] becomes one Redis pipeline; atomic batches are wrapped in
//! `MULTI`/`EXEC`. Replies are decoded into [`CacheReply`] values in command
//! order, accepting both RESP2 and RESP3 shapes.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, RunError};
use bb8_redis::redis::{self, RedisError, Value};
use tracing::debug;

use crate::domain::ports::{
    CacheBatch, CacheCommand, CacheReplies, CacheReply, SharedCache, SharedCacheError,
};

/// Pooled Redis connections.
pub type RedisPool = Pool<RedisConnectionManager>;

/// Build a Redis connection pool.
///
/// # Errors
/// Returns [`SharedCacheError::Connection`] when the URL is invalid or the
/// initial connections cannot be established.
pub async fn connect(url: &str, max_size: u32) -> Result<RedisPool, SharedCacheError> {
    let manager = RedisConnectionManager::new(url)
        .map_err(|err| SharedCacheError::connection(err.to_string()))?;
    Pool::builder()
        .max_size(max_size)
        .build(manager)
        .await
        .map_err(|err| SharedCacheError::connection(err.to_string()))
}

/// [`SharedCache`] adapter over a Redis pool.
#[derive(Clone)]
pub struct RedisSharedCache {
    pool: RedisPool,
}

impl RedisSharedCache {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

// Shape expected back from Redis for one queued command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    Done,
    SetFlag,
    IntFlag,
    Count,
    Members,
    ScoredMembers,
    Fields,
}

// A command either goes to Redis or is answered locally.
enum Planned {
    Remote(Expect),
    Local(CacheReply),
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

fn plan(command: CacheCommand, pipe: &mut redis::Pipeline) -> Planned {
    let expect = match command {
        CacheCommand::Get { key } => {
            pipe.cmd("GET").arg(key.as_str());
            Expect::Value
        }
        CacheCommand::SetWithTtl { key, value, ttl } => {
            pipe.cmd("SET")
                .arg(key.as_str())
                .arg(value)
                .arg("PX")
                .arg(millis(ttl));
            Expect::Done
        }
        CacheCommand::SetIfAbsent { key, value, ttl } => {
            pipe.cmd("SET")
                .arg(key.as_str())
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(millis(ttl));
            Expect::SetFlag
        }
        CacheCommand::Delete { key } => {
            pipe.cmd("DEL").arg(key.as_str());
            Expect::Count
        }
        CacheCommand::SortedSetAdd { key, score, member } => {
            pipe.cmd("ZADD").arg(key.as_str()).arg(score).arg(member);
            Expect::Count
        }
        CacheCommand::SortedSetRange { key, start, stop } => {
            pipe.cmd("ZRANGE").arg(key.as_str()).arg(start).arg(stop);
            Expect::Members
        }
        CacheCommand::SortedSetRangeWithScores { key, start, stop } => {
            pipe.cmd("ZRANGE")
                .arg(key.as_str())
                .arg(start)
                .arg(stop)
                .arg("WITHSCORES");
            Expect::ScoredMembers
        }
        CacheCommand::SortedSetRemoveByScore { key, max } => {
            pipe.cmd("ZREMRANGEBYSCORE")
                .arg(key.as_str())
                .arg("-inf")
                .arg(max);
            Expect::Count
        }
        CacheCommand::SortedSetRemove { key, member } => {
            pipe.cmd("ZREM").arg(key.as_str()).arg(member);
            Expect::Count
        }
        CacheCommand::SortedSetCount { key } => {
            pipe.cmd("ZCARD").arg(key.as_str());
            Expect::Count
        }
        CacheCommand::HashSet { key, fields } => {
            // HSET without fields is a syntax error in Redis.
            if fields.is_empty() {
                return Planned::Local(CacheReply::Count(0));
            }
            let cmd = pipe.cmd("HSET").arg(key.as_str());
            for (field, value) in fields {
                cmd.arg(field).arg(value);
            }
            Expect::Count
        }
        CacheCommand::HashGetAll { key } => {
            pipe.cmd("HGETALL").arg(key.as_str());
            Expect::Fields
        }
        CacheCommand::Expire { key, ttl } => {
            pipe.cmd("PEXPIRE").arg(key.as_str()).arg(millis(ttl));
            Expect::IntFlag
        }
    };
    Planned::Remote(expect)
}

fn unexpected(expect: Expect, value: &Value) -> SharedCacheError {
    SharedCacheError::decode(format!("unexpected reply {value:?} for {expect:?}"))
}

fn text(value: Value) -> Result<String, SharedCacheError> {
    match value {
        Value::BulkString(bytes) => {
            String::from_utf8(bytes).map_err(|err| SharedCacheError::decode(err.to_string()))
        }
        Value::SimpleString(text) => Ok(text),
        other => Err(SharedCacheError::decode(format!(
            "expected string, got {other:?}"
        ))),
    }
}

// Scores are written as integers; Redis echoes them back as integral
// doubles, which print without a fractional part.
fn score(value: Value) -> Result<i64, SharedCacheError> {
    let raw = match value {
        Value::Int(score) => return Ok(score),
        Value::Double(score) => score.to_string(),
        other => text(other)?,
    };
    raw.parse::<i64>()
        .map_err(|err| SharedCacheError::decode(format!("non-integral score {raw}: {err}")))
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

// RESP2 replies pairs as a flat array; RESP3 nests them.
fn pairs(items: Vec<Value>) -> Result<Vec<(Value, Value)>, SharedCacheError> {
    let nested = items.iter().all(|item| matches!(item, Value::Array(_)));
    if nested && !items.is_empty() {
        return items
            .into_iter()
            .map(|item| match item {
                Value::Array(pair) => {
                    let mut pair = pair.into_iter();
                    match (pair.next(), pair.next()) {
                        (Some(first), Some(second)) => Ok((first, second)),
                        _ => Err(SharedCacheError::decode("short pair")),
                    }
                }
                other => Err(SharedCacheError::decode(format!(
                    "expected pair, got {other:?}"
                ))),
            })
            .collect();
    }
    if items.len() % 2 != 0 {
        return Err(SharedCacheError::decode("odd number of pair elements"));
    }
    let mut flat = items.into_iter();
    let mut out = Vec::new();
    while let (Some(first), Some(second)) = (flat.next(), flat.next()) {
        out.push((first, second));
    }
    Ok(out)
}

fn decode(expect: Expect, value: Value) -> Result<CacheReply, SharedCacheError> {
    let reply = match (expect, value) {
        (Expect::Value, Value::Nil) => CacheReply::Value(None),
        (Expect::Value, value) => CacheReply::Value(Some(text(value)?)),
        (Expect::Done, Value::Okay | Value::SimpleString(_)) => CacheReply::Done,
        (Expect::SetFlag, Value::Okay | Value::SimpleString(_)) => CacheReply::Flag(true),
        (Expect::SetFlag, Value::Nil) => CacheReply::Flag(false),
        (Expect::IntFlag, Value::Int(n)) => CacheReply::Flag(n > 0),
        (Expect::IntFlag, Value::Boolean(flag)) => CacheReply::Flag(flag),
        (Expect::Count, Value::Int(n)) => CacheReply::Count(count(n)),
        (Expect::Members, Value::Array(items) | Value::Set(items)) => CacheReply::Members(
            items
                .into_iter()
                .map(text)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        (Expect::Members, Value::Nil) => CacheReply::Members(Vec::new()),
        (Expect::ScoredMembers, Value::Array(items)) => CacheReply::ScoredMembers(
            pairs(items)?
                .into_iter()
                .map(|(member, value)| Ok((text(member)?, score(value)?)))
                .collect::<Result<Vec<_>, SharedCacheError>>()?,
        ),
        (Expect::ScoredMembers, Value::Nil) => CacheReply::ScoredMembers(Vec::new()),
        (Expect::Fields, Value::Map(entries)) => CacheReply::Fields(
            entries
                .into_iter()
                .map(|(field, value)| Ok((text(field)?, text(value)?)))
                .collect::<Result<BTreeMap<_, _>, SharedCacheError>>()?,
        ),
        (Expect::Fields, Value::Array(items)) => CacheReply::Fields(
            pairs(items)?
                .into_iter()
                .map(|(field, value)| Ok((text(field)?, text(value)?)))
                .collect::<Result<BTreeMap<_, _>, SharedCacheError>>()?,
        ),
        (Expect::Fields, Value::Nil) => CacheReply::Fields(BTreeMap::new()),
        (expect, other) => return Err(unexpected(expect, &other)),
    };
    Ok(reply)
}

fn map_redis_error(error: &RedisError) -> SharedCacheError {
    debug!(%error, "redis command failed");
    if error.is_io_error() || error.is_connection_dropped() || error.is_timeout() {
        SharedCacheError::connection(error.to_string())
    } else {
        SharedCacheError::command(error.to_string())
    }
}

fn map_pool_error(error: RunError<RedisError>) -> SharedCacheError {
    match error {
        RunError::User(err) => map_redis_error(&err),
        RunError::TimedOut => SharedCacheError::connection("timed out waiting for a connection"),
    }
}

#[async_trait]
impl SharedCache for RedisSharedCache {
    async fn execute(&self, batch: CacheBatch) -> Result<CacheReplies, SharedCacheError> {
        let mut pipe = redis::pipe();
        if batch.is_atomic() {
            pipe.atomic();
        }
        let planned: Vec<Planned> = batch
            .into_commands()
            .into_iter()
            .map(|command| plan(command, &mut pipe))
            .collect();
        let remote = planned
            .iter()
            .filter(|step| matches!(step, Planned::Remote(_)))
            .count();

        let values: Vec<Value> = if remote == 0 {
            Vec::new()
        } else {
            let mut conn = self.pool.get().await.map_err(map_pool_error)?;
            pipe.query_async(&mut *conn)
                .await
                .map_err(|err| map_redis_error(&err))?
        };
        if values.len() != remote {
            return Err(SharedCacheError::decode(format!(
                "expected {remote} replies, got {}",
                values.len()
            )));
        }

        let mut values = values.into_iter();
        let mut replies = Vec::with_capacity(planned.len());
        for step in planned {
            let reply = match step {
                Planned::Local(reply) => reply,
                Planned::Remote(expect) => {
                    let value = values
                        .next()
                        .ok_or_else(|| SharedCacheError::decode("missing reply"))?;
                    decode(expect, value)?
                }
            };
            replies.push(reply);
        }
        Ok(CacheReplies::new(replies))
    }
}
