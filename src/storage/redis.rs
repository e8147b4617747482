// src/storage/redis.rs

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};
use std::fmt;

use crate::config::RedisConfig;
use crate::error::{RateLimiterError, Result, StorageError};
use crate::storage::{CounterSnapshot, CounterStore};

// Same transition as CounterRecord::apply_increment, run atomically on the
// server with the server's clock. replicate_commands lets a script write after
// reading TIME on Redis < 5 and is a no-op from 5 on.
pub(crate) const INCREMENT_SCRIPT: &str = r#"
redis.replicate_commands()
local window = tonumber(ARGV[1])
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
local state = redis.call('HMGET', KEYS[1], 'count', 'window_start', 'previous_count')
local count = tonumber(state[1])
local start = tonumber(state[2])
local previous = tonumber(state[3]) or 0
if start ~= nil and now < start then
  now = start
end
if count == nil or start == nil or now - start >= 2 * window then
  count = 1
  start = now
  previous = 0
elseif now - start >= window then
  previous = count
  count = 1
  start = now
else
  count = count + 1
end
redis.call('HSET', KEYS[1], 'count', count, 'window_start', start, 'previous_count', previous, 'window_ms', window)
redis.call('PEXPIREAT', KEYS[1], start + 2 * window)
return {count, start, previous, now}
"#;

pub(crate) const GET_SCRIPT: &str = r#"
local state = redis.call('HMGET', KEYS[1], 'count', 'window_start', 'previous_count')
if state[1] == false or state[2] == false then
  return {}
end
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
local start = tonumber(state[2])
if now < start then
  now = start
end
return {tonumber(state[1]), start, tonumber(state[3]) or 0, now}
"#;

// Leaves the count alone once the window has elapsed, like the memory store
pub(crate) const DECREMENT_SCRIPT: &str = r#"
redis.replicate_commands()
local state = redis.call('HMGET', KEYS[1], 'count', 'window_start', 'window_ms')
local count = tonumber(state[1])
local start = tonumber(state[2])
local window = tonumber(state[3])
if count == nil or start == nil or window == nil or count <= 0 then
  return 0
end
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
if now - start >= window then
  return 0
end
redis.call('HINCRBY', KEYS[1], 'count', -1)
return 1
"#;

/// Redis counter store.
///
/// Increment-and-roll runs as one server-side script, so it is atomic for all
/// clients of the same Redis primary. With asynchronous replication a
/// failover can lose increments the old primary had acknowledged; counts may
/// then read low until the window rolls. This is accepted, not hidden.
#[derive(Clone)]
pub struct RedisStorage {
    connection: ConnectionManager,
    config: RedisConfig,
    increment_script: Script,
    get_script: Script,
    decrement_script: Script,
}

// Manually implement Debug
impl fmt::Debug for RedisStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStorage")
            .field("url", &self.config.url)
            .field("connection_timeout", &self.config.connection_timeout)
            .finish()
    }
}

impl RedisStorage {
    /// Connects to Redis with the given configuration
    pub async fn new(config: RedisConfig) -> Result<Self> {
        // Open the client - this doesn't actually connect to Redis yet
        let client = Client::open(config.url.as_str()).map_err(|e| {
            RateLimiterError::StoreUnavailable(StorageError::RedisConnection(e.to_string()))
        })?;

        let connection =
            match tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
                .await
            {
                Ok(result) => result?,
                Err(_) => {
                    return Err(RateLimiterError::StoreUnavailable(
                        StorageError::RedisConnection(format!(
                            "Connection to Redis at {} timed out after {:?}",
                            config.url, config.connection_timeout
                        )),
                    ));
                }
            };

        Ok(Self {
            connection,
            config,
            increment_script: Script::new(INCREMENT_SCRIPT),
            get_script: Script::new(GET_SCRIPT),
            decrement_script: Script::new(DECREMENT_SCRIPT),
        })
    }

    /// Ping Redis to check health with timeout
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.clone();
        let command = redis::cmd("PING");
        let ping = command.query_async::<String>(&mut conn);

        let result = match tokio::time::timeout(self.config.connection_timeout, ping).await {
            Ok(inner) => inner?,
            Err(_) => {
                return Err(RateLimiterError::StoreUnavailable(StorageError::Timeout(
                    format!(
                        "Redis PING operation timed out after {:?}",
                        self.config.connection_timeout
                    ),
                )));
            }
        };

        if result == "PONG" {
            Ok(())
        } else {
            Err(RateLimiterError::StoreUnavailable(
                StorageError::RedisCommand(format!(
                    "Unexpected response from Redis PING: {}",
                    result
                )),
            ))
        }
    }
}

/// Decode the `{count, window_start, previous_count, now}` reply shared by
/// the increment and get scripts
pub(crate) fn snapshot_from_reply(reply: &[i64]) -> Result<CounterSnapshot> {
    let fields: Vec<u64> = reply
        .iter()
        .map(|value| u64::try_from(*value))
        .collect::<std::result::Result<_, _>>()
        .map_err(|_| {
            RateLimiterError::StoreUnavailable(StorageError::Serialization(format!(
                "negative counter field in reply {:?}",
                reply
            )))
        })?;

    match fields.as_slice() {
        [count, window_start, previous_count, observed_at] => Ok(CounterSnapshot {
            count: *count,
            window_start: *window_start,
            previous_count: *previous_count,
            observed_at: *observed_at,
        }),
        _ => Err(RateLimiterError::StoreUnavailable(
            StorageError::Serialization(format!(
                "expected 4 counter fields, got {}",
                reply.len()
            )),
        )),
    }
}

#[async_trait]
impl CounterStore for RedisStorage {
    async fn increment(&self, key: &str, window_ms: u64) -> Result<CounterSnapshot> {
        if window_ms == 0 {
            return Err(RateLimiterError::InvalidSpec(
                "window_ms must be at least 1".to_string(),
            ));
        }

        let mut conn = self.connection.clone();
        let reply: Vec<i64> = self
            .increment_script
            .key(key)
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await?;

        snapshot_from_reply(&reply)
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>> {
        let mut conn = self.connection.clone();
        let reply: Vec<i64> = self.get_script.key(key).invoke_async(&mut conn).await?;

        if reply.is_empty() {
            return Ok(None);
        }
        snapshot_from_reply(&reply).map(Some)
    }

    async fn reset(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    async fn decrement(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        let _: i64 = self
            .decrement_script
            .key(key)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    fn supports_decrement(&self) -> bool {
        true
    }
}
