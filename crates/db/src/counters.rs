//! Redis-backed sliding-window counters.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kbase_core::rate_limit::{CounterStore, WindowUsage};
use kbase_core::stores::StoreError;
use redis::aio::ConnectionManager;
use redis::Script;

const COUNTER_STORE: &str = "counter_store";

/// Sliding window over a sorted set scored by hit time.
///
/// KEYS[1]: sorted-set key
/// ARGV[1]: window length in milliseconds
/// ARGV[2]: current time in milliseconds since the epoch
/// ARGV[3]: unique member for this hit
///
/// Returns: {count, reset_at_ms}
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local window = tonumber(ARGV[1])
local now = tonumber(ARGV[2])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
redis.call('ZADD', key, now, ARGV[3])
local count = redis.call('ZCARD', key)
redis.call('PEXPIRE', key, window)

local reset_at = now + window
local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
if oldest[2] then
    reset_at = tonumber(oldest[2]) + window
end

return {count, reset_at}
"#;

/// [`CounterStore`] shared by every process pointed at the same Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    script: Script,
}

impl RedisCounterStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
        }
    }

    /// Open a managed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::unavailable(COUNTER_STORE, e))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::unavailable(COUNTER_STORE, e))?;
        tracing::info!("Connected to Redis counter store");
        Ok(Self::new(conn))
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn record_hit(&self, key: &str, window: Duration) -> Result<WindowUsage, StoreError> {
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX).max(1);
        let member = format!("{now_ms}:{}", uuid::Uuid::new_v4());

        let result: Vec<i64> = self
            .script
            .key(key)
            .arg(window_ms)
            .arg(now_ms)
            .arg(member)
            .invoke_async(&mut self.conn.clone())
            .await
            .map_err(|e| StoreError::unavailable(COUNTER_STORE, e))?;

        let [count, reset_ms] = result[..] else {
            return Err(StoreError::InvalidResponse {
                store: COUNTER_STORE,
                message: format!("expected 2 values from script, got {}", result.len()),
            });
        };

        let reset_at = DateTime::<Utc>::from_timestamp_millis(reset_ms).ok_or_else(|| {
            StoreError::InvalidResponse {
                store: COUNTER_STORE,
                message: format!("reset time {reset_ms} out of range"),
            }
        })?;

        Ok(WindowUsage {
            count: u64::try_from(count).unwrap_or(0),
            reset_at,
        })
    }
}
