//! Redis-backed [`SharedStore`].
//!
//! Cache entries are plain `SETEX` strings. Sliding windows are sorted
//! sets scored by UNIX timestamp: record-always checks run as a `MULTI`
//! pipeline (`ZREMRANGEBYSCORE`, `ZCARD`, `ZADD`, `EXPIRE`), record-if-
//! admitted checks run as a Lua script so the conditional insert stays
//! atomic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;
use tracing::info;

use super::{SharedStore, StoreStats, WindowRecord};
use crate::Result;

const SLIDE_IF_ADMITTED: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], '-inf', ARGV[1])
local count = redis.call('ZCARD', KEYS[1])
if count < tonumber(ARGV[3]) then
  redis.call('ZADD', KEYS[1], ARGV[2], ARGV[4])
end
redis.call('EXPIRE', KEYS[1], ARGV[5])
return count
"#;

/// Store backed by a redis server.
///
/// The connection is established lazily on first use (normally the
/// `connect()` ping) and re-established by the connection manager after
/// transient failures.
pub struct RedisStore {
    client: redis::Client,
    conn: OnceCell<ConnectionManager>,
    seq: AtomicU64,
}

impl RedisStore {
    /// Parse the URL; no connection is made yet.
    pub fn open(url: &str) -> Result<Self> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            conn: OnceCell::new(),
            seq: AtomicU64::new(0),
        })
    }

    async fn conn(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!("connected to redis store");
                Ok::<_, redis::RedisError>(manager)
            })
            .await?;
        Ok(conn.clone())
    }

    /// Unique sorted-set member for a window entry.
    fn member(&self, now: f64) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        format!("{now:.6}-{}-{seq}", std::process::id())
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let value: Option<Vec<u8>> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set_ex(key, value, whole_seconds(ttl)).await?;
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let removed: u64 = conn.del(keys).await?;
        Ok(removed)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut conn = self.conn().await?;
        let pattern = format!("{}*", escape_glob(prefix));
        let mut keys = Vec::new();
        let mut iter: redis::AsyncIter<'_, String> = conn.scan_match(pattern).await?;
        while let Some(key) = iter.next_item().await {
            keys.push(key);
        }
        Ok(keys)
    }

    async fn flush(&self) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = redis::cmd("FLUSHDB").query_async(&mut conn).await?;
        Ok(())
    }

    async fn stats(&self) -> Result<Option<StoreStats>> {
        let mut conn = self.conn().await?;
        let info: String = redis::cmd("INFO").arg("stats").query_async(&mut conn).await?;
        Ok(Some(parse_keyspace_stats(&info)))
    }

    async fn slide_window(
        &self,
        key: &str,
        now: f64,
        window: Duration,
        limit: u32,
        record: WindowRecord,
    ) -> Result<u64> {
        let mut conn = self.conn().await?;
        let cutoff = now - window.as_secs_f64();
        let expire = whole_seconds(window);
        let member = self.member(now);

        match record {
            WindowRecord::Always => {
                let (count,): (u64,) = redis::pipe()
                    .atomic()
                    .zrembyscore(key, "-inf", cutoff)
                    .ignore()
                    .zcard(key)
                    .zadd(key, &member, now)
                    .ignore()
                    .expire(key, expire as i64)
                    .ignore()
                    .query_async(&mut conn)
                    .await?;
                Ok(count)
            }
            WindowRecord::IfAdmitted => {
                let count: u64 = redis::Script::new(SLIDE_IF_ADMITTED)
                    .key(key)
                    .arg(cutoff)
                    .arg(now)
                    .arg(limit)
                    .arg(&member)
                    .arg(expire)
                    .invoke_async(&mut conn)
                    .await?;
                Ok(count)
            }
        }
    }
}

/// Redis expiries are whole seconds; never round down to zero.
fn whole_seconds(d: Duration) -> u64 {
    d.as_secs_f64().ceil().max(1.0) as u64
}

/// Server-wide `keyspace_hits` / `keyspace_misses` from an `INFO stats` reply.
fn parse_keyspace_stats(info: &str) -> StoreStats {
    let mut stats = StoreStats::default();
    for line in info.lines() {
        let Some((name, value)) = line.trim().split_once(':') else {
            continue;
        };
        let value: u64 = value.parse().unwrap_or(0);
        match name {
            "keyspace_hits" => stats.hits = value,
            "keyspace_misses" => stats.misses = value,
            _ => {}
        }
    }
    stats
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
