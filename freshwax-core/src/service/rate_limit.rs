//! Sliding-window rate limiter keyed by `(route, client)`.
//!
//! In-memory windows by default; with Redis configured, a sorted-set
//! window shared across replicas. Expired entries are pruned on access.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crate::{Error, Result};

/// Limits carried by the reaction surface.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Emoji/star bursts: 30 per minute.
pub const REACTION_RULE: RateLimitRule = RateLimitRule {
    max_requests: 30,
    window_secs: 60,
};

/// Join/heartbeat: 10 per minute, against reconnect storms.
pub const PRESENCE_RULE: RateLimitRule = RateLimitRule {
    max_requests: 10,
    window_secs: 60,
};

#[derive(Clone)]
pub struct RateLimiter {
    redis_conn: Option<redis::aio::ConnectionManager>,
    /// `(route, client)` -> request timestamps (ms, oldest first).
    windows: Arc<DashMap<String, VecDeque<u64>>>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("distributed", &self.redis_conn.is_some())
            .finish()
    }
}

impl RateLimiter {
    #[must_use]
    pub fn new(redis_conn: Option<redis::aio::ConnectionManager>) -> Self {
        if redis_conn.is_none() {
            tracing::debug!("rate limiting is per-instance: Redis not configured");
        }
        Self {
            redis_conn,
            windows: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Record a hit for `client` on `route`; `RateLimited` when over.
    pub async fn check(&self, route: &str, client: &str, rule: RateLimitRule) -> Result<()> {
        let key = format!("ratelimit:{route}:{client}");
        match self.redis_conn {
            Some(ref conn) => self.check_redis(conn.clone(), &key, rule).await,
            None => self.check_memory(&key, rule),
        }
    }

    fn check_memory(&self, key: &str, rule: RateLimitRule) -> Result<()> {
        let now_ms = now_millis();
        let window_start = now_ms.saturating_sub(rule.window_secs * 1000);

        let mut entry = self.windows.entry(key.to_string()).or_default();
        let timestamps = entry.value_mut();

        while timestamps.front().is_some_and(|&ts| ts < window_start) {
            timestamps.pop_front();
        }

        if timestamps.len() >= rule.max_requests as usize {
            let oldest = timestamps.front().copied().unwrap_or(now_ms);
            let elapsed = now_ms.saturating_sub(oldest);
            let remaining_ms = (rule.window_secs * 1000).saturating_sub(elapsed);
            return Err(Error::RateLimited {
                retry_after_secs: (remaining_ms / 1000).max(1),
            });
        }

        timestamps.push_back(now_ms);
        Ok(())
    }

    async fn check_redis(
        &self,
        mut conn: redis::aio::ConnectionManager,
        key: &str,
        rule: RateLimitRule,
    ) -> Result<()> {
        let now_ms = now_millis();
        let window_start = now_ms.saturating_sub(rule.window_secs * 1000);

        // Atomic: prune, record, count, refresh expiry.
        let script = redis::Script::new(
            r"
            redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, ARGV[1])
            redis.call('ZADD', KEYS[1], ARGV[2], ARGV[2])
            local count = redis.call('ZCARD', KEYS[1])
            redis.call('EXPIRE', KEYS[1], ARGV[3])
            return count
            ",
        );

        let count: u32 = script
            .key(key)
            .arg(window_start)
            .arg(now_ms)
            .arg(rule.window_secs + 1)
            .invoke_async(&mut conn)
            .await?;

        if count > rule.max_requests {
            return Err(Error::RateLimited {
                retry_after_secs: rule.window_secs.max(1),
            });
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn enforces_the_window() {
        let limiter = RateLimiter::in_memory();
        let rule = RateLimitRule {
            max_requests: 3,
            window_secs: 60,
        };

        for _ in 0..3 {
            limiter.check("react", "client-1", rule).await.unwrap();
        }
        let err = limiter.check("react", "client-1", rule).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { retry_after_secs } if retry_after_secs >= 1));
    }

    #[tokio::test]
    async fn routes_and_clients_are_independent() {
        let limiter = RateLimiter::in_memory();
        let rule = RateLimitRule {
            max_requests: 1,
            window_secs: 60,
        };

        limiter.check("react", "client-1", rule).await.unwrap();
        // Different client, same route.
        limiter.check("react", "client-2", rule).await.unwrap();
        // Same client, different route.
        limiter.check("presence", "client-1", rule).await.unwrap();
        // Same pair again is over.
        assert!(limiter.check("react", "client-1", rule).await.is_err());
    }
}
