//! Short-TTL read cache for the hot schedule-query path.
//!
//! Purely an optimization: any slot write invalidates the whole cache, and
//! reads that feed authorization decisions bypass it entirely.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

const CAPACITY: u64 = 100;
const TTL: Duration = Duration::from_secs(5);

/// Cache key: `(startDate, endDate, djId-or-all)`.
#[must_use]
pub fn schedule_key(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    dj_id: Option<&str>,
) -> String {
    format!(
        "{}|{}|{}",
        start.timestamp(),
        end.timestamp(),
        dj_id.unwrap_or("all")
    )
}

#[derive(Clone)]
pub struct ScheduleCache<T: Clone + Send + Sync + 'static> {
    inner: moka::sync::Cache<String, Arc<T>>,
}

impl<T: Clone + Send + Sync + 'static> ScheduleCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: moka::sync::Cache::builder()
                .max_capacity(CAPACITY)
                .time_to_live(TTL)
                .build(),
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<T>> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: String, value: T) {
        self.inner.insert(key, Arc::new(value));
    }

    /// Drop every entry. Called on any slot write.
    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
    }
}

impl<T: Clone + Send + Sync + 'static> Default for ScheduleCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caches_and_invalidates() {
        let cache: ScheduleCache<Vec<String>> = ScheduleCache::new();
        let key = schedule_key(
            "2025-01-10T00:00:00Z".parse().unwrap(),
            "2025-01-11T00:00:00Z".parse().unwrap(),
            None,
        );

        assert!(cache.get(&key).is_none());
        cache.insert(key.clone(), vec!["s1".to_string()]);
        assert_eq!(cache.get(&key).unwrap().as_slice(), ["s1".to_string()]);

        cache.invalidate_all();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn dj_filter_is_part_of_the_key() {
        let start = "2025-01-10T00:00:00Z".parse().unwrap();
        let end = "2025-01-11T00:00:00Z".parse().unwrap();
        assert_ne!(
            schedule_key(start, end, None),
            schedule_key(start, end, Some("d1"))
        );
    }
}
