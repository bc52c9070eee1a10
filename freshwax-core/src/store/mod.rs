//! Document store adapter
//!
//! A uniform key/value and query interface over a document database. The
//! engine assumes last-writer-wins; the scheduler's conflict-sensitive
//! paths layer read-verify-compensate on top rather than relying on store
//! transactions.
//!
//! Documents are JSON objects. Filters address top-level fields only, and
//! field names are code-controlled (`&'static str`), which also keeps the
//! Postgres adapter free of identifier interpolation concerns.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::Result;

/// Collection names, fixed by the persisted-state layout.
pub mod collections {
    pub const SLOTS: &str = "livestreamSlots";
    pub const LIVESTREAMS: &str = "livestreams";
    pub const ALLOWANCES: &str = "djAllowances";
    pub const USER_USAGE: &str = "userUsage";
    pub const ARTISTS: &str = "artists";
    pub const USERS: &str = "users";
    pub const GLOBAL_PLAYLIST: &str = "globalPlaylist";
    pub const REACTIONS: &str = "livestream-reactions";
    pub const VIEWERS: &str = "livestream-viewers";
    pub const CHAT_CLEANUP: &str = "chatCleanupSchedule";
    pub const EVENT_REQUESTS: &str = "event-requests";
    pub const PLAY_HISTORY: &str = "playHistory";
    pub const CHAT_MESSAGES: &str = "chatMessages";
}

/// One stored document with its key.
#[derive(Debug, Clone)]
pub struct Document {
    pub key: String,
    pub data: Value,
}

impl Document {
    /// Deserialize the document body.
    pub fn parse<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Top-level field predicate.
#[derive(Debug, Clone)]
pub enum Filter {
    Eq(&'static str, Value),
    Ne(&'static str, Value),
    Lt(&'static str, Value),
    Le(&'static str, Value),
    Gt(&'static str, Value),
    Ge(&'static str, Value),
    In(&'static str, Vec<Value>),
}

impl Filter {
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::Eq(f, _)
            | Self::Ne(f, _)
            | Self::Lt(f, _)
            | Self::Le(f, _)
            | Self::Gt(f, _)
            | Self::Ge(f, _)
            | Self::In(f, _) => f,
        }
    }

    /// Evaluate against a document. Missing fields read as null; ordered
    /// comparisons against incomparable values are false.
    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        let actual = doc.get(self.field()).unwrap_or(&Value::Null);
        match self {
            Self::Eq(_, expected) => actual == expected,
            Self::Ne(_, expected) => actual != expected,
            Self::Lt(_, expected) => {
                compare_values(actual, expected) == Some(Ordering::Less)
            }
            Self::Le(_, expected) => matches!(
                compare_values(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
            Self::Gt(_, expected) => {
                compare_values(actual, expected) == Some(Ordering::Greater)
            }
            Self::Ge(_, expected) => matches!(
                compare_values(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Self::In(_, options) => options.iter().any(|v| v == actual),
        }
    }
}

/// Compare two JSON values: numbers numerically, RFC 3339 strings as
/// instants, other strings lexicographically.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => {
            let ts_a: Option<DateTime<Utc>> = x.parse().ok();
            let ts_b: Option<DateTime<Utc>> = y.parse().ok();
            match (ts_a, ts_b) {
                (Some(ta), Some(tb)) => Some(ta.cmp(&tb)),
                _ => Some(x.cmp(y)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Query description: conjunctive filters, optional ordering and limit.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<(&'static str, Order)>,
    pub limit: Option<usize>,
}

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: &'static str, order: Order) -> Self {
        self.order_by = Some((field, order));
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }
}

/// Uniform persistence interface. Implementations must be thread-safe.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// Create or fully replace a document.
    async fn set(&self, collection: &str, key: &str, doc: &Value) -> Result<()>;

    /// Shallow-merge `fields` into an existing document; `NotFound` when
    /// the document does not exist.
    async fn update(&self, collection: &str, key: &str, fields: &Value) -> Result<()>;

    /// Deleting a missing document is a no-op.
    async fn delete(&self, collection: &str, key: &str) -> Result<()>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// Atomically add `delta` to a numeric top-level field, returning the
    /// new value. Atomicity is per the backend's primitive; callers treat
    /// incremented counters as projections, not authoritative state.
    async fn increment(&self, collection: &str, key: &str, field: &str, delta: f64)
        -> Result<f64>;

    async fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        let mut limited = query.clone();
        limited.limit = Some(1);
        Ok(self.query(collection, &limited).await?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn filters_evaluate_against_top_level_fields() {
        let doc = json!({"status": "live", "viewers": 12, "startTime": "2025-01-10T10:00:00Z"});

        assert!(Filter::Eq("status", json!("live")).matches(&doc));
        assert!(Filter::Ne("status", json!("queued")).matches(&doc));
        assert!(Filter::Gt("viewers", json!(10)).matches(&doc));
        assert!(!Filter::Gt("viewers", json!(12)).matches(&doc));
        assert!(Filter::Ge("viewers", json!(12)).matches(&doc));
        assert!(Filter::In("status", vec![json!("live"), json!("queued")]).matches(&doc));
        // Missing field reads as null: equality with null holds, ordering fails.
        assert!(Filter::Eq("missing", Value::Null).matches(&doc));
        assert!(!Filter::Lt("missing", json!(5)).matches(&doc));
    }

    #[test]
    fn timestamps_compare_as_instants() {
        // Lexicographic comparison would order these wrongly.
        let sub_second = json!("2025-01-10T10:00:00.500Z");
        let whole = json!("2025-01-10T10:00:00Z");
        assert_eq!(
            compare_values(&whole, &sub_second),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare_values(&sub_second, &whole),
            Some(Ordering::Greater)
        );
    }

    #[test]
    fn query_is_conjunctive() {
        let doc = json!({"status": "live", "djId": "d1"});
        let q = Query::new()
            .filter(Filter::Eq("status", json!("live")))
            .filter(Filter::Eq("djId", json!("d1")));
        assert!(q.matches(&doc));

        let q = q.filter(Filter::Eq("djId", json!("d2")));
        assert!(!q.matches(&doc));
    }
}
