//! In-memory document store: the test backend and the single-node default.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};

use super::{compare_values, Document, DocumentStore, Order, Query};
use crate::{Error, Result};

#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Value>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> dashmap::mapref::one::RefMut<'_, String, DashMap<String, Value>> {
        self.collections.entry(name.to_string()).or_default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(key).map(|doc| doc.clone())))
    }

    async fn set(&self, collection: &str, key: &str, doc: &Value) -> Result<()> {
        self.collection(collection)
            .insert(key.to_string(), doc.clone());
        Ok(())
    }

    async fn update(&self, collection: &str, key: &str, fields: &Value) -> Result<()> {
        let coll = self.collection(collection);
        let mut entry = coll
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("{collection}/{key}")))?;

        if let (Value::Object(target), Value::Object(patch)) = (entry.value_mut(), fields) {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
            Ok(())
        } else {
            Err(Error::Internal(format!(
                "update on non-object document {collection}/{key}"
            )))
        }
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        if let Some(coll) = self.collections.get(collection) {
            coll.remove(key);
        }
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let Some(coll) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<Document> = coll
            .iter()
            .filter(|entry| query.matches(entry.value()))
            .map(|entry| Document {
                key: entry.key().clone(),
                data: entry.value().clone(),
            })
            .collect();

        if let Some((field, order)) = query.order_by {
            matched.sort_by(|a, b| {
                let left = a.data.get(field).unwrap_or(&Value::Null);
                let right = b.data.get(field).unwrap_or(&Value::Null);
                let ordering = compare_values(left, right).unwrap_or(std::cmp::Ordering::Equal);
                match order {
                    Order::Asc => ordering,
                    Order::Desc => ordering.reverse(),
                }
            });
        } else {
            // Deterministic results regardless of map iteration order.
            matched.sort_by(|a, b| a.key.cmp(&b.key));
        }

        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn increment(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64> {
        let coll = self.collection(collection);
        let mut entry = coll
            .get_mut(key)
            .ok_or_else(|| Error::NotFound(format!("{collection}/{key}")))?;

        let Value::Object(map) = entry.value_mut() else {
            return Err(Error::Internal(format!(
                "increment on non-object document {collection}/{key}"
            )));
        };

        let current = map.get(field).and_then(Value::as_f64).unwrap_or(0.0);
        let next = current + delta;
        map.insert(field.to_string(), json!(next));
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Filter;

    #[tokio::test]
    async fn set_get_update_delete() {
        let store = MemoryStore::new();
        store
            .set("slots", "s1", &json!({"status": "scheduled", "viewers": 0}))
            .await
            .unwrap();

        let doc = store.get("slots", "s1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "scheduled");

        store
            .update("slots", "s1", &json!({"status": "live"}))
            .await
            .unwrap();
        let doc = store.get("slots", "s1").await.unwrap().unwrap();
        assert_eq!(doc["status"], "live");
        assert_eq!(doc["viewers"], 0);

        store.delete("slots", "s1").await.unwrap();
        assert!(store.get("slots", "s1").await.unwrap().is_none());
        // Deleting again is a no-op.
        store.delete("slots", "s1").await.unwrap();
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update("slots", "nope", &json!({"a": 1}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn query_orders_and_limits() {
        let store = MemoryStore::new();
        for (key, start) in [
            ("b", "2025-01-10T12:00:00Z"),
            ("a", "2025-01-10T10:00:00Z"),
            ("c", "2025-01-10T11:00:00Z"),
        ] {
            store
                .set(
                    "slots",
                    key,
                    &json!({"startTime": start, "status": "scheduled"}),
                )
                .await
                .unwrap();
        }

        let results = store
            .query(
                "slots",
                &Query::new()
                    .filter(Filter::Eq("status", json!("scheduled")))
                    .order_by("startTime", Order::Asc),
            )
            .await
            .unwrap();
        let keys: Vec<_> = results.iter().map(|d| d.key.as_str()).collect();
        assert_eq!(keys, ["a", "c", "b"]);

        let first = store
            .find_one(
                "slots",
                &Query::new().order_by("startTime", Order::Desc),
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.key, "b");
    }

    #[tokio::test]
    async fn increment_creates_field_and_returns_new_value() {
        let store = MemoryStore::new();
        store.set("slots", "s1", &json!({})).await.unwrap();

        assert_eq!(
            store.increment("slots", "s1", "viewers", 1.0).await.unwrap(),
            1.0
        );
        assert_eq!(
            store.increment("slots", "s1", "viewers", 2.0).await.unwrap(),
            3.0
        );
        assert_eq!(
            store.increment("slots", "s1", "viewers", -5.0).await.unwrap(),
            -2.0
        );
    }
}
