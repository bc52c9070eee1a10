//! Postgres document store: one JSONB table, filters compiled to JSONB
//! expressions with bound parameters.
//!
//! Field names come from code (`&'static str` in [`Filter`]), never from
//! request input, so they may appear inside the generated SQL text; all
//! values are bound.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;

use super::{Document, DocumentStore, Filter, Order, Query};
use crate::{Error, Result};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS documents (
    collection TEXT NOT NULL,
    key        TEXT NOT NULL,
    data       JSONB NOT NULL,
    PRIMARY KEY (collection, key)
);
CREATE INDEX IF NOT EXISTS documents_data_idx ON documents USING gin (data);
";

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

/// A bindable comparison operand, discriminated from the JSON value so the
/// generated expression carries the right cast.
enum Operand {
    Number(f64),
    Timestamp(DateTime<Utc>),
    Text(String),
    Json(Value),
}

impl Operand {
    fn classify(value: &Value) -> Self {
        match value {
            Value::Number(n) => n
                .as_f64()
                .map_or_else(|| Self::Json(value.clone()), Self::Number),
            Value::String(s) => s
                .parse::<DateTime<Utc>>()
                .map_or_else(|_| Self::Text(s.clone()), Self::Timestamp),
            other => Self::Json(other.clone()),
        }
    }

    /// The left-hand expression for an ordered comparison on `field`.
    fn lhs(&self, field: &str) -> String {
        match self {
            Self::Number(_) => format!("(data->>'{field}')::float8"),
            Self::Timestamp(_) => format!("(data->>'{field}')::timestamptz"),
            Self::Text(_) => format!("data->>'{field}'"),
            Self::Json(_) => format!("data->'{field}'"),
        }
    }
}

impl PostgresStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    /// Create the documents table if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        for statement in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Build the WHERE tail and the operand list for a query. Parameters start
/// at `$3` ($1 = collection is bound first by every caller, $2 varies).
fn compile_filters(filters: &[Filter], first_param: usize) -> (String, Vec<Operand>) {
    let mut sql = String::new();
    let mut operands = Vec::new();
    let mut param = first_param;

    for filter in filters {
        let field = filter.field();
        match filter {
            Filter::Eq(_, v) => {
                sql.push_str(&format!(" AND data->'{field}' = ${param}"));
                operands.push(Operand::Json(v.clone()));
                param += 1;
            }
            Filter::Ne(_, v) => {
                sql.push_str(&format!(
                    " AND (data->'{field}' IS NULL OR data->'{field}' <> ${param})"
                ));
                operands.push(Operand::Json(v.clone()));
                param += 1;
            }
            Filter::Lt(_, v) | Filter::Le(_, v) | Filter::Gt(_, v) | Filter::Ge(_, v) => {
                let op = match filter {
                    Filter::Lt(..) => "<",
                    Filter::Le(..) => "<=",
                    Filter::Gt(..) => ">",
                    _ => ">=",
                };
                let operand = Operand::classify(v);
                sql.push_str(&format!(" AND {} {op} ${param}", operand.lhs(field)));
                operands.push(operand);
                param += 1;
            }
            Filter::In(_, options) => {
                if options.is_empty() {
                    sql.push_str(" AND FALSE");
                    continue;
                }
                let placeholders: Vec<String> = options
                    .iter()
                    .enumerate()
                    .map(|(i, _)| format!("${}", param + i))
                    .collect();
                sql.push_str(&format!(
                    " AND data->'{field}' IN ({})",
                    placeholders.join(", ")
                ));
                for v in options {
                    operands.push(Operand::Json(v.clone()));
                }
                param += options.len();
            }
        }
    }

    (sql, operands)
}

fn bind_operands<'q>(
    mut query: sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>,
    operands: &'q [Operand],
) -> sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments> {
    for operand in operands {
        query = match operand {
            Operand::Number(n) => query.bind(n),
            Operand::Timestamp(ts) => query.bind(ts),
            Operand::Text(s) => query.bind(s),
            Operand::Json(v) => query.bind(v),
        };
    }
    query
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let row = sqlx::query("SELECT data FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|r| r.try_get::<Value, _>("data").map_err(Error::from))
            .transpose()
    }

    async fn set(&self, collection: &str, key: &str, doc: &Value) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (collection, key, data) VALUES ($1, $2, $3)
             ON CONFLICT (collection, key) DO UPDATE SET data = EXCLUDED.data",
        )
        .bind(collection)
        .bind(key)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update(&self, collection: &str, key: &str, fields: &Value) -> Result<()> {
        let result = sqlx::query(
            "UPDATE documents SET data = data || $3 WHERE collection = $1 AND key = $2",
        )
        .bind(collection)
        .bind(key)
        .bind(fields)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("{collection}/{key}")));
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE collection = $1 AND key = $2")
            .bind(collection)
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        let (where_tail, operands) = compile_filters(&query.filters, 2);

        let mut sql =
            format!("SELECT key, data FROM documents WHERE collection = $1{where_tail}");
        if let Some((field, order)) = query.order_by {
            let direction = match order {
                Order::Asc => "ASC",
                Order::Desc => "DESC",
            };
            sql.push_str(&format!(" ORDER BY data->>'{field}' {direction}"));
        } else {
            sql.push_str(" ORDER BY key ASC");
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let rows = bind_operands(sqlx::query(&sql).bind(collection), &operands)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Document {
                    key: row.try_get("key")?,
                    data: row.try_get("data")?,
                })
            })
            .collect()
    }

    async fn increment(
        &self,
        collection: &str,
        key: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64> {
        let row = sqlx::query(
            "UPDATE documents
             SET data = jsonb_set(data, $3, to_jsonb(COALESCE((data->>$4)::float8, 0) + $5))
             WHERE collection = $1 AND key = $2
             RETURNING (data->>$4)::float8 AS value",
        )
        .bind(collection)
        .bind(key)
        .bind(vec![field.to_string()])
        .bind(field)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        let row = row.ok_or_else(|| Error::NotFound(format!("{collection}/{key}")))?;
        Ok(row.try_get("value")?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compiles_filters_with_sequential_params() {
        let filters = vec![
            Filter::Eq("status", json!("live")),
            Filter::Gt("startTime", json!("2025-01-10T10:00:00Z")),
            Filter::In("djId", vec![json!("a"), json!("b")]),
        ];
        let (sql, operands) = compile_filters(&filters, 2);
        assert_eq!(
            sql,
            " AND data->'status' = $2 \
             AND (data->>'startTime')::timestamptz > $3 \
             AND data->'djId' IN ($4, $5)"
                .replace("  ", " ")
        );
        assert_eq!(operands.len(), 4);
    }

    #[test]
    fn empty_in_matches_nothing() {
        let (sql, operands) = compile_filters(&[Filter::In("djId", vec![])], 2);
        assert_eq!(sql, " AND FALSE");
        assert!(operands.is_empty());
    }

    #[test]
    fn operand_classification_drives_casts() {
        assert_eq!(Operand::classify(&json!(5)).lhs("n"), "(data->>'n')::float8");
        assert_eq!(
            Operand::classify(&json!("2025-01-10T10:00:00Z")).lhs("t"),
            "(data->>'t')::timestamptz"
        );
        assert_eq!(Operand::classify(&json!("plain")).lhs("s"), "data->>'s'");
        assert_eq!(Operand::classify(&json!({"a": 1})).lhs("j"), "data->'j'");
    }
}
