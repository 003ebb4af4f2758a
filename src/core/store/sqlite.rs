/// SQLite document store
///
/// Each table is `(id TEXT PRIMARY KEY, doc TEXT)` with `doc` holding the JSON
/// document. Indexes and filters go through `json_extract`, so nested fields
/// such as `status.code` need no schema of their own.

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{merge_top_level, value_key, Document, DocumentStore, TableSpec};
use crate::core::error::StoreError;
use crate::core::query::{FieldPath, Filter, FilterOp, QueryPlan};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Task("sqlite connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `json_extract(doc, '$."a"."b"')`, or `None` when a key cannot be written as a JSON path label
fn json_expr(path: &FieldPath) -> Option<String> {
    let mut labels = vec![path.field.as_str()];
    if let Some(sub) = &path.sub_field {
        labels.push(sub.as_str());
    }
    if labels.iter().any(|l| l.contains('"')) {
        return None;
    }

    let json_path: String = std::iter::once("$".to_string())
        .chain(labels.iter().map(|l| format!(".\"{}\"", l)))
        .collect();
    Some(format!("json_extract(doc, '{}')", json_path.replace('\'', "''")))
}

fn json_type_expr(extract: &str) -> String {
    extract.replacen("json_extract", "json_type", 1)
}

/// SQL `WHERE` body plus its bound parameters
fn where_clause(filters: &[Filter]) -> (String, Vec<SqlValue>) {
    if filters.is_empty() {
        return ("1".to_string(), Vec::new());
    }

    let mut clauses = Vec::with_capacity(filters.len());
    let mut binds = Vec::new();

    for filter in filters {
        let Some(x) = json_expr(&filter.path) else {
            clauses.push("0".to_string());
            continue;
        };
        let guard = format!("{} = 'text'", json_type_expr(&x));
        let value = SqlValue::Text(filter.value.clone());

        let test = match filter.op {
            FilterOp::Eq => {
                binds.push(value);
                format!("{} = ?", x)
            }
            FilterOp::Lte => {
                binds.push(value);
                format!("{} <= ?", x)
            }
            FilterOp::Gte => {
                binds.push(value);
                format!("{} >= ?", x)
            }
            FilterOp::Contains => {
                binds.push(value);
                format!("instr({}, ?) > 0", x)
            }
            FilterOp::StartsWith => {
                binds.push(value.clone());
                binds.push(value);
                format!("substr({}, 1, length(?)) = ?", x)
            }
            FilterOp::EndsWith => {
                binds.push(value.clone());
                binds.push(value);
                format!("substr({x}, length({x}) - length(?) + 1) = ?", x = x)
            }
        };
        clauses.push(format!("({} AND {})", guard, test));
    }

    (clauses.join(" AND "), binds)
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

fn decode(text: &str) -> Result<Document, StoreError> {
    Ok(serde_json::from_str(text)?)
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        let spec = spec.clone();
        self.with_conn(move |conn| {
            let table = quote_ident(&spec.name);
            let mut sql = format!(
                "CREATE TABLE IF NOT EXISTS {} (id TEXT PRIMARY KEY NOT NULL, doc TEXT NOT NULL);\n",
                table
            );
            for field in &spec.indexes {
                let Some(expr) = json_expr(&FieldPath::top(field.as_str())) else {
                    tracing::warn!("Skipping index on {}.{}: unsupported field name", spec.name, field);
                    continue;
                };
                sql.push_str(&format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({});\n",
                    quote_ident(&format!("idx_{}_{}", spec.name, field)),
                    table,
                    expr
                ));
            }
            conn.execute_batch(&sql)?;
            Ok(())
        })
        .await
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let sql = format!("SELECT doc FROM {} WHERE id = ?1", quote_ident(table));
        let id = id.to_string();
        self.with_conn(move |conn| {
            let text: Option<String> = conn
                .query_row(&sql, params![id], |row| row.get(0))
                .optional()?;
            text.as_deref().map(decode).transpose()
        })
        .await
    }

    async fn insert(&self, table: &str, doc: Document) -> Result<(), StoreError> {
        let id = doc
            .get("id")
            .and_then(value_key)
            .ok_or_else(|| StoreError::MissingKey("id".to_string()))?;
        let text = serde_json::to_string(&doc)?;
        let sql = format!("INSERT INTO {} (id, doc) VALUES (?1, ?2)", quote_ident(table));
        let table = table.to_string();

        self.with_conn(move |conn| {
            let result = conn.execute(&sql, params![id, text]);
            match result {
                Ok(_) => Ok(()),
                Err(e) if is_constraint_violation(&e) => Err(StoreError::AlreadyExists {
                    table,
                    field: "id".to_string(),
                    value: id,
                }),
                Err(e) => Err(e.into()),
            }
        })
        .await
    }

    async fn update(&self, table: &str, id: &str, doc: Document) -> Result<bool, StoreError> {
        let select = format!("SELECT doc FROM {} WHERE id = ?1", quote_ident(table));
        let write = format!("UPDATE {} SET doc = ?2 WHERE id = ?1", quote_ident(table));
        let id = id.to_string();

        self.with_conn(move |conn| {
            let existing: Option<String> = conn
                .query_row(&select, params![id], |row| row.get(0))
                .optional()?;
            let Some(existing) = existing else {
                return Ok(false);
            };

            let mut merged = decode(&existing)?;
            merge_top_level(&mut merged, doc);
            conn.execute(&write, params![id, serde_json::to_string(&merged)?])?;
            Ok(true)
        })
        .await
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let (clause, binds) = where_clause(filters);
        let sql = format!("SELECT COUNT(*) FROM {} WHERE {}", quote_ident(table), clause);

        self.with_conn(move |conn| {
            let n: i64 = conn.query_row(&sql, params_from_iter(binds.iter()), |row| row.get(0))?;
            Ok(u64::try_from(n).unwrap_or(0))
        })
        .await
    }

    async fn query(&self, table: &str, plan: &QueryPlan) -> Result<Vec<Document>, StoreError> {
        let (clause, mut binds) = where_clause(&plan.filters);
        let order = json_expr(&FieldPath::top(plan.order.field.as_str())).unwrap_or_else(|| "NULL".to_string());
        let sql = format!(
            "SELECT doc FROM {} WHERE {} ORDER BY {} {}, id ASC LIMIT ? OFFSET ?",
            quote_ident(table),
            clause,
            order,
            plan.order.direction.as_sql()
        );
        binds.push(SqlValue::Integer(
            plan.limit.and_then(|l| i64::try_from(l).ok()).unwrap_or(-1),
        ));
        binds.push(SqlValue::Integer(i64::try_from(plan.skip).unwrap_or(i64::MAX)));

        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(binds.iter()), |row| row.get::<_, String>(0))?;
            let mut docs = Vec::new();
            for text in rows {
                docs.push(decode(&text?)?);
            }
            Ok(docs)
        })
        .await
    }
}
