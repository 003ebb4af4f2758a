/// In-process document store

use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{merge_top_level, value_key, Document, DocumentStore, TableSpec};
use crate::core::error::StoreError;
use crate::core::query::{Filter, QueryPlan, SortDirection};

type Table = HashMap<String, Document>;

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Null < numbers (bools as 0/1) < text. Objects and arrays sort by their JSON text.
#[derive(Debug, PartialEq, PartialOrd)]
enum SortKey {
    Null,
    Num(f64),
    Text(String),
}

fn sort_key(doc: &Document, field: &str) -> SortKey {
    match doc.get(field) {
        None | Some(Value::Null) => SortKey::Null,
        Some(Value::Bool(b)) => SortKey::Num(if *b { 1.0 } else { 0.0 }),
        Some(Value::Number(n)) => SortKey::Num(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => SortKey::Text(s.clone()),
        Some(other) => SortKey::Text(other.to_string()),
    }
}

fn doc_id(doc: &Document) -> String {
    doc.get("id").and_then(value_key).unwrap_or_default()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables.entry(spec.name.clone()).or_default();
        Ok(())
    }

    async fn get(&self, table: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;
        Ok(rows.get(id).cloned())
    }

    async fn insert(&self, table: &str, doc: Document) -> Result<(), StoreError> {
        let id = doc
            .get("id")
            .and_then(value_key)
            .ok_or_else(|| StoreError::MissingKey("id".to_string()))?;

        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        if rows.contains_key(&id) {
            return Err(StoreError::AlreadyExists {
                table: table.to_string(),
                field: "id".to_string(),
                value: id,
            });
        }
        rows.insert(id, doc);
        Ok(())
    }

    async fn update(&self, table: &str, id: &str, doc: Document) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let rows = tables
            .get_mut(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        match rows.get_mut(id) {
            Some(existing) => {
                merge_top_level(existing, doc);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        Ok(rows
            .values()
            .filter(|doc| filters.iter().all(|f| f.matches(doc)))
            .count() as u64)
    }

    async fn query(&self, table: &str, plan: &QueryPlan) -> Result<Vec<Document>, StoreError> {
        let tables = self.tables.read().await;
        let rows = tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))?;

        let mut matched: Vec<&Document> = rows.values().filter(|doc| plan.matches(doc)).collect();

        matched.sort_by(|a, b| {
            let ka = sort_key(a, &plan.order.field);
            let kb = sort_key(b, &plan.order.field);
            let primary = ka.partial_cmp(&kb).unwrap_or(Ordering::Equal);
            let primary = match plan.order.direction {
                SortDirection::Asc => primary,
                SortDirection::Desc => primary.reverse(),
            };
            primary.then_with(|| doc_id(a).cmp(&doc_id(b)))
        });

        let skip = usize::try_from(plan.skip).unwrap_or(usize::MAX);
        let take = plan
            .limit
            .map(|l| usize::try_from(l).unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);

        Ok(matched.into_iter().skip(skip).take(take).cloned().collect())
    }
}
