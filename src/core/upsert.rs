/// Create-or-update writes with a per-call conflict policy, and bounded
/// concurrent batches of them

use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

use super::error::{BatchError, StoreError};
use super::store::{value_key, Document, DocumentStore};
use crate::utils::helpers::generate_hex_string;

/// What to do when a document with the same key already exists
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnConflict {
    /// Leave the stored document alone and report `Skipped`
    Quiet,
    /// Fail with `StoreError::AlreadyExists`
    #[default]
    Except,
    /// Merge the new top-level fields into the stored document
    Update,
}

impl FromStr for OnConflict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "quiet" => Ok(OnConflict::Quiet),
            "except" => Ok(OnConflict::Except),
            "update" => Ok(OnConflict::Update),
            other => Err(format!(
                "on-conflict must be either 'quiet', 'except', or 'update' (got '{}')",
                other
            )),
        }
    }
}

impl fmt::Display for OnConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OnConflict::Quiet => "quiet",
            OnConflict::Except => "except",
            OnConflict::Update => "update",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Inserted,
    Updated,
    Skipped,
}

/// Save one document.
///
/// With a `primary` field its value is copied into `id` (unless `id` is
/// already set) and used to look for an existing document. Without one the
/// document is always inserted, under a generated id if it has none.
pub async fn save(
    store: &dyn DocumentStore,
    table: &str,
    mut doc: Document,
    primary: Option<&str>,
    on_conflict: OnConflict,
) -> Result<SaveOutcome, StoreError> {
    let Some(primary) = primary else {
        if !doc.contains_key("id") {
            doc.insert("id".to_string(), Value::String(generate_hex_string(32)));
        }
        store.insert(table, doc).await?;
        return Ok(SaveOutcome::Inserted);
    };

    let key_value = doc
        .get(primary)
        .cloned()
        .ok_or_else(|| StoreError::MissingKey(primary.to_string()))?;
    let key = value_key(&key_value).ok_or_else(|| StoreError::MissingKey(primary.to_string()))?;

    if !doc.contains_key("id") {
        doc.insert("id".to_string(), key_value);
    }

    if store.get(table, &key).await?.is_none() {
        store.insert(table, doc).await?;
        return Ok(SaveOutcome::Inserted);
    }

    match on_conflict {
        OnConflict::Quiet => Ok(SaveOutcome::Skipped),
        OnConflict::Except => Err(StoreError::AlreadyExists {
            table: table.to_string(),
            field: primary.to_string(),
            value: key,
        }),
        OnConflict::Update => {
            if store.update(table, &key, doc.clone()).await? {
                return Ok(SaveOutcome::Updated);
            }
            tracing::debug!("{}: '{}' vanished before update, inserting", table, key);
            store.insert(table, doc).await?;
            Ok(SaveOutcome::Inserted)
        }
    }
}

/// Outcome of a batch of saves. Every save runs; failures are collected.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    /// Document key and the error its save returned
    pub failures: Vec<(String, StoreError)>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.inserted + self.updated + self.skipped
    }

    pub fn attempted(&self) -> usize {
        self.succeeded() + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, key: String, result: Result<SaveOutcome, StoreError>) {
        match result {
            Ok(SaveOutcome::Inserted) => self.inserted += 1,
            Ok(SaveOutcome::Updated) => self.updated += 1,
            Ok(SaveOutcome::Skipped) => self.skipped += 1,
            Err(e) => {
                tracing::warn!("Save of '{}' failed: {}", key, e);
                self.failures.push((key, e));
            }
        }
    }
}

fn doc_label(doc: &Document, primary: Option<&str>) -> String {
    primary
        .and_then(|p| doc.get(p))
        .or_else(|| doc.get("id"))
        .and_then(value_key)
        .unwrap_or_else(|| "<unkeyed>".to_string())
}

/// Save every document, at most `concurrency` at a time.
///
/// Returns the report when all saves succeeded, otherwise a `BatchError`
/// carrying the same report.
pub async fn save_all(
    store: &dyn DocumentStore,
    table: &str,
    docs: Vec<Document>,
    primary: Option<&str>,
    on_conflict: OnConflict,
    concurrency: usize,
) -> Result<BatchReport, BatchError> {
    let calls: Vec<_> = docs
        .into_iter()
        .map(|doc| {
            let key = doc_label(&doc, primary);
            async move { (key, save(store, table, doc, primary, on_conflict).await) }
        })
        .collect();

    tracing::info!(
        "Saving {} document(s) to '{}' ({} at a time, on conflict: {})",
        calls.len(),
        table,
        concurrency.max(1),
        on_conflict
    );

    let mut report = BatchReport::default();
    let mut results = stream::iter(calls).buffer_unordered(concurrency.max(1));
    while let Some((key, result)) = results.next().await {
        report.record(key, result);
    }

    if report.is_success() {
        Ok(report)
    } else {
        Err(BatchError {
            table: table.to_string(),
            failed: report.failures.len(),
            attempted: report.attempted(),
            report,
        })
    }
}
