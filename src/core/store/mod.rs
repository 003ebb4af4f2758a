/// Document persistence
///
/// Records are stored as JSON objects keyed by their `id` field. Two backends:
/// - `MemoryStore` for tests and throwaway runs
/// - `SqliteStore` for everything else

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;

use super::error::StoreError;
use super::query::{Filter, QueryPlan};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type Document = serde_json::Map<String, Value>;

/// A table and the fields it should be indexed on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub indexes: Vec<String>,
}

impl TableSpec {
    pub fn new(name: &str, indexes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            indexes: indexes.iter().map(|i| i.to_string()).collect(),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create the table and its indexes if missing. Idempotent.
    async fn ensure_table(&self, spec: &TableSpec) -> Result<(), StoreError>;

    async fn get(&self, table: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Insert a new document; fails with `AlreadyExists` if the id is taken
    async fn insert(&self, table: &str, doc: Document) -> Result<(), StoreError>;

    /// Merge top-level fields into an existing document.
    /// Returns false when no document has that id.
    async fn update(&self, table: &str, id: &str, doc: Document) -> Result<bool, StoreError>;

    async fn count(&self, table: &str, filters: &[Filter]) -> Result<u64, StoreError>;

    async fn query(&self, table: &str, plan: &QueryPlan) -> Result<Vec<Document>, StoreError>;
}

/// String form of a key value; `None` for values that cannot be an id
pub fn value_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Supplied fields replace wholesale; everything else is kept
pub fn merge_top_level(existing: &mut Document, update: Document) {
    for (key, value) in update {
        existing.insert(key, value);
    }
}

/// Which store a `Database` connects to
#[derive(Clone)]
pub enum StoreBackend {
    Sqlite(PathBuf),
    Memory,
    /// An already-built store, e.g. a test double
    Provided(Arc<dyn DocumentStore>),
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Sqlite(path) => f.debug_tuple("Sqlite").field(path).finish(),
            StoreBackend::Memory => f.write_str("Memory"),
            StoreBackend::Provided(_) => f.write_str("Provided"),
        }
    }
}

/// Lazily connected store handle.
///
/// The first call to `store()` opens the backend and creates every table in
/// `tables`; later calls reuse the same connection until `close()`.
pub struct Database {
    backend: StoreBackend,
    tables: Vec<TableSpec>,
    store: OnceCell<Arc<dyn DocumentStore>>,
}

impl Database {
    pub fn new(backend: StoreBackend, tables: Vec<TableSpec>) -> Self {
        Self {
            backend,
            tables,
            store: OnceCell::new(),
        }
    }

    pub fn backend(&self) -> &StoreBackend {
        &self.backend
    }

    pub fn is_connected(&self) -> bool {
        self.store.initialized()
    }

    pub async fn store(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let store = self.store.get_or_try_init(|| self.connect()).await?;
        Ok(Arc::clone(store))
    }

    async fn connect(&self) -> Result<Arc<dyn DocumentStore>, StoreError> {
        let store: Arc<dyn DocumentStore> = match &self.backend {
            StoreBackend::Sqlite(path) => {
                tracing::info!("Opening SQLite store at {}", path.display());
                Arc::new(SqliteStore::open(path)?)
            }
            StoreBackend::Memory => {
                tracing::info!("Using in-memory store");
                Arc::new(MemoryStore::new())
            }
            StoreBackend::Provided(store) => Arc::clone(store),
        };

        for spec in &self.tables {
            tracing::debug!("Ensuring table {} (indexes: {:?})", spec.name, spec.indexes);
            store.ensure_table(spec).await?;
        }

        Ok(store)
    }

    /// Drop the cached connection; the next `store()` reconnects
    pub fn close(&mut self) {
        if self.store.take().is_some() {
            tracing::debug!("Closed store connection");
        }
    }
}
