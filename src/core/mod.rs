pub mod aggregator;
pub mod config;
pub mod error;
pub mod importer;
pub mod log_parser;
pub mod model;
pub mod pagination;
pub mod query;
pub mod store;
pub mod timestamp;
pub mod upsert;

pub use aggregator::MessageAggregator;
pub use config::{EnvFile, Settings, StoreKind};
pub use error::{BatchError, ImportError, StoreError, TimestampError};
pub use importer::{DomainFilter, ImportReport, ImportSummary, Importer, ParsedLog};
pub use log_parser::parse_line;
pub use model::{Client, LogLine, MessageRecord, ParsedFields, PersistedRecord, Relay, Status};
pub use pagination::{paginate, Page, PageLimits, PageRequest};
pub use query::{list_documents, Filter, FilterOp, Listing, OrderBy, QueryParams, QueryPlan};
pub use store::{Database, Document, DocumentStore, MemoryStore, SqliteStore, StoreBackend, TableSpec};
pub use timestamp::TimestampNormalizer;
pub use upsert::{save, save_all, BatchReport, OnConflict, SaveOutcome};
