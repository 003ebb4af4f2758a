/// Error types shared by the import pipeline, the store and the query layer

use std::path::PathBuf;
use thiserror::Error;

/// Failures turning a syslog timestamp into an absolute instant
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    #[error("unrecognised timestamp '{0}'")]
    Unrecognized(String),

    #[error("'{0}' is not a valid calendar date/time")]
    InvalidDate(String),

    #[error("local time '{text}' does not exist in timezone {tz}")]
    NonexistentLocalTime { text: String, tz: String },

    #[error("unknown timezone '{0}'")]
    UnknownTimezone(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("table '{table}' entry with '{field} = {value}' already exists")]
    AlreadyExists {
        table: String,
        field: String,
        value: String,
    },

    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("document is missing key field '{0}'")]
    MissingKey(String),

    #[error("store task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read log data: {0}")]
    Read(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// One or more saves in a batch failed; the rest of the batch still ran
#[derive(Debug, Error)]
#[error("{failed} of {attempted} saves to '{table}' failed")]
pub struct BatchError {
    pub table: String,
    pub failed: usize,
    pub attempted: usize,
    pub report: crate::core::upsert::BatchReport,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_exists_display() {
        let err = StoreError::AlreadyExists {
            table: "sent_mail".to_string(),
            field: "id".to_string(),
            value: "E553EBD87B".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "table 'sent_mail' entry with 'id = E553EBD87B' already exists"
        );
        assert!(err.is_already_exists());
        assert!(!StoreError::MissingKey("id".into()).is_already_exists());
    }

    #[test]
    fn test_timestamp_error_display() {
        let err = TimestampError::InvalidDate("Feb 30 10:00:00".to_string());
        assert_eq!(err.to_string(), "'Feb 30 10:00:00' is not a valid calendar date/time");
    }
}
