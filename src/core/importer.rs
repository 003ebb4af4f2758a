/// Batch import of a Postfix mail.log
///
/// Lines are scanned sequentially. Lines whose envelope (syslog timestamp
/// plus 10-character queue id) does not match belong to other daemons and are
/// skipped silently; everything else is recognised, merged by queue id, then
/// flattened and saved once the whole file has been read.

use regex::Regex;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

use super::aggregator::MessageAggregator;
use super::error::{ImportError, StoreError};
use super::log_parser::parse_line;
use super::model::{LogLine, MessageRecord, PersistedRecord};
use super::store::DocumentStore;
use super::timestamp::TimestampNormalizer;
use super::upsert::{save_all, BatchReport, OnConflict};
use crate::utils::constants::{DEFAULT_IMPORT_CONCURRENCY, SENT_MAIL_TABLE};
use crate::utils::helpers::email_domain;

/// Syslog timestamp, anything, then `QUEUEID:` and the message.
/// The day may be space-padded (`Sep  7`).
fn envelope_re() -> &'static Regex {
    static ENVELOPE_RE: OnceLock<Regex> = OnceLock::new();
    ENVELOPE_RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z]+ +[0-9]+ [0-9]+:[0-9]+:[0-9]+).*([A-F0-9]{10}): ?(.*)").unwrap()
    })
}

/// Split a raw line into (timestamp text, queue id, message)
pub fn match_envelope(line: &str) -> Option<(&str, &str, &str)> {
    let caps = envelope_re().captures(line)?;
    Some((
        caps.get(1)?.as_str(),
        caps.get(2)?.as_str(),
        caps.get(3)?.as_str(),
    ))
}

/// Drops records whose sender or recipient domain is ignored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainFilter {
    ignored: HashSet<String>,
}

impl DomainFilter {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: domains.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_ignored(&self, domain: &str) -> bool {
        self.ignored.contains(domain)
    }

    /// True when either address has an ignored domain. Addresses without
    /// an `@` have no domain to compare and never exclude a record.
    pub fn excludes(&self, record: &MessageRecord) -> bool {
        [("mail_from", &record.mail_from), ("mail_to", &record.mail_to)]
            .into_iter()
            .any(|(field, address)| match email_domain(address) {
                Some(domain) => self.is_ignored(domain),
                None => {
                    tracing::debug!(
                        "{}: {} '{}' has no domain, keeping record",
                        record.queue_id,
                        field,
                        address
                    );
                    false
                }
            })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub lines_read: usize,
    /// Lines whose envelope matched
    pub lines_matched: usize,
    /// Matched lines dropped because their timestamp could not be resolved
    pub lines_skipped: usize,
    pub messages: usize,
}

/// Every message seen in one pass over a log
#[derive(Debug, Default)]
pub struct ParsedLog {
    pub messages: MessageAggregator,
    pub summary: ImportSummary,
}

#[derive(Debug)]
pub struct ImportReport {
    pub summary: ImportSummary,
    /// Records that passed the domain filter
    pub kept: usize,
    pub dropped: usize,
    pub batch: BatchReport,
}

#[derive(Debug, Clone)]
pub struct Importer {
    normalizer: TimestampNormalizer,
    domain_filter: DomainFilter,
    concurrency: usize,
}

impl Importer {
    pub fn new(normalizer: TimestampNormalizer) -> Self {
        Self {
            normalizer,
            domain_filter: DomainFilter::default(),
            concurrency: DEFAULT_IMPORT_CONCURRENCY,
        }
    }

    pub fn with_domain_filter(mut self, filter: DomainFilter) -> Self {
        self.domain_filter = filter;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn import(&self, path: impl AsRef<Path>) -> Result<ParsedLog, ImportError> {
        let path = path.as_ref();
        tracing::info!("Opening log file {}", path.display());

        let file = File::open(path).map_err(|source| ImportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = self.import_reader(BufReader::new(file))?;

        tracing::info!(
            "Finished parsing {}: {} line(s), {} matched, {} skipped, {} message(s)",
            path.display(),
            parsed.summary.lines_read,
            parsed.summary.lines_matched,
            parsed.summary.lines_skipped,
            parsed.summary.messages
        );
        Ok(parsed)
    }

    pub fn import_reader<R: BufRead>(&self, mut reader: R) -> Result<ParsedLog, ImportError> {
        let mut messages = MessageAggregator::new();
        let mut summary = ImportSummary::default();
        let mut buf = Vec::new();

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            summary.lines_read += 1;

            while matches!(buf.last(), Some(b'\n') | Some(b'\r')) {
                buf.pop();
            }
            let raw = String::from_utf8_lossy(&buf);

            let Some((timestamp, queue_id, message)) = match_envelope(&raw) else {
                continue;
            };
            summary.lines_matched += 1;

            let line = match LogLine::parse(timestamp, queue_id, message, &self.normalizer) {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Skipping line {}: {}", summary.lines_read, e);
                    summary.lines_skipped += 1;
                    continue;
                }
            };

            messages.merge(queue_id, line.timestamp, parse_line(message));
            messages.append_line(queue_id, line);
        }

        summary.messages = messages.len();
        Ok(ParsedLog { messages, summary })
    }

    /// Persisted form of every record the domain filter keeps, plus the number dropped
    pub fn flatten(&self, messages: &MessageAggregator) -> (Vec<PersistedRecord>, usize) {
        let mut kept = Vec::with_capacity(messages.len());
        let mut dropped = 0;

        for record in messages.iter() {
            if self.domain_filter.excludes(record) {
                tracing::debug!("{}: ignored domain, dropping", record.queue_id);
                dropped += 1;
                continue;
            }
            kept.push(record.to_persisted());
        }

        (kept, dropped)
    }

    /// Parse `path` and upsert every kept record into `sent_mail`
    pub async fn import_into(
        &self,
        store: &dyn DocumentStore,
        path: impl AsRef<Path>,
    ) -> Result<ImportReport, ImportError> {
        let parsed = self.import(path)?;
        let (records, dropped) = self.flatten(&parsed.messages);
        tracing::info!(
            "Total of {} message entries ({} dropped by domain filter)",
            records.len(),
            dropped
        );

        let docs = records
            .iter()
            .map(|r| r.to_document().map_err(StoreError::from))
            .collect::<Result<Vec<_>, _>>()?;
        let kept = docs.len();

        let batch = save_all(
            store,
            SENT_MAIL_TABLE,
            docs,
            Some("id"),
            OnConflict::Update,
            self.concurrency,
        )
        .await?;

        tracing::info!(
            "Saved {} record(s): {} inserted, {} updated",
            batch.succeeded(),
            batch.inserted,
            batch.updated
        );

        Ok(ImportReport {
            summary: parsed.summary,
            kept,
            dropped,
            batch,
        })
    }
}
