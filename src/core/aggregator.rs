/// In-memory correlation of log lines by queue id
///
/// Records are kept in first-seen order so that a flattened import is
/// deterministic for a given input file.

use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;

use super::model::{LogLine, MessageRecord, ParsedFields};

#[derive(Debug, Default)]
pub struct MessageAggregator {
    index: HashMap<String, usize>,
    records: Vec<MessageRecord>,
}

impl MessageAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, queue_id: &str, observed_at: DateTime<FixedOffset>) -> &mut MessageRecord {
        let queue_id = queue_id.trim();
        let idx = match self.index.get(queue_id) {
            Some(idx) => *idx,
            None => {
                let idx = self.records.len();
                self.records.push(MessageRecord::new(queue_id, observed_at));
                self.index.insert(queue_id.to_string(), idx);
                idx
            }
        };
        &mut self.records[idx]
    }

    /// Sparse merge of recognised fields into the record for `queue_id`.
    /// `observed_at` is only used when the record does not exist yet.
    pub fn merge(&mut self, queue_id: &str, observed_at: DateTime<FixedOffset>, fields: ParsedFields) {
        self.entry(queue_id, observed_at).apply(fields);
    }

    /// Append a raw line, creating the record (timestamped by the line) if absent
    pub fn append_line(&mut self, queue_id: &str, line: LogLine) {
        self.entry(queue_id, line.timestamp).push_line(line);
    }

    pub fn get(&self, queue_id: &str) -> Option<&MessageRecord> {
        self.index.get(queue_id.trim()).map(|idx| &self.records[*idx])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MessageRecord> {
        self.records.iter()
    }

    pub fn into_records(self) -> Vec<MessageRecord> {
        self.records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::Status;
    use chrono::TimeZone;

    fn at(min: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2019, 9, 17, 6, min, 0)
            .unwrap()
    }

    #[test]
    fn test_merge_creates_then_updates() {
        let mut agg = MessageAggregator::new();

        agg.merge(
            "E553EBD87B",
            at(0),
            ParsedFields {
                mail_from: Some("a@x.com".into()),
                ..Default::default()
            },
        );
        agg.merge(
            "E553EBD87B",
            at(5),
            ParsedFields {
                status: Some(Status {
                    code: "sent".into(),
                    message: String::new(),
                }),
                ..Default::default()
            },
        );

        assert_eq!(agg.len(), 1);
        let record = agg.get("E553EBD87B").unwrap();
        assert_eq!(record.timestamp, at(0));
        assert_eq!(record.mail_from, "a@x.com");
        assert_eq!(record.status.as_ref().unwrap().code, "sent");
    }

    #[test]
    fn test_append_line_keeps_first_timestamp() {
        let mut agg = MessageAggregator::new();
        agg.append_line("E553EBD87B", LogLine::new(at(3), "E553EBD87B", "one"));
        agg.append_line("E553EBD87B", LogLine::new(at(1), "E553EBD87B", "two"));

        let record = agg.get("E553EBD87B").unwrap();
        assert_eq!(record.timestamp, at(3));
        let messages: Vec<_> = record.lines.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["one", "two"]);
    }

    #[test]
    fn test_iteration_is_first_seen_order() {
        let mut agg = MessageAggregator::new();
        for qid in ["BBBBBBBBBB", "AAAAAAAAAA", "BBBBBBBBBB", "CCCCCCCCCC"] {
            agg.append_line(qid, LogLine::new(at(0), qid, "x"));
        }

        let order: Vec<_> = agg.iter().map(|r| r.queue_id.as_str()).collect();
        assert_eq!(order, vec!["BBBBBBBBBB", "AAAAAAAAAA", "CCCCCCCCCC"]);
        assert_eq!(agg.into_records()[0].lines.len(), 2);
    }
}
