/// Delivery records reconstructed from Postfix log lines
///
/// A `MessageRecord` accumulates every `LogLine` that shares a queue id, plus
/// the structured fields recognised in those lines. `PersistedRecord` is the
/// flattened document shape written to the store.

use chrono::{DateTime, FixedOffset, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::error::TimestampError;
use super::timestamp::TimestampNormalizer;

/// Delivery status, e.g. `status=bounced (host said: 550 ...)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: String,
    pub message: String,
}

/// Next-hop relay, e.g. `relay=mx.example.com[203.0.113.9]:25`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relay {
    pub host: String,
    pub ip: String,
    pub port: String,
}

/// Connecting client, e.g. `client=web1.example.com[10.0.0.4]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub host: String,
    pub ip: String,
}

/// Sparse set of fields recognised in a single message fragment.
/// `None` means "not present in this line", never "clear the field".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedFields {
    pub mail_to: Option<String>,
    pub mail_from: Option<String>,
    pub message_id: Option<String>,
    pub status: Option<Status>,
    pub relay: Option<Relay>,
    pub client: Option<Client>,
}

impl ParsedFields {
    /// Number of recognised fields
    pub fn len(&self) -> usize {
        [
            self.mail_to.is_some(),
            self.mail_from.is_some(),
            self.message_id.is_some(),
            self.status.is_some(),
            self.relay.is_some(),
            self.client.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One physical log line belonging to a queue id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub timestamp: DateTime<FixedOffset>,
    pub queue_id: String,
    pub message: String,
}

impl LogLine {
    pub fn new(
        timestamp: DateTime<FixedOffset>,
        queue_id: impl AsRef<str>,
        message: impl AsRef<str>,
    ) -> Self {
        Self {
            timestamp,
            queue_id: queue_id.as_ref().trim().to_string(),
            message: message.as_ref().trim().to_string(),
        }
    }

    /// Build a line from the raw envelope timestamp text
    pub fn parse(
        raw_timestamp: &str,
        queue_id: &str,
        message: &str,
        normalizer: &TimestampNormalizer,
    ) -> Result<Self, TimestampError> {
        let timestamp = normalizer.parse(raw_timestamp)?;
        Ok(Self::new(timestamp, queue_id, message))
    }

    pub fn to_persisted(&self) -> PersistedLine {
        PersistedLine {
            timestamp: self.timestamp.with_timezone(&Utc),
            queue_id: self.queue_id.clone(),
            message: self.message.clone(),
        }
    }
}

/// Accumulating record for one queue id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Instant the queue id was first observed
    pub timestamp: DateTime<FixedOffset>,
    pub queue_id: String,
    pub lines: Vec<LogLine>,
    pub mail_to: String,
    pub mail_from: String,
    pub message_id: String,
    pub status: Option<Status>,
    pub relay: Option<Relay>,
    pub client: Option<Client>,
}

impl MessageRecord {
    pub fn new(queue_id: impl AsRef<str>, timestamp: DateTime<FixedOffset>) -> Self {
        Self {
            timestamp,
            queue_id: queue_id.as_ref().trim().to_string(),
            lines: Vec::new(),
            mail_to: String::new(),
            mail_from: String::new(),
            message_id: String::new(),
            status: None,
            relay: None,
            client: None,
        }
    }

    pub fn first_attempt(&self) -> Option<DateTime<FixedOffset>> {
        self.lines.first().map(|line| line.timestamp)
    }

    pub fn last_attempt(&self) -> Option<DateTime<FixedOffset>> {
        self.lines.last().map(|line| line.timestamp)
    }

    /// Last-recognised-wins merge; absent fields keep their previous value
    pub fn apply(&mut self, fields: ParsedFields) {
        let ParsedFields {
            mail_to,
            mail_from,
            message_id,
            status,
            relay,
            client,
        } = fields;

        if let Some(mail_to) = mail_to {
            self.mail_to = mail_to;
        }
        if let Some(mail_from) = mail_from {
            self.mail_from = mail_from;
        }
        if let Some(message_id) = message_id {
            self.message_id = message_id;
        }
        if status.is_some() {
            self.status = status;
        }
        if relay.is_some() {
            self.relay = relay;
        }
        if client.is_some() {
            self.client = client;
        }
    }

    pub fn push_line(&mut self, line: LogLine) {
        self.lines.push(line);
    }

    /// Flatten into the stored document shape (`id` := queue id)
    pub fn to_persisted(&self) -> PersistedRecord {
        let timestamp = self.timestamp.with_timezone(&Utc);
        PersistedRecord {
            id: self.queue_id.clone(),
            queue_id: self.queue_id.clone(),
            timestamp,
            first_attempt: self
                .first_attempt()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(timestamp),
            last_attempt: self
                .last_attempt()
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(timestamp),
            lines: self.lines.iter().map(LogLine::to_persisted).collect(),
            mail_to: self.mail_to.clone(),
            mail_from: self.mail_from.clone(),
            message_id: self.message_id.clone(),
            status: self.status.clone(),
            relay: self.relay.clone(),
            client: self.client.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedLine {
    pub timestamp: DateTime<Utc>,
    pub queue_id: String,
    pub message: String,
}

/// Document written to the `sent_mail` table.
/// Unrecognised structured fields are stored as `{}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: String,
    pub queue_id: String,
    pub timestamp: DateTime<Utc>,
    pub first_attempt: DateTime<Utc>,
    pub last_attempt: DateTime<Utc>,
    pub lines: Vec<PersistedLine>,
    #[serde(default)]
    pub mail_to: String,
    #[serde(default)]
    pub mail_from: String,
    #[serde(default)]
    pub message_id: String,
    #[serde(
        default,
        serialize_with = "empty_object_if_none",
        deserialize_with = "none_if_empty_object"
    )]
    pub status: Option<Status>,
    #[serde(
        default,
        serialize_with = "empty_object_if_none",
        deserialize_with = "none_if_empty_object"
    )]
    pub relay: Option<Relay>,
    #[serde(
        default,
        serialize_with = "empty_object_if_none",
        deserialize_with = "none_if_empty_object"
    )]
    pub client: Option<Client>,
}

impl PersistedRecord {
    /// JSON object form used by the document store
    pub fn to_document(&self) -> Result<serde_json::Map<String, serde_json::Value>, serde_json::Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(serde::ser::Error::custom(format!(
                "expected a JSON object, got {}",
                other
            ))),
        }
    }
}

fn empty_object_if_none<T, S>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: Serialize,
    S: Serializer,
{
    match value {
        Some(inner) => inner.serialize(serializer),
        None => serde_json::Map::new().serialize(serializer),
    }
}

fn none_if_empty_object<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: DeserializeOwned,
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match &value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Object(map) if map.is_empty() => Ok(None),
        _ => serde_json::from_value(value)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2019, 9, 17, hour, min, sec)
            .unwrap()
    }

    #[test]
    fn test_log_line_trims() {
        let line = LogLine::new(at(6, 0, 0), " E553EBD87B ", "  removed \n");
        assert_eq!(line.queue_id, "E553EBD87B");
        assert_eq!(line.message, "removed");
    }

    #[test]
    fn test_apply_is_last_write_wins_per_field() {
        let mut record = MessageRecord::new("E553EBD87B", at(6, 0, 0));

        record.apply(ParsedFields {
            mail_from: Some("a@x.com".into()),
            status: Some(Status {
                code: "deferred".into(),
                message: "(try again)".into(),
            }),
            ..Default::default()
        });
        record.apply(ParsedFields {
            mail_to: Some("b@y.com".into()),
            status: Some(Status {
                code: "sent".into(),
                message: String::new(),
            }),
            ..Default::default()
        });
        record.apply(ParsedFields::default());

        assert_eq!(record.mail_from, "a@x.com");
        assert_eq!(record.mail_to, "b@y.com");
        assert_eq!(record.status.as_ref().map(|s| s.code.as_str()), Some("sent"));
        assert!(record.relay.is_none());
    }

    #[test]
    fn test_attempt_bounds_follow_lines() {
        let mut record = MessageRecord::new("E553EBD87B", at(6, 0, 0));
        assert!(record.first_attempt().is_none());

        record.push_line(LogLine::new(at(6, 0, 0), "E553EBD87B", "a"));
        record.push_line(LogLine::new(at(6, 5, 0), "E553EBD87B", "b"));

        assert_eq!(record.first_attempt(), Some(at(6, 0, 0)));
        assert_eq!(record.last_attempt(), Some(at(6, 5, 0)));
        assert!(record.first_attempt() <= record.last_attempt());
    }

    #[test]
    fn test_persisted_document_shape() {
        let mut record = MessageRecord::new("E553EBD87B", at(6, 25, 1));
        record.push_line(LogLine::new(at(6, 25, 1), "E553EBD87B", "from=<a@x.com>"));
        record.apply(ParsedFields {
            mail_from: Some("a@x.com".into()),
            ..Default::default()
        });

        let doc = record.to_persisted().to_document().unwrap();

        assert_eq!(doc["id"], "E553EBD87B");
        assert_eq!(doc["timestamp"], "2019-09-17T06:25:01Z");
        assert_eq!(doc["first_attempt"], "2019-09-17T06:25:01Z");
        assert_eq!(doc["status"], serde_json::json!({}));
        assert_eq!(doc["lines"][0]["message"], "from=<a@x.com>");
    }

    #[test]
    fn test_persisted_record_reads_back_empty_objects() {
        let mut record = MessageRecord::new("E553EBD87B", at(6, 25, 1));
        record.push_line(LogLine::new(at(6, 25, 1), "E553EBD87B", "x"));
        record.relay = Some(Relay {
            host: "mx.y.com".into(),
            ip: "203.0.113.9".into(),
            port: "25".into(),
        });
        let persisted = record.to_persisted();

        let value = serde_json::to_value(&persisted).unwrap();
        let back: PersistedRecord = serde_json::from_value(value).unwrap();

        assert_eq!(back, persisted);
        assert!(back.status.is_none());
    }
}
