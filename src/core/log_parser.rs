/// Field recognition for Postfix log messages
///
/// Pulls the handful of fields we care about out of the free text that
/// follows `QUEUEID:` on a mail.log line:
/// - `to=<addr>` and `from=<addr>`
/// - `message-id=<...>`
/// - `status=code (details)`
/// - `relay=host[ip]:port`
/// - `client=host[ip]`
///
/// Every pattern has a greedy `.*` prefix, so when a token appears twice in a
/// fragment the last occurrence is the one captured.

use regex::Regex;
use std::sync::OnceLock;

use super::model::{Client, ParsedFields, Relay, Status};

fn to_re() -> &'static Regex {
    static TO_RE: OnceLock<Regex> = OnceLock::new();
    TO_RE.get_or_init(|| Regex::new(r".*to=<([A-Za-z0-9_.-]+@[A-Za-z0-9_.-]+)>").unwrap())
}

fn from_re() -> &'static Regex {
    static FROM_RE: OnceLock<Regex> = OnceLock::new();
    FROM_RE.get_or_init(|| Regex::new(r".*from=<([A-Za-z0-9_.-]+@[A-Za-z0-9_.-]+)>").unwrap())
}

fn message_id_re() -> &'static Regex {
    static MESSAGE_ID_RE: OnceLock<Regex> = OnceLock::new();
    MESSAGE_ID_RE.get_or_init(|| Regex::new(r".*message-id=<(.*)>").unwrap())
}

fn status_re() -> &'static Regex {
    static STATUS_RE: OnceLock<Regex> = OnceLock::new();
    STATUS_RE.get_or_init(|| Regex::new(r".*status=([A-Za-z0-9_.-]+)(?: (.*))?").unwrap())
}

fn relay_re() -> &'static Regex {
    static RELAY_RE: OnceLock<Regex> = OnceLock::new();
    RELAY_RE.get_or_init(|| Regex::new(r".*relay=([A-Za-z0-9_.-]+)\[(.*)\]:([0-9]+)").unwrap())
}

fn client_re() -> &'static Regex {
    static CLIENT_RE: OnceLock<Regex> = OnceLock::new();
    CLIENT_RE.get_or_init(|| Regex::new(r".*client=([A-Za-z0-9_.-]+)\[(.*)\]").unwrap())
}

/// Recognise fields in one message fragment. Never fails; an unrecognised
/// fragment yields an empty `ParsedFields`.
pub fn parse_line(message: &str) -> ParsedFields {
    let mut fields = ParsedFields::default();

    if let Some(caps) = to_re().captures(message) {
        fields.mail_to = Some(caps[1].to_string());
    }

    if let Some(caps) = from_re().captures(message) {
        fields.mail_from = Some(caps[1].to_string());
    }

    if let Some(caps) = message_id_re().captures(message) {
        fields.message_id = Some(caps[1].to_string());
    }

    if let Some(caps) = status_re().captures(message) {
        fields.status = Some(Status {
            code: caps[1].to_string(),
            message: caps.get(2).map(|m| m.as_str().to_string()).unwrap_or_default(),
        });
    }

    if let Some(caps) = relay_re().captures(message) {
        fields.relay = Some(Relay {
            host: caps[1].to_string(),
            ip: caps[2].to_string(),
            port: caps[3].to_string(),
        });
    }

    if let Some(caps) = client_re().captures(message) {
        fields.client = Some(Client {
            host: caps[1].to_string(),
            ip: caps[2].to_string(),
        });
    }

    fields
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delivery_line() {
        let fields = parse_line(
            "to=<b@y.com>, relay=mx.y.com[203.0.113.9]:25, delay=0.5, \
             delays=0.1/0/0.2/0.2, dsn=2.0.0, status=sent (250 2.0.0 OK queued as 1234)",
        );

        assert_eq!(fields.mail_to.as_deref(), Some("b@y.com"));
        assert_eq!(
            fields.relay,
            Some(Relay {
                host: "mx.y.com".into(),
                ip: "203.0.113.9".into(),
                port: "25".into(),
            })
        );
        assert_eq!(
            fields.status,
            Some(Status {
                code: "sent".into(),
                message: "(250 2.0.0 OK queued as 1234)".into(),
            })
        );
        assert_eq!(fields.len(), 3);
    }

    #[test]
    fn test_parse_client_line() {
        let fields = parse_line("client=web1.example.com[10.0.0.4]");
        assert_eq!(
            fields.client,
            Some(Client {
                host: "web1.example.com".into(),
                ip: "10.0.0.4".into(),
            })
        );
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_parse_from_and_message_id() {
        let fields = parse_line("from=<a@x.com>, size=1234, nrcpt=1 (queue active)");
        assert_eq!(fields.mail_from.as_deref(), Some("a@x.com"));
        assert!(fields.mail_to.is_none());

        let fields = parse_line("message-id=<20190917062501.ABC@x.com>");
        assert_eq!(fields.message_id.as_deref(), Some("20190917062501.ABC@x.com"));
    }

    #[test]
    fn test_status_without_details() {
        let fields = parse_line("to=<b@y.com> status=sent");
        assert_eq!(fields.mail_to.as_deref(), Some("b@y.com"));
        assert_eq!(
            fields.status,
            Some(Status {
                code: "sent".into(),
                message: String::new(),
            })
        );
    }

    #[test]
    fn test_last_occurrence_wins() {
        let fields = parse_line("to=<first@x.com> orig_to=<second@x.com>");
        assert_eq!(fields.mail_to.as_deref(), Some("second@x.com"));
    }

    #[test]
    fn test_unrecognised_fragment() {
        assert!(parse_line("removed").is_empty());
        assert!(parse_line("").is_empty());
        // relay without a bracketed address
        assert!(parse_line("relay=none").relay.is_none());
    }

    #[test]
    fn test_address_alphabet() {
        assert!(parse_line("to=<b+tag@y.com>").mail_to.is_none());
        assert_eq!(
            parse_line("to=<first.last-x_y@mail.y-z.com>").mail_to.as_deref(),
            Some("first.last-x_y@mail.y-z.com")
        );
    }
}
