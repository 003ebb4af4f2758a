/// Table layout and setting defaults

use crate::core::store::TableSpec;

/// Table holding one document per reconstructed message
pub const SENT_MAIL_TABLE: &str = "sent_mail";

/// Fields `sent_mail` is indexed on
pub const SENT_MAIL_INDEXES: &[&str] = &["mail_to", "timestamp", "first_attempt", "last_attempt"];

pub const DEFAULT_MAIL_LOG: &str = "/var/log/mail.log";
pub const DEFAULT_IGNORE_DOMAINS: &[&str] = &["localhost", "127.0.0.1"];
pub const DEFAULT_LIMIT: i64 = 50;
pub const DEFAULT_MAX_LIMIT: i64 = 1000;
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_STORE_PATH: &str = "maildata.db";
pub const DEFAULT_IMPORT_CONCURRENCY: usize = 64;

/// HTTP server defaults
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5222;

pub const DEFAULT_ENV_FILE: &str = ".env";

/// Length of an API token from `config generate-token`
pub const API_TOKEN_LENGTH: usize = 64;

/// Every table the application bootstraps on first connect
pub fn app_tables() -> Vec<TableSpec> {
    vec![TableSpec::new(SENT_MAIL_TABLE, SENT_MAIL_INDEXES)]
}
