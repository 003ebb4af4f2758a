/// Configuration from the environment and `.env` files
///
/// `Settings` is read once at startup (after `dotenv` has populated the
/// process environment). `EnvFile` edits a `.env` in place for
/// `config generate-token --write`.

use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::error::TimestampError;
use super::importer::DomainFilter;
use super::pagination::PageLimits;
use super::store::{Database, StoreBackend};
use super::timestamp::TimestampNormalizer;
use crate::utils::constants::*;
use crate::utils::helpers::{generate_hex_string, is_file_readable, mask_sensitive, parse_csv};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Sqlite,
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" => Ok(StoreKind::Sqlite),
            "memory" => Ok(StoreKind::Memory),
            other => Err(anyhow!("unknown store backend '{}' (expected sqlite or memory)", other)),
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreKind::Sqlite => f.write_str("sqlite"),
            StoreKind::Memory => f.write_str("memory"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub mail_log: PathBuf,
    pub ignore_domains: Vec<String>,
    pub default_limit: i64,
    pub max_limit: i64,
    pub log_timezone: String,
    /// Year assumed for syslog timestamps; current year when unset
    pub log_year: Option<i32>,
    pub store_backend: StoreKind,
    pub store_path: PathBuf,
    pub import_concurrency: usize,
    /// Bearer token required by the HTTP API when set
    pub api_token: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mail_log: PathBuf::from(DEFAULT_MAIL_LOG),
            ignore_domains: DEFAULT_IGNORE_DOMAINS.iter().map(|d| d.to_string()).collect(),
            default_limit: DEFAULT_LIMIT,
            max_limit: DEFAULT_MAX_LIMIT,
            log_timezone: DEFAULT_TIMEZONE.to_string(),
            log_year: None,
            store_backend: StoreKind::Sqlite,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            import_concurrency: DEFAULT_IMPORT_CONCURRENCY,
            api_token: None,
        }
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("{} must be a number (got '{}')", key, value))
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through `lookup`; empty values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut settings = Self::default();

        if let Some(v) = get("MAIL_LOG") {
            settings.mail_log = PathBuf::from(v);
        }
        if let Some(v) = get("IGNORE_DOMAINS") {
            settings.ignore_domains = parse_csv(&v);
        }
        if let Some(v) = get("DEFAULT_LIMIT") {
            settings.default_limit = parse_number("DEFAULT_LIMIT", &v)?;
        }
        if let Some(v) = get("MAX_LIMIT") {
            settings.max_limit = parse_number("MAX_LIMIT", &v)?;
        }
        if let Some(v) = get("LOG_TIMEZONE") {
            settings.log_timezone = v.trim().to_string();
        }
        if let Some(v) = get("LOG_YEAR") {
            settings.log_year = Some(parse_number("LOG_YEAR", &v)?);
        }
        if let Some(v) = get("STORE_BACKEND") {
            settings.store_backend = v.parse().context("Invalid STORE_BACKEND")?;
        }
        if let Some(v) = get("STORE_PATH") {
            settings.store_path = PathBuf::from(v);
        }
        if let Some(v) = get("IMPORT_CONCURRENCY") {
            settings.import_concurrency = parse_number("IMPORT_CONCURRENCY", &v)?;
        }
        settings.api_token = get("API_TOKEN").map(|v| v.trim().to_string());

        Ok(settings)
    }

    /// Human-readable problems; empty when the settings are usable
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.default_limit <= 0 {
            errors.push(format!("DEFAULT_LIMIT must be positive (got {})", self.default_limit));
        }

        if self.max_limit < self.default_limit {
            errors.push(format!(
                "MAX_LIMIT ({}) is smaller than DEFAULT_LIMIT ({})",
                self.max_limit, self.default_limit
            ));
        }

        if let Err(e) = self.timestamp_normalizer() {
            errors.push(e.to_string());
        }

        if self.import_concurrency == 0 {
            errors.push("IMPORT_CONCURRENCY must be at least 1".to_string());
        }

        if let Some(token) = &self.api_token {
            if token.len() < 16 {
                errors.push("API_TOKEN must be at least 16 characters".to_string());
            }
        }

        if !is_file_readable(&self.mail_log) {
            errors.push(format!("MAIL_LOG {} is not a readable file", self.mail_log.display()));
        }

        errors
    }

    /// (key, display value) pairs for `config view`; the token is masked
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("MAIL_LOG", self.mail_log.display().to_string()),
            ("IGNORE_DOMAINS", self.ignore_domains.join(",")),
            ("DEFAULT_LIMIT", self.default_limit.to_string()),
            ("MAX_LIMIT", self.max_limit.to_string()),
            ("LOG_TIMEZONE", self.log_timezone.clone()),
            (
                "LOG_YEAR",
                self.log_year
                    .map(|y| y.to_string())
                    .unwrap_or_else(|| "(current year)".to_string()),
            ),
            ("STORE_BACKEND", self.store_backend.to_string()),
            ("STORE_PATH", self.store_path.display().to_string()),
            ("IMPORT_CONCURRENCY", self.import_concurrency.to_string()),
            (
                "API_TOKEN",
                self.api_token
                    .as_deref()
                    .map(|t| mask_sensitive(t, 4))
                    .unwrap_or_else(|| "(not set)".to_string()),
            ),
        ]
    }

    pub fn timestamp_normalizer(&self) -> Result<TimestampNormalizer, TimestampError> {
        TimestampNormalizer::from_names(&self.log_timezone, self.log_year)
    }

    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
        }
    }

    pub fn domain_filter(&self) -> DomainFilter {
        DomainFilter::new(self.ignore_domains.iter().cloned())
    }

    pub fn store_backend(&self) -> StoreBackend {
        match self.store_backend {
            StoreKind::Sqlite => StoreBackend::Sqlite(self.store_path.clone()),
            StoreKind::Memory => StoreBackend::Memory,
        }
    }

    /// Unconnected handle for the configured store with the app's tables
    pub fn database(&self) -> Database {
        Database::new(self.store_backend(), app_tables())
    }
}

/// Line-preserving editor for a `.env` file
#[derive(Debug, Clone)]
pub struct EnvFile {
    path: PathBuf,
    lines: Vec<String>,
    values: HashMap<String, String>,
}

impl EnvFile {
    /// Load `path`; a missing file is treated as empty
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let content = if path.exists() {
            fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?
        } else {
            String::new()
        };

        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let values = lines
            .iter()
            .map(|l| l.trim())
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .filter_map(|l| l.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        Ok(Self { path, lines, values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Write back, rewriting existing keys in place and appending new ones
    pub fn save(&self) -> Result<()> {
        let mut written = Vec::new();
        let mut out = Vec::with_capacity(self.lines.len() + 1);

        for line in &self.lines {
            let trimmed = line.trim();
            if trimmed.starts_with('#') || trimmed.is_empty() {
                out.push(line.clone());
                continue;
            }
            match trimmed.split_once('=') {
                Some((key, _)) if self.values.contains_key(key.trim()) => {
                    let key = key.trim();
                    out.push(format!("{}={}", key, self.values[key]));
                    written.push(key.to_string());
                }
                _ => out.push(line.clone()),
            }
        }

        let mut new_keys: Vec<_> = self
            .values
            .keys()
            .filter(|k| !written.contains(k))
            .collect();
        new_keys.sort();
        for key in new_keys {
            out.push(format!("{}={}", key, self.values[key]));
        }

        let mut text = out.join("\n");
        text.push('\n');
        fs::write(&self.path, text)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        Ok(())
    }

    /// Generate a fresh hex API token and store it under `API_TOKEN`
    pub fn generate_api_token(&mut self) -> String {
        let token = generate_hex_string(API_TOKEN_LENGTH);
        self.set("API_TOKEN", token.clone());
        token
    }
}
