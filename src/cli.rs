/// CLI argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use postfix_parser::utils::constants::DEFAULT_ENV_FILE;
#[cfg(feature = "server")]
use postfix_parser::utils::constants::{DEFAULT_HOST, DEFAULT_PORT};

// Build timestamp injected at compile time
pub const VERSION_WITH_BUILD: &str = concat!(env!("CARGO_PKG_VERSION"), " (built: ", env!("BUILD_TIMESTAMP"), ")");

#[derive(Parser)]
#[command(name = "postfix-parser")]
#[command(author, version = VERSION_WITH_BUILD, about, long_about = None)]
pub struct Cli {
    /// .env file to load before reading the environment
    #[arg(long, global = true, default_value = DEFAULT_ENV_FILE)]
    pub env_file: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a mail.log into the store
    Parse {
        /// Log file to read (defaults to MAIL_LOG)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Parse and report without writing to the store
        #[arg(long)]
        dry_run: bool,
    },

    /// Query stored emails, e.g. `emails status.code=bounced mail_to=*@acme.com limit=10`
    Emails {
        /// KEY=VALUE filters; limit, offset, page, order and order_dir control paging
        #[arg(value_parser = parse_key_value)]
        filters: Vec<(String, String)>,

        /// One line per email instead of JSON
        #[arg(short, long)]
        brief: bool,
    },

    /// Run HTTP API server mode
    #[cfg(feature = "server")]
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = DEFAULT_HOST)]
        host: String,

        /// Enable CORS for cross-origin requests
        #[arg(long)]
        cors: bool,

        /// Import MAIL_LOG before serving
        #[arg(long)]
        import: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// View effective configuration
    View,

    /// Validate configuration
    Validate,

    /// Generate an API token
    GenerateToken {
        /// Save the token as API_TOKEN in the .env file
        #[arg(short, long)]
        write: bool,
    },
}

/// `key=value`, split at the first `=`; the value may be empty
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
