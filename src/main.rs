mod cli;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Instant;

use cli::{Cli, Commands, ConfigCommands};
use postfix_parser::core::{list_documents, EnvFile, ImportError, Importer, QueryParams, Settings};
use postfix_parser::utils::constants::SENT_MAIL_TABLE;
use postfix_parser::utils::helpers::{format_bytes, truncate_string};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // A missing .env is fine; the process environment still applies
    let _ = dotenv::from_path(&cli.env_file);
    init_tracing();

    let settings = Settings::from_env().context("Failed to load settings from the environment")?;

    match cli.command {
        Commands::Parse { file, dry_run } => {
            handle_parse(&settings, file, dry_run).await?;
        }
        Commands::Emails { filters, brief } => {
            handle_emails(&settings, filters, brief).await?;
        }
        #[cfg(feature = "server")]
        Commands::Serve {
            port,
            host,
            cors,
            import,
        } => {
            handle_serve(settings, host, port, cors, import).await?;
        }
        Commands::Config { command } => {
            handle_config(&settings, &cli.env_file, command)?;
        }
    }

    Ok(())
}

fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn build_importer(settings: &Settings) -> Result<Importer> {
    let normalizer = settings
        .timestamp_normalizer()
        .context("Invalid LOG_TIMEZONE / LOG_YEAR")?;

    Ok(Importer::new(normalizer)
        .with_domain_filter(settings.domain_filter())
        .with_concurrency(settings.import_concurrency))
}

async fn handle_parse(settings: &Settings, file: Option<PathBuf>, dry_run: bool) -> Result<()> {
    let path = file.unwrap_or_else(|| settings.mail_log.clone());
    let importer = build_importer(settings)?;
    let started = Instant::now();

    let size = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
    println!("Parsing {} ({})", path.display(), format_bytes(size));

    if dry_run {
        let parsed = importer.import(&path)?;
        let (records, dropped) = importer.flatten(&parsed.messages);

        println!("\nDry run (nothing written)\n");
        println!("{:<20} {}", "Lines read", parsed.summary.lines_read);
        println!("{:<20} {}", "Lines matched", parsed.summary.lines_matched);
        println!("{:<20} {}", "Bad timestamps", parsed.summary.lines_skipped);
        println!("{:<20} {}", "Messages", parsed.summary.messages);
        println!("{:<20} {}", "Would save", records.len());
        println!("{:<20} {}", "Ignored domains", dropped);
        return Ok(());
    }

    let mut db = settings.database();
    let store = db.store().await.context("Failed to open the store")?;

    let result = importer.import_into(store.as_ref(), &path).await;
    db.close();

    let report = match result {
        Ok(report) => report,
        Err(ImportError::Batch(err)) => {
            println!("✗ {}", err);
            for (key, failure) in err.report.failures.iter().take(20) {
                println!("  - {}: {}", key, failure);
            }
            bail!("Import of {} finished with failures", path.display());
        }
        Err(e) => return Err(e).with_context(|| format!("Failed to import {}", path.display())),
    };

    println!("\n✓ Imported {} in {:.2?}\n", path.display(), started.elapsed());
    println!("{:<20} {}", "Lines read", report.summary.lines_read);
    println!("{:<20} {}", "Lines matched", report.summary.lines_matched);
    println!("{:<20} {}", "Bad timestamps", report.summary.lines_skipped);
    println!("{:<20} {}", "Messages", report.summary.messages);
    println!("{:<20} {}", "Ignored domains", report.dropped);
    println!("{:<20} {}", "Inserted", report.batch.inserted);
    println!("{:<20} {}", "Updated", report.batch.updated);

    Ok(())
}

async fn handle_emails(settings: &Settings, filters: Vec<(String, String)>, brief: bool) -> Result<()> {
    let params: QueryParams = filters.into_iter().collect();
    let db = settings.database();
    let store = db.store().await.context("Failed to open the store")?;

    let listing = list_documents(store.as_ref(), SENT_MAIL_TABLE, &params, &settings.page_limits()).await?;

    if !brief {
        let body = json!({
            "error": false,
            "result": listing.result,
            "count": listing.page.count,
            "remaining": listing.page.remaining,
            "page": listing.page.page,
            "total_pages": listing.page.total_pages,
        });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!(
        "{:<12} {:<22} {:<30} {:<30} {:<10}",
        "Queue ID", "Last attempt", "From", "To", "Status"
    );
    println!("{}", "-".repeat(108));

    for doc in &listing.result {
        let field = |key: &str| doc.get(key).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let status = doc
            .get("status")
            .and_then(|s| s.get("code"))
            .and_then(|c| c.as_str())
            .unwrap_or("-");

        println!(
            "{:<12} {:<22} {:<30} {:<30} {:<10}",
            field("id"),
            field("last_attempt"),
            truncate_string(&field("mail_from"), 30),
            truncate_string(&field("mail_to"), 30),
            status
        );
    }

    println!(
        "\nShowing {} of {} (page {} of {})",
        listing.result.len(),
        listing.page.count,
        listing.page.page,
        listing.page.total_pages
    );

    Ok(())
}

#[cfg(feature = "server")]
async fn handle_serve(settings: Settings, host: String, port: u16, cors: bool, import: bool) -> Result<()> {
    use postfix_parser::server::{self, AppState};

    for problem in settings.validate() {
        tracing::warn!("Configuration: {}", problem);
    }

    let state = AppState::new(settings);

    if import {
        let importer = build_importer(&state.settings)?;
        let store = state.db.store().await.context("Failed to open the store")?;
        let report = importer
            .import_into(store.as_ref(), &state.settings.mail_log)
            .await
            .context("Startup import failed")?;
        println!(
            "✓ Imported {} message(s) from {}",
            report.kept,
            state.settings.mail_log.display()
        );
    }

    server::run(host, port, cors, state).await
}

fn handle_config(settings: &Settings, env_file: &Path, command: ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::View => {
            println!("Configuration:\n");
            for (key, value) in settings.entries() {
                println!("{:<20} {}", key, value);
            }
        }
        ConfigCommands::Validate => {
            let errors = settings.validate();

            if errors.is_empty() {
                println!("✓ Configuration is valid");
            } else {
                println!("✗ Configuration errors:");
                for error in &errors {
                    println!("  - {}", error);
                }
                bail!("{} configuration error(s)", errors.len());
            }
        }
        ConfigCommands::GenerateToken { write } => {
            let mut env = EnvFile::load(env_file)?;
            let token = env.generate_api_token();

            if write {
                env.save()?;
                println!("✓ API_TOKEN written to {}", env_file.display());
            } else {
                println!("{}", token);
            }
        }
    }

    Ok(())
}
