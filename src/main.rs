// Command-line entry point for building and posting an event digest

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use event_digest_lib::analyzer::QualityAnalyzer;
use event_digest_lib::config::{AppConfig, Credentials};
use event_digest_lib::models::TimeRange;
use event_digest_lib::telegram::TelegramPoster;
use event_digest_lib::{run_digest, utils, DigestRequest};

#[derive(Debug, Parser)]
#[command(
    name = "event-digest",
    version,
    about = "Collects upcoming events and posts a scored digest to Telegram"
)]
struct Cli {
    /// Path to the JSON config (defaults to the user config directory).
    #[arg(long, env = "EVENT_DIGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Collection key (first configured collection when omitted).
    #[arg(long)]
    collection: Option<String>,

    /// Locality key or name (first configured locality when omitted).
    #[arg(long)]
    locality: Option<String>,

    /// today, tomorrow, week or month; anything else means week.
    #[arg(long, default_value = "week", value_parser = parse_period)]
    period: TimeRange,

    /// Print the digest instead of sending it.
    #[arg(long)]
    dry_run: bool,

    /// Print configured collections and localities, then exit.
    #[arg(long)]
    list: bool,
}

fn parse_period(raw: &str) -> Result<TimeRange, String> {
    Ok(TimeRange::parse_lenient(raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "event_digest=info,event_digest_lib=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(utils::config_path);
    let mut config = AppConfig::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    if cli.list {
        print_catalog(&config);
        return Ok(());
    }

    let credentials = Credentials::from_env().context("Failed to read credentials")?;
    config.apply_overrides(&credentials);

    // delivery credentials are checked before anything is fetched
    let poster = if cli.dry_run {
        None
    } else {
        Some(TelegramPoster::from_credentials(&credentials).context("Telegram is not configured")?)
    };
    let analyzer = QualityAnalyzer::from_config(&config.analysis, &credentials)
        .context("Failed to set up event analysis")?;
    if analyzer.is_none() {
        tracing::info!("event analysis skipped");
    }

    let request = DigestRequest {
        collection: cli.collection,
        locality: cli.locality,
        time_range: cli.period,
    };
    let digest = run_digest(&config, &request, analyzer.as_ref(), Utc::now()).await?;

    match poster {
        Some(poster) => {
            let sent = poster
                .deliver(&digest.chunks, digest.thread_id)
                .await
                .context("Failed to deliver digest")?;
            tracing::info!(sent, events = digest.events.len(), "digest posted");
        }
        None => {
            for (idx, chunk) in digest.chunks.iter().enumerate() {
                if idx > 0 {
                    println!("\n----- chunk {} -----\n", idx + 1);
                }
                println!("{chunk}");
            }
        }
    }

    Ok(())
}

fn print_catalog(config: &AppConfig) {
    println!("Collections:");
    for collection in &config.collections {
        println!(
            "  {:<16} {} (up to {})",
            collection.key, collection.name, collection.max_count
        );
    }
    println!("Localities:");
    for locality in &config.localities {
        let thread = locality
            .thread_id
            .map(|id| format!(" thread {id}"))
            .unwrap_or_default();
        println!(
            "  {:<16} {} [{}]{}",
            locality.key, locality.name, locality.timezone, thread
        );
    }
}
