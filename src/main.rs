use anyhow::Result;
use barrage::config::{MethodMode, Settings};
use barrage::engine::Engine;
use barrage::report::{Header, Report};
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "barrage", version, about = barrage::report::BANNER)]
struct Cli {
    /// Target URL, e.g. https://example.com/api/submit
    url: Option<String>,

    /// Number of concurrent workers [default: 50]
    #[arg(short, long)]
    workers: Option<usize>,

    /// Requests per cycle per worker [default: 350]
    #[arg(short, long)]
    sockets: Option<usize>,

    /// HTTP method [default: post]
    #[arg(short, long, value_enum)]
    method: Option<MethodMode>,

    /// Test duration in seconds; runs until Ctrl-C when omitted
    #[arg(short, long)]
    duration: Option<u64>,

    /// Max requests per second per worker [default: 10000]
    #[arg(short, long)]
    rate_limit: Option<u32>,

    /// Exercise the request logic without sending anything
    #[arg(long, overrides_with = "no_dry_run")]
    dry_run: bool,

    /// Send real requests even if the config file asks for a dry run
    #[arg(long, overrides_with = "dry_run")]
    no_dry_run: bool,

    /// Per-request timeout in seconds [default: 15]
    #[arg(long)]
    timeout: Option<u64>,

    /// Log live statistics every N seconds
    #[arg(long)]
    progress: Option<u64>,

    /// TOML file with run settings; command-line flags take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the final statistics as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn settings(&self) -> Settings {
        Settings {
            url: self.url.clone(),
            workers: self.workers,
            sockets: self.sockets,
            method: self.method,
            rate_limit: self.rate_limit,
            duration_seconds: self.duration,
            dry_run: match (self.dry_run, self.no_dry_run) {
                (true, _) => Some(true),
                (_, true) => Some(false),
                _ => None,
            },
            timeout_seconds: self.timeout,
            progress_seconds: self.progress,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("barrage=info")),
        )
        .init();

    let cli = Cli::parse();

    let file_settings = match &cli.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            Settings::from_file(path)?
        }
        None => Settings::default(),
    };
    let config = file_settings.merge(cli.settings()).resolve()?;

    println!("{}", Header(&config));

    let engine = Engine::new(config.clone());
    let stop = engine.stop_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                stop.stop();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let snapshot = engine.run().await?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!(
            "{}",
            Report {
                config: &config,
                snapshot: &snapshot,
            }
        );
    }

    Ok(())
}
