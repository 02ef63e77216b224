//! Refreshes cached aggregates from the command line.
//!
//! Refetches every source of the selected aggregators and rewrites their
//! cached aggregates, the same work a background schedule performs.

use clap::Parser;
use fedagg_server::config;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "fedagg-refresh", version, about = "Refresh cached metadata aggregates")]
struct Args {
    /// Configuration file; defaults to $FEDAGG_CONFIG_PATH, then config.toml.
    #[arg(long)]
    config: Option<String>,

    /// Refresh every aggregator whose cron_tag equals TAG.
    #[arg(long, conflicts_with = "ids")]
    tag: Option<String>,

    /// Aggregator ids to refresh. Without ids or --tag, all are refreshed.
    ids: Vec<String>,
}

impl Args {
    fn config_path(&self) -> String {
        self.config
            .clone()
            .or_else(|| {
                std::env::var("FEDAGG_CONFIG_PATH")
                    .ok()
                    .filter(|p| !p.trim().is_empty())
            })
            .unwrap_or_else(|| "config.toml".to_string())
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let path = args.config_path();

    let config = match config::load_config(Some(&path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fedagg-refresh: {path}: {e}");
            return ExitCode::FAILURE;
        }
    };

    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let store = match config.open_cache_store() {
        Ok(store) => store,
        Err(e) => {
            eprintln!("fedagg-refresh: cache: {e}");
            return ExitCode::FAILURE;
        }
    };
    let registry = config.registry(store);

    let ids: Vec<String> = match (&args.tag, args.ids.is_empty()) {
        (Some(tag), _) => registry.ids_for_tag(tag),
        (None, false) => args.ids.clone(),
        (None, true) => registry.ids().map(str::to_string).collect(),
    };
    if ids.is_empty() {
        eprintln!("fedagg-refresh: no aggregators selected");
        return ExitCode::SUCCESS;
    }

    let summary = registry.refresh(&ids).await;
    for id in &summary.refreshed {
        println!("refreshed {id}");
    }
    for (id, error) in &summary.failed {
        println!("FAILED {id}: {error}");
    }

    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
