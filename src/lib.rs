pub mod cli;
pub mod core;
pub mod providers;
pub mod store;
pub mod transport;

use crate::core::config::AppConfig;
use crate::core::fund::HistoryPeriod;
use crate::providers::FundService;
use crate::store::KeyValueStore;
use anyhow::{Context, Result};
use tracing::{debug, info};

pub enum AppCommand {
    Summary,
    Alloc,
    Realtime { codes: Vec<String> },
    Holdings { code: String, refresh: bool },
    Quotes { codes: Vec<String> },
    Search { keyword: String },
    History { code: String, period: HistoryPeriod },
    Benchmark { index: String, period: HistoryPeriod },
    Compare {
        period: HistoryPeriod,
        benchmark: Option<String>,
    },
    ClearCache { code: Option<String> },
}

fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    match config_path {
        Some(path) => AppConfig::load_from_path(path),
        None => match AppConfig::default_config_path() {
            Ok(path) if path.exists() => AppConfig::load_from_path(path),
            _ => {
                debug!("No configuration file found, using defaults");
                Ok(AppConfig::default())
            }
        },
    }
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    info!("fundpulse starting...");

    let config = load_config(config_path)?;
    debug!("Loaded config: {config:#?}");

    let data_path = config.default_data_path()?;
    let store = KeyValueStore::open(&data_path);
    let service = FundService::new(config.service_options(), &store)
        .context("Failed to create HTTP client")?;
    let max_concurrent = config.requests.max_concurrent;

    match command {
        AppCommand::Summary => cli::summary::run(&service, &config).await,
        AppCommand::Alloc => cli::alloc::run(&service, &config).await,
        AppCommand::Realtime { codes } => cli::realtime::run(&service, &codes, max_concurrent).await,
        AppCommand::Holdings { code, refresh } => cli::holdings::run(&service, &code, refresh).await,
        AppCommand::Quotes { codes } => cli::quotes::run(&service, &codes).await,
        AppCommand::Search { keyword } => cli::search::run(&service, &keyword).await,
        AppCommand::History { code, period } => {
            cli::history::run_fund(&service, &code, period).await
        }
        AppCommand::Benchmark { index, period } => {
            cli::history::run_benchmark(&service, &index, period).await
        }
        AppCommand::Compare { period, benchmark } => {
            let benchmark = benchmark.unwrap_or_else(|| config.benchmark.clone());
            cli::compare::run(&service, &config.funds, &benchmark, period).await
        }
        AppCommand::ClearCache { code } => cli::cache::clear(&service, code.as_deref()),
    }
}
