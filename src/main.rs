use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use fundpulse::core::fund::HistoryPeriod;
use fundpulse::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

impl From<Commands> for fundpulse::AppCommand {
    fn from(cmd: Commands) -> fundpulse::AppCommand {
        match cmd {
            Commands::Summary => fundpulse::AppCommand::Summary,
            Commands::Alloc => fundpulse::AppCommand::Alloc,
            Commands::Realtime { codes } => fundpulse::AppCommand::Realtime { codes },
            Commands::Holdings { code, refresh } => {
                fundpulse::AppCommand::Holdings { code, refresh }
            }
            Commands::Quotes { codes } => fundpulse::AppCommand::Quotes { codes },
            Commands::Search { keyword } => fundpulse::AppCommand::Search { keyword },
            Commands::History { code, period } => fundpulse::AppCommand::History { code, period },
            Commands::Benchmark { index, period } => {
                fundpulse::AppCommand::Benchmark { index, period }
            }
            Commands::Compare { period, benchmark } => {
                fundpulse::AppCommand::Compare { period, benchmark }
            }
            Commands::ClearCache { code } => fundpulse::AppCommand::ClearCache { code },
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Display valuations and profit of the configured funds
    Summary,
    /// Display how the configured funds spread across sectors
    Alloc,
    /// Display live valuation estimates
    Realtime {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Display the top stock holdings of a fund
    Holdings {
        code: String,
        /// Ignore cached holdings
        #[arg(short, long)]
        refresh: bool,
    },
    /// Display stock quotes
    Quotes {
        #[arg(required = true)]
        codes: Vec<String>,
    },
    /// Search funds by code, name or pinyin
    Search { keyword: String },
    /// Display the NAV history of a fund
    History {
        code: String,
        /// One of 1d, 5d, 1m, 3m, 1y, 3y
        #[arg(short, long, default_value = "1m")]
        period: HistoryPeriod,
    },
    /// Display the daily history of an index
    Benchmark {
        index: String,
        #[arg(short, long, default_value = "1m")]
        period: HistoryPeriod,
    },
    /// Compare portfolio returns with an index
    Compare {
        #[arg(short, long, default_value = "3m")]
        period: HistoryPeriod,
        /// Index code, defaults to the configured benchmark
        #[arg(short, long)]
        benchmark: Option<String>,
    },
    /// Clear cached holdings and history
    ClearCache { code: Option<String> },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Setup) => match cli.config_path.as_deref() {
            Some(path) => fundpulse::cli::setup::setup_at_path(path),
            None => fundpulse::cli::setup::setup(),
        },
        Some(cmd) => fundpulse::run_command(cmd.into(), cli.config_path.as_deref()).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}
