//! Command-line interface for portfolio backtests.

use chartfolio::analytics::ResultFormatter;
use chartfolio::chart::{ChartPayload, IndexBase, JsonRenderer};
use chartfolio::config::ChartfolioConfig;
use chartfolio::error::{BacktestError, Result};
use chartfolio::pipeline::{BacktestReport, BacktestService};
use chartfolio::provider::ProviderClient;
use chartfolio::window::{check_lookback, resolve_window};

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Chartfolio - buy-and-hold portfolio backtests on live market data.
#[derive(Parser)]
#[command(name = "chartfolio")]
#[command(version)]
#[command(about = "Backtest equal-weight and weighted portfolios on live market data")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Path to a TOML configuration file
    #[arg(short, long, env = "CHARTFOLIO_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backtest an equal-weight, fully invested portfolio
    EwPort {
        /// Symbols to hold
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Lookback window, e.g. 30d, 12w, 6m, 2y
        #[arg(short, long, default_value = "1y")]
        window: String,

        /// Write the chart payload to this path
        #[arg(long)]
        chart_out: Option<PathBuf>,
    },

    /// Backtest a weighted portfolio: SYM1 W1 SYM2 W2 ... WINDOW
    Port {
        /// Symbol/weight pairs followed by the window
        #[arg(required = true, num_args = 1.., allow_negative_numbers = true)]
        tokens: Vec<String>,

        /// Write the chart payload to this path
        #[arg(long)]
        chart_out: Option<PathBuf>,
    },

    /// Chart one symbol's closes at a bar interval
    Chart {
        /// Symbol to chart
        symbol: String,

        /// Bar interval: 1m, 5m, 15m, 1h or 1d
        #[arg(short, long, default_value = "1d")]
        interval: String,

        /// Window such as 5d, 3m or 2y; defaults per interval
        #[arg(short, long)]
        window: Option<String>,

        /// Write the chart payload to this path
        #[arg(long)]
        chart_out: Option<PathBuf>,
    },

    /// Chart several symbols together (percent change beyond two)
    Compare {
        /// Symbols to compare
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Bar interval: 1m, 5m, 15m, 1h or 1d
        #[arg(short, long, default_value = "1d")]
        interval: String,

        /// Window such as 5d, 3m or 2y; defaults per interval
        #[arg(short, long)]
        window: Option<String>,

        /// Write the chart payload to this path
        #[arg(long)]
        chart_out: Option<PathBuf>,
    },

    /// Chart several symbols indexed to a common start
    Index {
        /// Symbols to index
        #[arg(required = true)]
        symbols: Vec<String>,

        /// Bar interval: 1m, 5m, 15m, 1h or 1d
        #[arg(short, long, default_value = "1d")]
        interval: String,

        /// Window such as 5d, 3m or 2y; defaults per interval
        #[arg(short, long)]
        window: Option<String>,

        /// Start every line at 1.0 instead of 100
        #[arg(long)]
        base_one: bool,

        /// Write the chart payload to this path
        #[arg(long)]
        chart_out: Option<PathBuf>,
    },

    /// Show how a window token resolves
    Window {
        /// Window token, e.g. 90d
        token: String,
    },

    /// Create an example configuration file
    Init {
        /// Output path for config file
        #[arg(short, long, default_value = "chartfolio.toml")]
        output: PathBuf,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        if tracing::subscriber::set_global_default(subscriber).is_err() {
            eprintln!("tracing subscriber already installed");
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Run the CLI application.
async fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::EwPort {
            symbols,
            window,
            chart_out,
        } => {
            let config = ChartfolioConfig::load_or_default(cli.config.as_deref())?;
            let lookback = resolve_window(window)?;
            let service = build_service(&config)?;
            check_lookback(service.settings().interval, lookback.target_days)?;

            let report = service.equal_weight(symbols.as_slice(), window).await?;
            emit(&service, &report, cli.output, chart_out.as_deref())
        }

        Commands::Port { tokens, chart_out } => {
            let config = ChartfolioConfig::load_or_default(cli.config.as_deref())?;
            let spec = chartfolio::parser::parse_weighted_tokens(tokens.as_slice())?;
            let lookback = resolve_window(&spec.window)?;
            let service = build_service(&config)?;
            check_lookback(service.settings().interval, lookback.target_days)?;

            let report = service.weighted_spec(&spec).await?;
            emit(&service, &report, cli.output, chart_out.as_deref())
        }

        Commands::Chart {
            symbol,
            interval,
            window,
            chart_out,
        } => {
            let config = ChartfolioConfig::load_or_default(cli.config.as_deref())?;
            let service = build_service(&config)?;

            let payload = service
                .chart_symbol(symbol, interval, window.as_deref().unwrap_or(""))
                .await?;
            emit_chart(&service, &payload, cli.output, chart_out.as_deref())
        }

        Commands::Compare {
            symbols,
            interval,
            window,
            chart_out,
        } => {
            let config = ChartfolioConfig::load_or_default(cli.config.as_deref())?;
            let service = build_service(&config)?;

            let payload = service
                .chart_comparison(symbols.as_slice(), interval, window.as_deref().unwrap_or(""))
                .await?;
            emit_chart(&service, &payload, cli.output, chart_out.as_deref())
        }

        Commands::Index {
            symbols,
            interval,
            window,
            base_one,
            chart_out,
        } => {
            let config = ChartfolioConfig::load_or_default(cli.config.as_deref())?;
            let service = build_service(&config)?;
            let base = if *base_one { IndexBase::One } else { IndexBase::Hundred };

            let payload = service
                .chart_indexed(symbols.as_slice(), interval, window.as_deref().unwrap_or(""), base)
                .await?;
            emit_chart(&service, &payload, cli.output, chart_out.as_deref())
        }

        Commands::Window { token } => show_window(token, cli.output),

        Commands::Init { output } => init_config(output),
    }
}

/// Wire a provider-backed service, cancelled on Ctrl-C.
fn build_service(config: &ChartfolioConfig) -> Result<BacktestService> {
    let settings = config.to_service_settings()?;

    let token = CancellationToken::new();
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling request");
            on_signal.cancel();
        }
    });

    let client = ProviderClient::new(config.to_provider_config())?.with_cancellation(token.clone());

    Ok(BacktestService::new(
        Arc::new(client),
        config.build_cache(),
        Arc::new(JsonRenderer),
        settings,
    )
    .with_cancellation(token))
}

fn emit(
    service: &BacktestService,
    report: &BacktestReport,
    output: OutputFormat,
    chart_out: Option<&Path>,
) -> Result<()> {
    match output {
        OutputFormat::Text => ResultFormatter::print_report(report),
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(report)?),
    }

    if let Some(path) = chart_out {
        let bytes = service.render(report)?;
        fs::write(path, bytes)?;
        info!("Chart payload written to {}", path.display());
    }

    Ok(())
}

fn emit_chart(
    service: &BacktestService,
    payload: &ChartPayload,
    output: OutputFormat,
    chart_out: Option<&Path>,
) -> Result<()> {
    match output {
        OutputFormat::Text => ResultFormatter::print_chart(payload),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(payload)?),
    }

    if let Some(path) = chart_out {
        fs::write(path, service.render_chart(payload)?)?;
        info!("Chart payload written to {}", path.display());
    }

    Ok(())
}

fn show_window(token: &str, output: OutputFormat) -> Result<()> {
    let lookback = resolve_window(token)?;
    match output {
        OutputFormat::Text => {
            println!("{:<8} {}", "Range:".bold(), lookback.range);
            println!("{:<8} {}", "Days:".bold(), lookback.target_days);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&lookback)?),
    }
    Ok(())
}

fn init_config(output: &Path) -> Result<()> {
    if output.exists() {
        return Err(BacktestError::ConfigError(format!(
            "refusing to overwrite existing file: {}",
            output.display()
        )));
    }
    fs::write(output, ChartfolioConfig::example())?;
    println!("Created example configuration file: {}", output.display());
    Ok(())
}
