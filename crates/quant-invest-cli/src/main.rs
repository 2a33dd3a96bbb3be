mod commands;
mod input;
mod output;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::metrics::MetricsArgs;
use commands::optimize::OptimizeArgs;
use commands::pipeline::PipelineArgs;
use commands::screen::ScreenArgs;

/// Fundamental screening and max-Sharpe portfolio allocation
#[derive(Parser)]
#[command(
    name = "qif",
    version,
    about = "Fundamental screening and max-Sharpe portfolio allocation",
    long_about = "Screens a stock universe on ROE, debt/equity, profit margin and PEG, \
                  then allocates across the survivors by maximizing the Sharpe ratio \
                  under long-only, fully invested constraints."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Max-Sharpe allocation from a price history
    Optimize(OptimizeArgs),
    /// Screen and rank candidates on fundamentals
    Screen(ScreenArgs),
    /// Volatility, Sharpe, beta and trend indicators for one asset
    Metrics(MetricsArgs),
    /// Screen candidates, then optimize the survivors
    Pipeline(PipelineArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Screen(args) => commands::screen::run_screen(args),
        Commands::Metrics(args) => commands::metrics::run_metrics(args),
        Commands::Pipeline(args) => commands::pipeline::run_pipeline_command(args),
        Commands::Version => {
            println!("qif {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
