use clap::Args;
use serde_json::Value;

use quant_invest_core::statistics::metrics::{calculate_return_metrics, ReturnMetricsInput};

use crate::input;

/// Arguments for single-asset return metrics
#[derive(Args)]
pub struct MetricsArgs {
    /// Price history: CSV with a leading date column, or price matrix JSON
    #[arg(long)]
    pub prices: Option<String>,

    /// Full metrics request as JSON
    #[arg(long, conflicts_with = "prices")]
    pub input: Option<String>,

    /// Asset column to analyse
    #[arg(long)]
    pub asset: Option<String>,

    /// Benchmark column for beta
    #[arg(long)]
    pub market: Option<String>,

    /// Risk-free rate (annualised)
    #[arg(long, default_value = "0.02", allow_hyphen_values = true)]
    pub risk_free_rate: f64,

    /// Simple moving average window
    #[arg(long, default_value = "200")]
    pub sma_period: usize,

    /// RSI window
    #[arg(long, default_value = "14")]
    pub rsi_period: usize,

    /// Largest lag (exclusive) for the Hurst exponent fit
    #[arg(long, default_value = "20")]
    pub hurst_max_lag: usize,
}

pub fn run_metrics(args: MetricsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ReturnMetricsInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(ref path) = args.prices {
        let asset = args
            .asset
            .clone()
            .ok_or("--asset <id> required with --prices")?;
        ReturnMetricsInput {
            prices: input::prices::read_prices(path)?,
            asset,
            market: args.market.clone(),
            risk_free_rate: args.risk_free_rate,
            sma_period: args.sma_period,
            rsi_period: args.rsi_period,
            hurst_max_lag: args.hurst_max_lag,
        }
    } else if let Some(request) = input::stdin::read_stdin()? {
        request
    } else {
        return Err("--prices <file> with --asset, --input <file.json> or stdin required".into());
    };

    let result = calculate_return_metrics(&request)?;
    Ok(serde_json::to_value(result)?)
}
