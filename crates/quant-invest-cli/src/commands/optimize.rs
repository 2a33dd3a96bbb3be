use clap::Args;
use serde_json::Value;

use quant_invest_core::market_data::PriceMatrix;
use quant_invest_core::optimization::{optimize_sharpe_portfolio, SharpeOptimizationInput};
use quant_invest_core::statistics::estimator::MissingPricePolicy;

use crate::commands::pipeline::load_config;
use crate::input;

/// Arguments for max-Sharpe optimization
#[derive(Args)]
pub struct OptimizeArgs {
    /// Price history: CSV with a leading date column, or price matrix JSON
    #[arg(long)]
    pub prices: Option<String>,

    /// Full optimization request as JSON
    #[arg(long, conflicts_with = "prices")]
    pub input: Option<String>,

    /// Configuration file (.yaml or .json)
    #[arg(long)]
    pub config: Option<String>,

    /// Risk-free rate (annualised)
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,

    /// Solver iteration cap
    #[arg(long)]
    pub max_iterations: Option<u32>,

    /// Function-value tolerance for convergence
    #[arg(long)]
    pub ftol: Option<f64>,

    /// Forward-fill price gaps instead of dropping incomplete return rows
    #[arg(long)]
    pub forward_fill: bool,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: SharpeOptimizationInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let Some(ref path) = args.prices {
        request_from_prices(input::prices::read_prices(path)?, args.config.as_deref())?
    } else if let Some(text) = input::stdin::read_stdin_text()? {
        // Piped input is either a full JSON request or a price CSV.
        if text.starts_with('{') {
            serde_json::from_str(&text)?
        } else {
            let prices = input::prices::parse_price_csv(text.as_bytes())?;
            request_from_prices(prices, args.config.as_deref())?
        }
    } else {
        return Err(
            "--prices <file.csv|file.json>, --input <file.json> or stdin required for optimization"
                .into(),
        );
    };

    if let Some(rf) = args.risk_free_rate {
        request.risk_free_rate = rf;
    }
    if let Some(max_iterations) = args.max_iterations {
        request.solver.max_iterations = max_iterations;
    }
    if let Some(ftol) = args.ftol {
        request.solver.ftol = ftol;
    }
    if args.forward_fill {
        request.missing_price_policy = MissingPricePolicy::ForwardFill;
    }

    let result = optimize_sharpe_portfolio(&request)?;
    Ok(serde_json::to_value(result)?)
}

fn request_from_prices(
    prices: PriceMatrix,
    config_path: Option<&str>,
) -> Result<SharpeOptimizationInput, Box<dyn std::error::Error>> {
    let config = load_config(config_path)?;
    Ok(SharpeOptimizationInput {
        prices,
        risk_free_rate: config.risk_free_rate,
        solver: config.solver,
        missing_price_policy: config.missing_price_policy,
    })
}
