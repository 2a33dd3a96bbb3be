use clap::Args;
use serde_json::Value;
use tracing::debug;

use quant_invest_core::pipeline::{run_pipeline, PipelineConfig, PipelineInput};
use quant_invest_core::statistics::estimator::MissingPricePolicy;

use crate::commands::screen::screening_request;
use crate::input;

/// Arguments for the screen-then-optimize pipeline
#[derive(Args)]
pub struct PipelineArgs {
    /// Fundamental metrics JSON: an array of candidates or {"candidates": [...]}
    #[arg(long, requires = "prices")]
    pub metrics: Option<String>,

    /// Price history: CSV with a leading date column, or price matrix JSON
    #[arg(long)]
    pub prices: Option<String>,

    /// Full pipeline request as JSON (candidates, prices, config)
    #[arg(long, conflicts_with_all = ["metrics", "prices"])]
    pub input: Option<String>,

    /// Configuration file (.yaml or .json)
    #[arg(long)]
    pub config: Option<String>,

    /// Number of screened candidates passed to the optimizer
    #[arg(long)]
    pub top_n: Option<usize>,

    /// Risk-free rate (annualised)
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,

    /// Minimum number of price rows required to optimize
    #[arg(long)]
    pub min_observations: Option<usize>,

    /// Forward-fill price gaps instead of dropping incomplete return rows
    #[arg(long)]
    pub forward_fill: bool,
}

/// Load a pipeline configuration file, or the defaults when none is given.
pub fn load_config(path: Option<&str>) -> Result<PipelineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            let config: PipelineConfig = input::file::read_config(p)?;
            debug!(path = p, ?config, "loaded configuration");
            Ok(config)
        }
        None => Ok(PipelineConfig::default()),
    }
}

pub fn run_pipeline_command(args: PipelineArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut request: PipelineInput = if let Some(ref path) = args.input {
        input::file::read_json(path)?
    } else if let (Some(metrics), Some(prices)) = (&args.metrics, &args.prices) {
        let screening = screening_request(input::file::read_json_value(metrics)?)?;
        PipelineInput {
            candidates: screening.candidates,
            prices: input::prices::read_prices(prices)?,
            config: load_config(args.config.as_deref())?,
        }
    } else if let Some(request) = input::stdin::read_stdin()? {
        request
    } else {
        return Err(
            "--metrics <file.json> with --prices <file>, --input <file.json> or stdin required"
                .into(),
        );
    };

    if let Some(top_n) = args.top_n {
        request.config.top_n = top_n;
    }
    if let Some(rf) = args.risk_free_rate {
        request.config.risk_free_rate = rf;
    }
    if let Some(min_observations) = args.min_observations {
        request.config.min_observations = min_observations;
    }
    if args.forward_fill {
        request.config.missing_price_policy = MissingPricePolicy::ForwardFill;
    }

    let result = run_pipeline(&request)?;
    Ok(serde_json::to_value(result)?)
}
