use napi::Result as NapiResult;
use napi_derive::napi;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

// ---------------------------------------------------------------------------
// Optimization
// ---------------------------------------------------------------------------

#[napi]
pub fn optimize_sharpe_portfolio(input_json: String) -> NapiResult<String> {
    let input: quant_invest_core::optimization::SharpeOptimizationInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = quant_invest_core::optimization::optimize_sharpe_portfolio(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn return_metrics(input_json: String) -> NapiResult<String> {
    let input: quant_invest_core::statistics::metrics::ReturnMetricsInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = quant_invest_core::statistics::metrics::calculate_return_metrics(&input)
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Screening
// ---------------------------------------------------------------------------

#[napi]
pub fn screen_universe(input_json: String) -> NapiResult<String> {
    let input: quant_invest_core::screening::ScreeningInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output =
        quant_invest_core::screening::screen_universe(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

#[napi]
pub fn run_pipeline(input_json: String) -> NapiResult<String> {
    let input: quant_invest_core::pipeline::PipelineInput =
        serde_json::from_str(&input_json).map_err(to_napi_error)?;
    let output = quant_invest_core::pipeline::run_pipeline(&input).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
