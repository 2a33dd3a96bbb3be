use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::error::QuantInvestError;
use crate::market_data::PriceMatrix;
use crate::optimization::objective::NegativeSharpe;
use crate::optimization::slsqp::{minimize_on_simplex, SolverSettings};
use crate::statistics::estimator::{estimate_returns, MissingPricePolicy, ReturnEstimates};
use crate::types::{with_metadata_f64, AnnualRate, AssetId, ComputationOutput};
use crate::QuantInvestResult;

/// Single-name weight above which the output carries a concentration warning.
const CONCENTRATION_WARNING: f64 = 0.40;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetWeight {
    pub asset: AssetId,
    pub weight: f64,
}

/// Long-only, fully invested weights with the portfolio statistics they imply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub weights: Vec<AssetWeight>,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

impl Allocation {
    fn evaluate(assets: &[AssetId], weights: &[f64], objective: &NegativeSharpe<'_>) -> Self {
        Allocation {
            weights: assets
                .iter()
                .zip(weights.iter())
                .map(|(asset, weight)| AssetWeight {
                    asset: asset.clone(),
                    weight: *weight,
                })
                .collect(),
            expected_return: objective.portfolio_return(weights),
            volatility: objective.portfolio_volatility(weights),
            sharpe_ratio: objective.sharpe_ratio(weights),
        }
    }

    pub fn weight(&self, asset: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.asset == asset)
            .map(|w| w.weight)
    }

    pub fn to_map(&self) -> BTreeMap<AssetId, f64> {
        self.weights
            .iter()
            .map(|w| (w.asset.clone(), w.weight))
            .collect()
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.iter().map(|w| w.weight).sum()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    /// Herfindahl-Hirschman index of the weights.
    pub fn concentration(&self) -> f64 {
        self.weights.iter().map(|w| w.weight * w.weight).sum()
    }
}

/// Why the solver result was replaced by equal weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FallbackReason {
    ConvergenceFailure { iterations: u32, detail: String },
    NumericalDegeneracy { detail: String },
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::ConvergenceFailure { iterations, detail } => {
                write!(f, "no convergence after {} iterations ({})", iterations, detail)
            }
            FallbackReason::NumericalDegeneracy { detail } => {
                write!(f, "numerical degeneracy ({})", detail)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoRecommendationReason {
    /// No price history has been supplied.
    NoPriceData,
    /// Fewer than two assets survive cleaning.
    InsufficientAssets,
    /// Fewer than two complete return observations.
    InsufficientObservations,
}

impl fmt::Display for NoRecommendationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            NoRecommendationReason::NoPriceData => "no price data loaded",
            NoRecommendationReason::InsufficientAssets => "fewer than two assets",
            NoRecommendationReason::InsufficientObservations => {
                "fewer than two complete return observations"
            }
        };
        f.write_str(text)
    }
}

/// Result of one max-Sharpe run. A fallback is always labelled as such.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AllocationOutcome {
    Optimized {
        allocation: Allocation,
        iterations: u32,
    },
    Fallback {
        allocation: Allocation,
        reason: FallbackReason,
    },
    NoRecommendation {
        reason: NoRecommendationReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    Optimized,
    Fallback,
    NoRecommendation,
}

impl AllocationOutcome {
    pub fn allocation(&self) -> Option<&Allocation> {
        match self {
            AllocationOutcome::Optimized { allocation, .. }
            | AllocationOutcome::Fallback { allocation, .. } => Some(allocation),
            AllocationOutcome::NoRecommendation { .. } => None,
        }
    }

    /// Asset to weight mapping; empty when there is no recommendation.
    pub fn weights(&self) -> BTreeMap<AssetId, f64> {
        self.allocation().map(Allocation::to_map).unwrap_or_default()
    }

    pub fn status(&self) -> OptimizationStatus {
        match self {
            AllocationOutcome::Optimized { .. } => OptimizationStatus::Optimized,
            AllocationOutcome::Fallback { .. } => OptimizationStatus::Fallback,
            AllocationOutcome::NoRecommendation { .. } => OptimizationStatus::NoRecommendation,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, AllocationOutcome::Fallback { .. })
    }
}

// ---------------------------------------------------------------------------
// Max-Sharpe optimization
// ---------------------------------------------------------------------------

/// Maximize the Sharpe ratio over long-only, fully invested weights.
///
/// Starts from equal weights. A solver failure degrades to equal weights
/// labelled as a fallback. Empty estimates give no recommendation. Only
/// malformed settings or a non-finite risk-free rate are errors.
pub fn optimize_max_sharpe(
    estimates: &ReturnEstimates,
    risk_free_rate: AnnualRate,
    settings: &SolverSettings,
) -> QuantInvestResult<AllocationOutcome> {
    settings.validate()?;
    if !risk_free_rate.is_finite() {
        return Err(QuantInvestError::invalid(
            "risk_free_rate",
            "Must be a finite number",
        ));
    }

    if estimates.is_empty() {
        let reason = if estimates.assets.len() < 2 {
            NoRecommendationReason::InsufficientAssets
        } else {
            NoRecommendationReason::InsufficientObservations
        };
        debug!(%reason, "no allocation recommended");
        return Ok(AllocationOutcome::NoRecommendation { reason });
    }

    let n = estimates.n_assets();
    let objective = NegativeSharpe::from_estimates(estimates, risk_free_rate);
    let initial = equal_weights(n);

    let outcome = match minimize_on_simplex(&objective, &initial, settings) {
        Ok(report) => match clip_and_normalize(&report.weights) {
            Some(weights) => AllocationOutcome::Optimized {
                allocation: Allocation::evaluate(&estimates.assets, &weights, &objective),
                iterations: report.iterations,
            },
            None => fallback(
                estimates,
                &objective,
                FallbackReason::NumericalDegeneracy {
                    detail: "solver weights carry no positive mass".into(),
                },
            ),
        },
        Err(QuantInvestError::ConvergenceFailure {
            function,
            iterations,
            ..
        }) => fallback(
            estimates,
            &objective,
            FallbackReason::ConvergenceFailure {
                iterations,
                detail: function,
            },
        ),
        Err(e) => fallback(
            estimates,
            &objective,
            FallbackReason::NumericalDegeneracy {
                detail: e.to_string(),
            },
        ),
    };
    Ok(outcome)
}

fn fallback(
    estimates: &ReturnEstimates,
    objective: &NegativeSharpe<'_>,
    reason: FallbackReason,
) -> AllocationOutcome {
    warn!(%reason, assets = estimates.n_assets(), "falling back to equal weights");
    AllocationOutcome::Fallback {
        allocation: Allocation::evaluate(
            &estimates.assets,
            &equal_weights(estimates.n_assets()),
            objective,
        ),
        reason,
    }
}

fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Clip negatives to zero and rescale to a unit sum. Weights already on the
/// simplex to within rounding are returned untouched.
fn clip_and_normalize(weights: &[f64]) -> Option<Vec<f64>> {
    if weights.iter().any(|w| !w.is_finite()) {
        return None;
    }
    let clipped: Vec<f64> = weights.iter().map(|w| w.max(0.0)).collect();
    let total: f64 = clipped.iter().sum();
    if total <= 0.0 {
        return None;
    }
    let moved = clipped.iter().zip(weights.iter()).any(|(c, w)| c != w);
    if !moved && (total - 1.0).abs() <= f64::EPSILON * weights.len() as f64 {
        return Some(clipped);
    }
    Some(clipped.iter().map(|w| w / total).collect())
}

// ---------------------------------------------------------------------------
// Stateful optimizer
// ---------------------------------------------------------------------------

/// Lifecycle of a [`PortfolioOptimizer`].
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerState {
    Uninitialized,
    Ready {
        estimates: ReturnEstimates,
    },
    Optimized {
        estimates: ReturnEstimates,
        outcome: AllocationOutcome,
    },
}

/// Holds return estimates between a price load and one or more solves.
///
/// Loading prices moves the optimizer to `Ready` from any state; optimizing
/// from `Ready` or `Optimized` records the latest outcome. Optimizing before
/// any prices are loaded yields no recommendation and leaves the state alone.
#[derive(Debug, Clone)]
pub struct PortfolioOptimizer {
    settings: SolverSettings,
    policy: MissingPricePolicy,
    state: OptimizerState,
}

impl Default for PortfolioOptimizer {
    fn default() -> Self {
        PortfolioOptimizer {
            settings: SolverSettings::default(),
            policy: MissingPricePolicy::default(),
            state: OptimizerState::Uninitialized,
        }
    }
}

impl PortfolioOptimizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(
        settings: SolverSettings,
        policy: MissingPricePolicy,
    ) -> QuantInvestResult<Self> {
        settings.validate()?;
        Ok(PortfolioOptimizer {
            settings,
            policy,
            state: OptimizerState::Uninitialized,
        })
    }

    pub fn set_prices(&mut self, prices: &PriceMatrix) {
        let estimates = estimate_returns(prices, self.policy);
        self.state = OptimizerState::Ready { estimates };
    }

    pub fn optimize(&mut self, risk_free_rate: AnnualRate) -> QuantInvestResult<AllocationOutcome> {
        let estimates = match &self.state {
            OptimizerState::Uninitialized => {
                return Ok(AllocationOutcome::NoRecommendation {
                    reason: NoRecommendationReason::NoPriceData,
                })
            }
            OptimizerState::Ready { estimates } | OptimizerState::Optimized { estimates, .. } => {
                estimates.clone()
            }
        };
        let outcome = optimize_max_sharpe(&estimates, risk_free_rate, &self.settings)?;
        self.state = OptimizerState::Optimized {
            estimates,
            outcome: outcome.clone(),
        };
        Ok(outcome)
    }

    pub fn state(&self) -> &OptimizerState {
        &self.state
    }

    pub fn estimates(&self) -> Option<&ReturnEstimates> {
        match &self.state {
            OptimizerState::Uninitialized => None,
            OptimizerState::Ready { estimates } | OptimizerState::Optimized { estimates, .. } => {
                Some(estimates)
            }
        }
    }

    pub fn last_outcome(&self) -> Option<&AllocationOutcome> {
        match &self.state {
            OptimizerState::Optimized { outcome, .. } => Some(outcome),
            _ => None,
        }
    }

    pub fn reset(&mut self) {
        self.state = OptimizerState::Uninitialized;
    }
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

fn default_risk_free_rate() -> AnnualRate {
    0.02
}

/// Input for a one-shot max-Sharpe optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharpeOptimizationInput {
    pub prices: PriceMatrix,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: AnnualRate,
    #[serde(default)]
    pub solver: SolverSettings,
    #[serde(default)]
    pub missing_price_policy: MissingPricePolicy,
}

/// Flattened optimization result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharpeOptimizationOutput {
    pub status: OptimizationStatus,
    pub weights: Vec<AssetWeight>,
    pub expected_return: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub iterations: Option<u32>,
    pub observations: usize,
    pub fallback_reason: Option<FallbackReason>,
    pub no_recommendation_reason: Option<NoRecommendationReason>,
}

impl SharpeOptimizationOutput {
    /// Flatten an outcome and collect the warnings it implies.
    pub fn from_outcome(
        outcome: &AllocationOutcome,
        observations: usize,
        warnings: &mut Vec<String>,
    ) -> Self {
        let allocation = outcome.allocation();
        let mut output = SharpeOptimizationOutput {
            status: outcome.status(),
            weights: allocation.map(|a| a.weights.clone()).unwrap_or_default(),
            expected_return: allocation.map(|a| a.expected_return),
            volatility: allocation.map(|a| a.volatility),
            sharpe_ratio: allocation.map(|a| a.sharpe_ratio),
            iterations: None,
            observations,
            fallback_reason: None,
            no_recommendation_reason: None,
        };

        match outcome {
            AllocationOutcome::Optimized { iterations, .. } => {
                output.iterations = Some(*iterations);
            }
            AllocationOutcome::Fallback { reason, .. } => {
                warnings.push(format!("Equal-weight fallback: {}", reason));
                output.fallback_reason = Some(reason.clone());
            }
            AllocationOutcome::NoRecommendation { reason } => {
                warnings.push(format!("No allocation recommended: {}", reason));
                output.no_recommendation_reason = Some(*reason);
            }
        }

        for w in output.weights.iter().filter(|w| w.weight > CONCENTRATION_WARNING) {
            warnings.push(format!(
                "Concentrated position: {} at {:.1}%",
                w.asset,
                w.weight * 100.0
            ));
        }
        output
    }
}

/// Estimate returns from prices and solve for the max-Sharpe allocation.
pub fn optimize_sharpe_portfolio(
    input: &SharpeOptimizationInput,
) -> QuantInvestResult<ComputationOutput<SharpeOptimizationOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let mut optimizer = PortfolioOptimizer::with_settings(input.solver, input.missing_price_policy)?;
    optimizer.set_prices(&input.prices);
    let outcome = optimizer.optimize(input.risk_free_rate)?;
    let observations = optimizer.estimates().map(|e| e.observations).unwrap_or(0);

    let output = SharpeOptimizationOutput::from_outcome(&outcome, observations, &mut warnings);
    info!(
        status = ?output.status,
        assets = output.weights.len(),
        observations,
        "max-Sharpe optimization finished"
    );

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata_f64(
        "Max-Sharpe mean-variance optimization (SQP, long-only, fully invested, 252-day annualization)",
        &serde_json::json!({
            "risk_free_rate": input.risk_free_rate,
            "max_iterations": input.solver.max_iterations,
            "ftol": input.solver.ftol,
            "missing_price_policy": input.missing_price_policy,
            "initial_weights": "equal",
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
