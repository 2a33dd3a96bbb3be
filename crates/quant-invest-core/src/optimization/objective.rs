use crate::optimization::linalg::{mat_vec_multiply, vec_dot};
use crate::statistics::estimator::ReturnEstimates;
use crate::types::AnnualRate;

/// A smooth function of portfolio weights to be minimized.
pub trait Objective {
    fn dimension(&self) -> usize;

    fn value(&self, weights: &[f64]) -> f64;

    fn gradient(&self, weights: &[f64]) -> Vec<f64>;
}

/// Negative Sharpe ratio of a weighted portfolio.
///
/// Degenerate portfolios (zero or undefined volatility) evaluate to 0.0
/// with a zero gradient instead of dividing by zero.
#[derive(Debug, Clone, Copy)]
pub struct NegativeSharpe<'a> {
    mean_returns: &'a [f64],
    covariance: &'a [Vec<f64>],
    risk_free_rate: AnnualRate,
}

impl<'a> NegativeSharpe<'a> {
    pub fn new(mean_returns: &'a [f64], covariance: &'a [Vec<f64>], risk_free_rate: AnnualRate) -> Self {
        NegativeSharpe {
            mean_returns,
            covariance,
            risk_free_rate,
        }
    }

    pub fn from_estimates(estimates: &'a ReturnEstimates, risk_free_rate: AnnualRate) -> Self {
        NegativeSharpe::new(&estimates.mean_returns, &estimates.covariance, risk_free_rate)
    }

    /// w . mu
    pub fn portfolio_return(&self, weights: &[f64]) -> f64 {
        vec_dot(weights, self.mean_returns)
    }

    /// sqrt(w' Sigma w), clamped to zero for non-positive variance.
    pub fn portfolio_volatility(&self, weights: &[f64]) -> f64 {
        let variance = vec_dot(weights, &mat_vec_multiply(self.covariance, weights));
        if variance > 0.0 {
            variance.sqrt()
        } else {
            0.0
        }
    }

    /// Sharpe ratio, 0.0 for a riskless portfolio.
    pub fn sharpe_ratio(&self, weights: &[f64]) -> f64 {
        let vol = self.portfolio_volatility(weights);
        if vol <= 0.0 {
            return 0.0;
        }
        (self.portfolio_return(weights) - self.risk_free_rate) / vol
    }
}

impl Objective for NegativeSharpe<'_> {
    fn dimension(&self) -> usize {
        self.mean_returns.len()
    }

    fn value(&self, weights: &[f64]) -> f64 {
        -self.sharpe_ratio(weights)
    }

    // d/dw [-(r - rf) / s] = -mu / s + (r - rf) * Sigma w / s^3
    fn gradient(&self, weights: &[f64]) -> Vec<f64> {
        let sigma_w = mat_vec_multiply(self.covariance, weights);
        let variance = vec_dot(weights, &sigma_w);
        if variance.is_nan() || variance <= 0.0 {
            return vec![0.0; weights.len()];
        }
        let vol = variance.sqrt();
        let excess = self.portfolio_return(weights) - self.risk_free_rate;
        let vol_cubed = variance * vol;
        self.mean_returns
            .iter()
            .zip(sigma_w.iter())
            .map(|(mu, sw)| -mu / vol + excess * sw / vol_cubed)
            .collect()
    }
}
