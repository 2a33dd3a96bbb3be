//! Trend and momentum indicators over a gap-free price series.
//!
//! These feed entry-timing decisions downstream; the optimizer does not use
//! them.

use crate::error::QuantInvestError;
use crate::QuantInvestResult;

/// Simple moving average. `None` until `period` prices are available.
pub fn simple_moving_average(prices: &[f64], period: usize) -> QuantInvestResult<Vec<Option<f64>>> {
    validate_period("sma_period", period)?;
    let mut out = Vec::with_capacity(prices.len());
    let mut window_sum = 0.0;
    for (i, price) in prices.iter().enumerate() {
        window_sum += price;
        if i >= period {
            window_sum -= prices[i - period];
        }
        out.push(if i + 1 >= period {
            Some(window_sum / period as f64)
        } else {
            None
        });
    }
    Ok(out)
}

/// Relative Strength Index over simple rolling means of gains and losses.
///
/// The first value appears once `period` price changes exist. A window with
/// no losses reads 100; a window with no movement at all reads a neutral 50.
pub fn relative_strength_index(prices: &[f64], period: usize) -> QuantInvestResult<Vec<Option<f64>>> {
    validate_period("rsi_period", period)?;
    let mut out = vec![None; prices.len()];
    if prices.len() <= period {
        return Ok(out);
    }

    let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
    for end in period..=deltas.len() {
        let window = &deltas[end - period..end];
        let gain: f64 = window.iter().filter(|d| **d > 0.0).sum::<f64>() / period as f64;
        let loss: f64 = window.iter().filter(|d| **d < 0.0).map(|d| -d).sum::<f64>() / period as f64;
        let rsi = if loss == 0.0 {
            if gain == 0.0 {
                50.0
            } else {
                100.0
            }
        } else {
            100.0 - 100.0 / (1.0 + gain / loss)
        };
        out[end] = Some(rsi);
    }
    Ok(out)
}

/// Hurst exponent from the scaling of lagged price differences.
///
/// Fits log(std of p[t+lag] - p[t]) against log(lag) for lags in
/// `2..max_lag`; the slope is the exponent (below 0.5 mean-reverting,
/// 0.5 random walk, above 0.5 trending). `None` when fewer than two lags
/// fit in the series or a lag shows no dispersion.
pub fn hurst_exponent(prices: &[f64], max_lag: usize) -> Option<f64> {
    let lags: Vec<usize> = (2..max_lag).filter(|lag| *lag < prices.len()).collect();
    if lags.len() < 2 {
        return None;
    }

    let mut points = Vec::with_capacity(lags.len());
    for lag in lags {
        let diffs: Vec<f64> = prices[lag..]
            .iter()
            .zip(prices.iter())
            .map(|(later, earlier)| later - earlier)
            .collect();
        let tau = population_std(&diffs);
        if tau <= 0.0 || !tau.is_finite() {
            return None;
        }
        points.push(((lag as f64).ln(), tau.ln()));
    }

    let slope = least_squares_slope(&points)?;
    slope.is_finite().then_some(slope)
}

fn population_std(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    (data.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n).sqrt()
}

fn least_squares_slope(points: &[(f64, f64)]) -> Option<f64> {
    let n = points.len() as f64;
    let x_mean = points.iter().map(|p| p.0).sum::<f64>() / n;
    let y_mean = points.iter().map(|p| p.1).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|p| (p.0 - x_mean).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points.iter().map(|p| (p.0 - x_mean) * (p.1 - y_mean)).sum();
    Some(sxy / sxx)
}

fn validate_period(field: &str, period: usize) -> QuantInvestResult<()> {
    if period == 0 {
        return Err(QuantInvestError::invalid(field, "Period must be at least 1"));
    }
    Ok(())
}
