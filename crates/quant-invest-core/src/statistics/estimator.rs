use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::market_data::PriceMatrix;
use crate::types::{AssetId, TRADING_DAYS_PER_YEAR};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// How gaps inside a price column are treated before estimation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingPricePolicy {
    /// Return rows with any undefined cell are dropped.
    #[default]
    DropIncompleteReturns,
    /// Gaps take the previous price first (leading gaps stay undefined).
    ForwardFill,
}

/// Simple period-over-period returns. `None` where either price is missing.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSeries {
    pub assets: Vec<AssetId>,
    pub rows: Vec<Vec<Option<f64>>>,
}

impl ReturnSeries {
    /// Rows where every asset has a defined return.
    pub fn complete_rows(&self) -> Vec<Vec<f64>> {
        self.rows
            .iter()
            .filter_map(|row| row.iter().copied().collect::<Option<Vec<f64>>>())
            .collect()
    }
}

/// Annualized mean returns and covariance for one optimization run.
///
/// An empty estimate (no covariance) means the price history could not
/// support an optimization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnEstimates {
    pub assets: Vec<AssetId>,
    pub mean_returns: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
    /// Number of complete return observations used.
    pub observations: usize,
}

impl ReturnEstimates {
    pub fn is_empty(&self) -> bool {
        self.covariance.is_empty()
    }

    pub fn n_assets(&self) -> usize {
        self.mean_returns.len()
    }

    fn insufficient(assets: Vec<AssetId>, observations: usize) -> Self {
        ReturnEstimates {
            assets,
            mean_returns: Vec::new(),
            covariance: Vec::new(),
            observations,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Percentage change between consecutive rows.
pub fn percentage_change(prices: &PriceMatrix) -> ReturnSeries {
    let rows = prices
        .rows()
        .windows(2)
        .map(|pair| {
            pair[0]
                .iter()
                .zip(pair[1].iter())
                .map(|(prev, cur)| match (prev, cur) {
                    (Some(p0), Some(p1)) => Some((p1 - p0) / p0),
                    _ => None,
                })
                .collect()
        })
        .collect();
    ReturnSeries {
        assets: prices.assets().to_vec(),
        rows,
    }
}

/// Estimate annualized mean returns and covariance from a price matrix.
///
/// Rows with every price missing are dropped, returns are taken on what
/// remains, and only return rows defined for every asset are used. Fewer
/// than two assets or fewer than two complete observations yield an empty
/// estimate.
pub fn estimate_returns(prices: &PriceMatrix, policy: MissingPricePolicy) -> ReturnEstimates {
    let cleaned = prices.drop_empty_rows();
    let cleaned = match policy {
        MissingPricePolicy::DropIncompleteReturns => cleaned,
        MissingPricePolicy::ForwardFill => cleaned.forward_filled(),
    };
    let assets = cleaned.assets().to_vec();

    let observations = percentage_change(&cleaned).complete_rows();
    let n_obs = observations.len();

    if assets.len() < 2 || n_obs < 2 {
        debug!(
            assets = assets.len(),
            observations = n_obs,
            "insufficient data for return estimation"
        );
        return ReturnEstimates::insufficient(assets, n_obs);
    }

    let n = assets.len();
    let columns: Vec<Vec<f64>> = (0..n)
        .map(|c| observations.iter().map(|row| row[c]).collect())
        .collect();
    let means: Vec<f64> = columns.iter().map(|col| mean(col)).collect();

    let mut covariance = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let cov = sample_covariance(&columns[i], &columns[j], means[i], means[j])
                * TRADING_DAYS_PER_YEAR;
            covariance[i][j] = cov;
            covariance[j][i] = cov;
        }
    }

    debug!(assets = n, observations = n_obs, "estimated return statistics");

    ReturnEstimates {
        assets,
        mean_returns: means.iter().map(|m| m * TRADING_DAYS_PER_YEAR).collect(),
        covariance,
        observations: n_obs,
    }
}

// ---------------------------------------------------------------------------
// Sample statistics
// ---------------------------------------------------------------------------

/// Arithmetic mean; zero for an empty slice.
pub(crate) fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Sample variance (n-1 denominator); zero below two observations.
pub(crate) fn sample_variance(data: &[f64], mean: f64) -> f64 {
    sample_covariance(data, data, mean, mean)
}

/// Sample covariance (n-1 denominator); zero below two observations.
pub(crate) fn sample_covariance(x: &[f64], y: &[f64], x_mean: f64, y_mean: f64) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let sum: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(xi, yi)| (xi - x_mean) * (yi - y_mean))
        .sum();
    sum / (n - 1) as f64
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: Vec<Vec<Option<f64>>>) -> PriceMatrix {
        let n = rows.first().map(|r| r.len()).unwrap_or(2);
        let assets = (0..n).map(|i| format!("A{}", i)).collect();
        PriceMatrix::new(assets, None, rows).unwrap()
    }

    #[test]
    fn test_percentage_change() {
        let m = matrix(vec![
            vec![Some(100.0), Some(50.0)],
            vec![Some(110.0), None],
            vec![Some(99.0), Some(55.0)],
        ]);
        let r = percentage_change(&m);
        assert_eq!(r.rows.len(), 2);
        assert!((r.rows[0][0].unwrap() - 0.10).abs() < 1e-12);
        assert_eq!(r.rows[0][1], None);
        assert!((r.rows[1][0].unwrap() + 0.10).abs() < 1e-12);
        assert_eq!(r.rows[1][1], None);
        assert!(r.complete_rows().is_empty());
    }

    #[test]
    fn test_estimates_annualized() {
        // Alternating +1% / -1% around a flat mean for A0; A1 mirrors it.
        let mut rows = Vec::new();
        let (mut a, mut b) = (100.0, 100.0);
        rows.push(vec![Some(a), Some(b)]);
        for t in 0..40 {
            let r = if t % 2 == 0 { 0.01 } else { -0.01 };
            a *= 1.0 + r;
            b *= 1.0 - r;
            rows.push(vec![Some(a), Some(b)]);
        }
        let est = estimate_returns(&matrix(rows), MissingPricePolicy::default());
        assert_eq!(est.observations, 40);
        assert_eq!(est.n_assets(), 2);
        assert!(est.mean_returns[0].abs() < 1e-9);
        // var of +-0.01 with n-1 = 39: 40 * 1e-4 / 39
        let expected_var = 40.0 * 1e-4 / 39.0 * 252.0;
        assert!((est.covariance[0][0] - expected_var).abs() < 1e-9);
        assert!((est.covariance[0][1] + expected_var).abs() < 1e-9);
        assert_eq!(est.covariance[0][1], est.covariance[1][0]);
    }

    #[test]
    fn test_single_row_is_empty() {
        let est = estimate_returns(
            &matrix(vec![vec![Some(1.0), Some(2.0)]]),
            MissingPricePolicy::default(),
        );
        assert!(est.is_empty());
        assert_eq!(est.observations, 0);
    }

    #[test]
    fn test_single_asset_is_empty() {
        let rows = (1..10).map(|i| vec![Some(i as f64)]).collect();
        let est = estimate_returns(&matrix(rows), MissingPricePolicy::default());
        assert!(est.is_empty());
        assert_eq!(est.assets.len(), 1);
    }

    #[test]
    fn test_all_missing_rows_dropped_before_returns() {
        let m = matrix(vec![
            vec![Some(100.0), Some(100.0)],
            vec![None, None],
            vec![Some(101.0), Some(99.0)],
            vec![Some(102.0), Some(100.0)],
        ]);
        let est = estimate_returns(&m, MissingPricePolicy::default());
        assert_eq!(est.observations, 2);
        assert!(est.covariance.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_partial_gap_never_leaks_undefined_values() {
        let m = matrix(vec![
            vec![Some(100.0), Some(100.0)],
            vec![Some(101.0), None],
            vec![Some(102.0), Some(101.0)],
            vec![Some(101.0), Some(103.0)],
            vec![Some(103.0), Some(102.0)],
        ]);
        let dropped = estimate_returns(&m, MissingPricePolicy::DropIncompleteReturns);
        assert_eq!(dropped.observations, 2);
        assert!(dropped.mean_returns.iter().all(|v| v.is_finite()));

        let filled = estimate_returns(&m, MissingPricePolicy::ForwardFill);
        assert_eq!(filled.observations, 4);
        assert!(filled.covariance.iter().flatten().all(|v| v.is_finite()));
    }

    #[test]
    fn test_sample_variance_small_inputs() {
        assert_eq!(sample_variance(&[], 0.0), 0.0);
        assert_eq!(sample_variance(&[1.0], 1.0), 0.0);
        assert!((sample_variance(&[1.0, 3.0], 2.0) - 2.0).abs() < 1e-12);
    }
}
