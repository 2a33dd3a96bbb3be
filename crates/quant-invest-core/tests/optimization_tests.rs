use quant_invest_core::market_data::PriceMatrix;
use quant_invest_core::optimization::{
    optimize_max_sharpe, optimize_sharpe_portfolio, AllocationOutcome, OptimizationStatus,
    PortfolioOptimizer, SharpeOptimizationInput, SolverSettings,
};
use quant_invest_core::statistics::estimator::{estimate_returns, MissingPricePolicy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn random_prices(seed: u64, assets: usize, rows: usize) -> PriceMatrix {
    let mut rng = StdRng::seed_from_u64(seed);
    let drifts: Vec<f64> = (0..assets).map(|_| rng.gen_range(-0.0005..0.0015)).collect();
    let mut level = vec![100.0; assets];
    let mut data = Vec::with_capacity(rows);
    data.push(level.iter().map(|p| Some(*p)).collect());
    for _ in 1..rows {
        let market: f64 = rng.gen_range(-0.01..0.01);
        for (c, price) in level.iter_mut().enumerate() {
            let idio: f64 = rng.gen_range(-0.02..0.02);
            *price *= 1.0 + drifts[c] + 0.5 * market + idio;
        }
        data.push(level.iter().map(|p| Some(*p)).collect());
    }
    let ids = (0..assets).map(|i| format!("S{}", i)).collect();
    PriceMatrix::new(ids, None, data).unwrap()
}

fn solve(prices: &PriceMatrix, rf: f64) -> AllocationOutcome {
    let est = estimate_returns(prices, MissingPricePolicy::default());
    optimize_max_sharpe(&est, rf, &SolverSettings::default()).unwrap()
}

// ---------------------------------------------------------------------------
// Weight invariants
// ---------------------------------------------------------------------------

#[test]
fn test_weights_on_simplex_across_random_universes() {
    for seed in 0..20 {
        let assets = 2 + (seed as usize % 5);
        let outcome = solve(&random_prices(seed, assets, 150), 0.02);
        let allocation = outcome
            .allocation()
            .unwrap_or_else(|| panic!("seed {} gave no recommendation", seed));
        assert_eq!(allocation.len(), assets);
        let total = allocation.total_weight();
        assert!((total - 1.0).abs() < 1e-6, "seed {}: total {}", seed, total);
        for w in &allocation.weights {
            assert!(
                (0.0..=1.0).contains(&w.weight) && w.weight.is_finite(),
                "seed {}: {} = {}",
                seed,
                w.asset,
                w.weight
            );
        }
    }
}

#[test]
fn test_weights_follow_column_order() {
    let prices = random_prices(3, 4, 100);
    let outcome = solve(&prices, 0.02);
    let order: Vec<&str> = outcome
        .allocation()
        .unwrap()
        .weights
        .iter()
        .map(|w| w.asset.as_str())
        .collect();
    assert_eq!(order, vec!["S0", "S1", "S2", "S3"]);
}

#[test]
fn test_repeated_runs_are_identical() {
    let prices = random_prices(11, 5, 200);
    let first = solve(&prices, 0.02);
    let second = solve(&prices, 0.02);
    assert_eq!(first, second);
}

#[test]
fn test_higher_risk_free_rate_never_raises_sharpe() {
    for seed in 0..10 {
        let prices = random_prices(100 + seed, 3, 150);
        let low = solve(&prices, 0.02).allocation().unwrap().sharpe_ratio;
        let high = solve(&prices, 0.05).allocation().unwrap().sharpe_ratio;
        assert!(high <= low + 1e-6, "seed {}: {} > {}", seed, high, low);
    }
}

// ---------------------------------------------------------------------------
// Degenerate inputs
// ---------------------------------------------------------------------------

#[test]
fn test_single_price_row_gives_empty_mapping() {
    let prices = PriceMatrix::new(
        vec!["A".into(), "B".into(), "C".into()],
        None,
        vec![vec![Some(10.0), Some(20.0), Some(30.0)]],
    )
    .unwrap();
    let outcome = solve(&prices, 0.02);
    assert!(outcome.weights().is_empty());
    assert_eq!(outcome.status(), OptimizationStatus::NoRecommendation);
}

#[test]
fn test_single_asset_gives_no_recommendation() {
    let prices = random_prices(5, 1, 50);
    assert!(solve(&prices, 0.02).weights().is_empty());
}

#[test]
fn test_constant_prices_give_exact_equal_weights() {
    let rows = vec![vec![Some(5.0), Some(7.0), Some(9.0), Some(11.0)]; 40];
    let prices = PriceMatrix::new(
        vec!["W".into(), "X".into(), "Y".into(), "Z".into()],
        None,
        rows,
    )
    .unwrap();
    for weight in solve(&prices, 0.02).weights().values() {
        assert!((weight - 0.25).abs() < 1e-12);
    }
}

#[test]
fn test_gaps_in_one_column_shrink_observations() {
    let mut prices = random_prices(21, 3, 80);
    let mut rows = prices.rows().to_vec();
    for row in rows.iter_mut().skip(10).take(5) {
        row[1] = None;
    }
    prices = PriceMatrix::new(prices.assets().to_vec(), None, rows).unwrap();

    let dropped = estimate_returns(&prices, MissingPricePolicy::DropIncompleteReturns);
    let filled = estimate_returns(&prices, MissingPricePolicy::ForwardFill);
    // Five missing prices break six consecutive returns.
    assert_eq!(dropped.observations, 79 - 6);
    assert_eq!(filled.observations, 79);
    assert!(dropped.covariance.iter().flatten().all(|v| v.is_finite()));
}

// ---------------------------------------------------------------------------
// Session and envelope
// ---------------------------------------------------------------------------

#[test]
fn test_session_replaces_state_on_new_prices() {
    let mut optimizer = PortfolioOptimizer::new();
    optimizer.set_prices(&random_prices(1, 3, 120));
    let first = optimizer.optimize(0.02).unwrap();
    optimizer.set_prices(&random_prices(2, 2, 120));
    let second = optimizer.optimize(0.02).unwrap();
    assert_eq!(first.weights().len(), 3);
    assert_eq!(second.weights().len(), 2);
}

#[test]
fn test_envelope_from_json() {
    let prices = random_prices(8, 3, 90);
    let input: SharpeOptimizationInput = serde_json::from_value(serde_json::json!({
        "prices": prices,
        "risk_free_rate": 0.03,
        "solver": { "max_iterations": 200 }
    }))
    .unwrap();
    assert_eq!(input.solver.ftol, 1e-9);
    let out = optimize_sharpe_portfolio(&input).unwrap();
    assert_eq!(out.result.observations, 89);
    assert_eq!(out.result.weights.len(), 3);
    assert!(out.methodology.contains("Max-Sharpe"));
}
