use pretty_assertions::assert_eq;
use quant_invest_core::screening::{
    filter_and_rank, score, screen_universe, CriterionOutcome, FundamentalMetrics, ScreeningInput,
    ScreeningThresholds,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn metrics(ticker: &str, roe: Option<Decimal>, de: Option<Decimal>, pm: Option<Decimal>, peg: Option<Decimal>) -> FundamentalMetrics {
    FundamentalMetrics {
        ticker: ticker.into(),
        roe,
        debt_to_equity: de,
        profit_margin: pm,
        operating_margin: None,
        peg,
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

#[test]
fn test_four_passing_metrics_score_at_least_four() {
    let m = metrics("AAA", Some(dec!(0.15)), Some(dec!(1.0)), Some(dec!(0.10)), Some(dec!(1.99)));
    let s = score(&m, &ScreeningThresholds::default());
    // Thresholds are inclusive for ROE, debt/equity and margin.
    assert_eq!(s, dec!(4));
}

#[test]
fn test_missing_roe_with_three_passing_scores_three() {
    let m = metrics("AAA", None, Some(dec!(0.4)), Some(dec!(0.3)), Some(dec!(1.0)));
    assert_eq!(score(&m, &ScreeningThresholds::default()), dec!(3));
}

#[test]
fn test_no_data_scores_zero_but_passes() {
    let m = FundamentalMetrics::new("EMPTY");
    let ranked = filter_and_rank(&[m], &ScreeningThresholds::default(), 5);
    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].score, Decimal::ZERO);
    assert_eq!(ranked[0].assessment.roe, CriterionOutcome::Unknown);
}

#[test]
fn test_custom_thresholds() {
    let strict = ScreeningThresholds {
        min_roe: dec!(0.30),
        ..ScreeningThresholds::default()
    };
    let m = metrics("AAA", Some(dec!(0.25)), None, None, None);
    assert!(filter_and_rank(&[m.clone()], &strict, 5).is_empty());
    assert_eq!(filter_and_rank(&[m], &ScreeningThresholds::default(), 5).len(), 1);
}

// ---------------------------------------------------------------------------
// Filtering and ranking
// ---------------------------------------------------------------------------

#[test]
fn test_present_debt_above_max_excludes() {
    let m = metrics("LEV", Some(dec!(0.5)), Some(dec!(1.01)), Some(dec!(0.5)), Some(dec!(0.5)));
    assert!(filter_and_rank(&[m], &ScreeningThresholds::default(), 5).is_empty());
}

#[test]
fn test_three_candidates_one_missing_roe() {
    let full = |t: &str| metrics(t, Some(dec!(0.18)), Some(dec!(0.5)), Some(dec!(0.2)), Some(dec!(1.0)));
    let partial = metrics("PART", None, Some(dec!(0.5)), Some(dec!(0.2)), Some(dec!(1.0)));
    let ranked = filter_and_rank(
        &[full("ONE"), partial, full("TWO")],
        &ScreeningThresholds::default(),
        15,
    );
    let tickers: Vec<&str> = ranked.iter().map(|c| c.metrics.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["ONE", "TWO", "PART"]);
}

#[test]
fn test_ties_keep_input_order() {
    let same = |t: &str| metrics(t, Some(dec!(0.2)), Some(dec!(0.5)), None, None);
    let ranked = filter_and_rank(
        &[same("C"), same("A"), same("B")],
        &ScreeningThresholds::default(),
        15,
    );
    let tickers: Vec<&str> = ranked.iter().map(|c| c.metrics.ticker.as_str()).collect();
    assert_eq!(tickers, vec!["C", "A", "B"]);
    assert_eq!(ranked.iter().map(|c| c.rank).collect::<Vec<_>>(), vec![1, 2, 3]);
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[test]
fn test_screen_universe_from_json() {
    let input: ScreeningInput = serde_json::from_value(serde_json::json!({
        "candidates": [
            { "ticker": "AAA", "roe": 0.22, "debt_to_equity": 0.3, "profit_margin": 0.25, "peg": 1.1 },
            { "ticker": "BBB", "roe": 0.05 },
            { "ticker": "CCC", "operating_margin": 0.12 }
        ],
        "top_n": 2
    }))
    .unwrap();
    assert_eq!(input.thresholds, ScreeningThresholds::default());

    let out = screen_universe(&input).unwrap();
    assert_eq!(out.result.tickers(), vec!["AAA".to_string(), "CCC".to_string()]);
    assert_eq!(out.result.excluded.len(), 1);
    assert_eq!(out.result.excluded[0].ticker, "BBB");
    assert_eq!(out.result.ranked[1].score, dec!(1));
}

#[test]
fn test_zero_top_n_rejected() {
    let input = ScreeningInput {
        candidates: vec![FundamentalMetrics::new("AAA")],
        thresholds: ScreeningThresholds::default(),
        top_n: 0,
    };
    assert!(screen_universe(&input).is_err());
}
