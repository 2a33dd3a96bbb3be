use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::debug;

use crate::error::QuantInvestError;
use crate::types::{with_metadata, AssetId, ComputationOutput, Ratio, Score};
use crate::QuantInvestResult;

/// Cap on the ROE excess that counts toward the score.
const ROE_BONUS_CAP: Decimal = dec!(0.2);

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Fundamental ratios for one ticker. Any field may be unavailable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalMetrics {
    pub ticker: AssetId,
    #[serde(default)]
    pub roe: Option<Ratio>,
    #[serde(default)]
    pub debt_to_equity: Option<Ratio>,
    #[serde(default)]
    pub profit_margin: Option<Ratio>,
    /// Used when `profit_margin` is unavailable.
    #[serde(default)]
    pub operating_margin: Option<Ratio>,
    #[serde(default)]
    pub peg: Option<Ratio>,
}

impl FundamentalMetrics {
    pub fn new(ticker: impl Into<AssetId>) -> Self {
        FundamentalMetrics {
            ticker: ticker.into(),
            roe: None,
            debt_to_equity: None,
            profit_margin: None,
            operating_margin: None,
            peg: None,
        }
    }

    pub fn effective_profit_margin(&self) -> Option<Ratio> {
        self.profit_margin.or(self.operating_margin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreeningThresholds {
    pub min_roe: Ratio,
    pub max_debt_to_equity: Ratio,
    pub min_profit_margin: Ratio,
    pub max_peg: Ratio,
}

impl Default for ScreeningThresholds {
    fn default() -> Self {
        ScreeningThresholds {
            min_roe: dec!(0.15),
            max_debt_to_equity: dec!(1.0),
            min_profit_margin: dec!(0.10),
            max_peg: dec!(2.0),
        }
    }
}

impl ScreeningThresholds {
    pub fn validate(&self) -> QuantInvestResult<()> {
        if self.max_debt_to_equity < Decimal::ZERO {
            return Err(QuantInvestError::invalid(
                "max_debt_to_equity",
                "Cannot be negative",
            ));
        }
        if self.max_peg <= Decimal::ZERO {
            return Err(QuantInvestError::invalid(
                "max_peg",
                "Must be positive; no PEG could pass otherwise",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Roe,
    DebtToEquity,
    ProfitMargin,
    Peg,
}

/// Tri-state result of one criterion. A missing metric is `Unknown`, which
/// never excludes a candidate but earns no score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionOutcome {
    Pass,
    Fail,
    Unknown,
}

impl CriterionOutcome {
    fn from_check(value: Option<Ratio>, check: impl Fn(Ratio) -> bool) -> Self {
        match value {
            Some(v) if check(v) => CriterionOutcome::Pass,
            Some(_) => CriterionOutcome::Fail,
            None => CriterionOutcome::Unknown,
        }
    }
}

/// Per-criterion outcomes for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriteriaAssessment {
    pub roe: CriterionOutcome,
    pub debt_to_equity: CriterionOutcome,
    pub profit_margin: CriterionOutcome,
    pub peg: CriterionOutcome,
}

impl CriteriaAssessment {
    pub fn outcomes(&self) -> [(Criterion, CriterionOutcome); 4] {
        [
            (Criterion::Roe, self.roe),
            (Criterion::DebtToEquity, self.debt_to_equity),
            (Criterion::ProfitMargin, self.profit_margin),
            (Criterion::Peg, self.peg),
        ]
    }

    /// Excluded only when some present metric fails.
    pub fn passes(&self) -> bool {
        self.outcomes()
            .iter()
            .all(|(_, outcome)| *outcome != CriterionOutcome::Fail)
    }

    pub fn failed(&self) -> Vec<Criterion> {
        self.outcomes()
            .iter()
            .filter(|(_, outcome)| *outcome == CriterionOutcome::Fail)
            .map(|(criterion, _)| *criterion)
            .collect()
    }

    pub fn unknown(&self) -> Vec<Criterion> {
        self.outcomes()
            .iter()
            .filter(|(_, outcome)| *outcome == CriterionOutcome::Unknown)
            .map(|(criterion, _)| *criterion)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub rank: usize,
    pub metrics: FundamentalMetrics,
    pub score: Score,
    pub assessment: CriteriaAssessment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedCandidate {
    pub ticker: AssetId,
    pub failed: Vec<Criterion>,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

pub fn assess(metrics: &FundamentalMetrics, thresholds: &ScreeningThresholds) -> CriteriaAssessment {
    CriteriaAssessment {
        roe: CriterionOutcome::from_check(metrics.roe, |v| v >= thresholds.min_roe),
        debt_to_equity: CriterionOutcome::from_check(metrics.debt_to_equity, |v| {
            v <= thresholds.max_debt_to_equity
        }),
        profit_margin: CriterionOutcome::from_check(metrics.effective_profit_margin(), |v| {
            v >= thresholds.min_profit_margin
        }),
        peg: CriterionOutcome::from_check(metrics.peg, |v| {
            v > Decimal::ZERO && v < thresholds.max_peg
        }),
    }
}

/// Quality score: a passing ROE earns `1 + min(roe - min_roe, 0.2)`, each
/// other passing criterion earns 1. Failing or unknown criteria earn 0.
pub fn score(metrics: &FundamentalMetrics, thresholds: &ScreeningThresholds) -> Score {
    let assessment = assess(metrics, thresholds);
    let mut total = Decimal::ZERO;

    if let (CriterionOutcome::Pass, Some(roe)) = (assessment.roe, metrics.roe) {
        total += Decimal::ONE + (roe - thresholds.min_roe).min(ROE_BONUS_CAP);
    }
    for outcome in [
        assessment.debt_to_equity,
        assessment.profit_margin,
        assessment.peg,
    ] {
        if outcome == CriterionOutcome::Pass {
            total += Decimal::ONE;
        }
    }
    total
}

/// Drop candidates failing any present criterion, score the rest and keep
/// the best `top_n`. Ties keep input order.
pub fn filter_and_rank(
    candidates: &[FundamentalMetrics],
    thresholds: &ScreeningThresholds,
    top_n: usize,
) -> Vec<RankedCandidate> {
    let mut survivors: Vec<RankedCandidate> = candidates
        .iter()
        .filter_map(|metrics| {
            let assessment = assess(metrics, thresholds);
            assessment.passes().then(|| RankedCandidate {
                rank: 0,
                metrics: metrics.clone(),
                score: score(metrics, thresholds),
                assessment,
            })
        })
        .collect();

    // sort_by is stable
    survivors.sort_by(|a, b| b.score.cmp(&a.score));
    survivors.truncate(top_n);
    for (i, candidate) in survivors.iter_mut().enumerate() {
        candidate.rank = i + 1;
    }
    survivors
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

fn default_top_n() -> usize {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningInput {
    pub candidates: Vec<FundamentalMetrics>,
    #[serde(default)]
    pub thresholds: ScreeningThresholds,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreeningOutput {
    pub ranked: Vec<RankedCandidate>,
    pub excluded: Vec<ExcludedCandidate>,
    pub candidates_screened: usize,
    pub candidates_passed: usize,
}

impl ScreeningOutput {
    pub fn tickers(&self) -> Vec<AssetId> {
        self.ranked.iter().map(|c| c.metrics.ticker.clone()).collect()
    }
}

/// Screen and rank a universe by fundamentals.
pub fn screen_universe(input: &ScreeningInput) -> QuantInvestResult<ComputationOutput<ScreeningOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    input.thresholds.validate()?;
    if input.top_n == 0 {
        return Err(QuantInvestError::invalid("top_n", "Must be at least 1"));
    }

    let mut seen = HashSet::new();
    for candidate in &input.candidates {
        if candidate.ticker.trim().is_empty() {
            return Err(QuantInvestError::invalid("ticker", "Ticker cannot be blank"));
        }
        if !seen.insert(candidate.ticker.as_str()) {
            return Err(QuantInvestError::invalid(
                "candidates",
                format!("Duplicate ticker '{}'", candidate.ticker),
            ));
        }
    }

    let excluded: Vec<ExcludedCandidate> = input
        .candidates
        .iter()
        .filter_map(|metrics| {
            let failed = assess(metrics, &input.thresholds).failed();
            (!failed.is_empty()).then(|| ExcludedCandidate {
                ticker: metrics.ticker.clone(),
                failed,
            })
        })
        .collect();

    let ranked = filter_and_rank(&input.candidates, &input.thresholds, input.top_n);
    let candidates_passed = input.candidates.len() - excluded.len();

    if ranked.is_empty() {
        warnings.push("No candidate passed screening".into());
    } else if candidates_passed > ranked.len() {
        warnings.push(format!(
            "{} passing candidates cut by top_n = {}",
            candidates_passed - ranked.len(),
            input.top_n
        ));
    }
    for candidate in &ranked {
        let unknown = candidate.assessment.unknown();
        if !unknown.is_empty() {
            warnings.push(format!(
                "{}: {} metric(s) unavailable, scored as zero",
                candidate.metrics.ticker,
                unknown.len()
            ));
        }
    }

    debug!(
        screened = input.candidates.len(),
        passed = candidates_passed,
        ranked = ranked.len(),
        "screening finished"
    );

    let output = ScreeningOutput {
        ranked,
        excluded,
        candidates_screened: input.candidates.len(),
        candidates_passed,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Fundamental screen (ROE, debt/equity, profit margin, PEG; missing metrics pass)",
        &serde_json::json!({
            "min_roe": input.thresholds.min_roe.to_string(),
            "max_debt_to_equity": input.thresholds.max_debt_to_equity.to_string(),
            "min_profit_margin": input.thresholds.min_profit_margin.to_string(),
            "max_peg": input.thresholds.max_peg.to_string(),
            "top_n": input.top_n,
            "roe_bonus_cap": ROE_BONUS_CAP.to_string(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn strong(ticker: &str) -> FundamentalMetrics {
        FundamentalMetrics {
            ticker: ticker.into(),
            roe: Some(dec!(0.25)),
            debt_to_equity: Some(dec!(0.5)),
            profit_margin: Some(dec!(0.20)),
            operating_margin: None,
            peg: Some(dec!(1.5)),
        }
    }

    #[test]
    fn test_score_all_passing() {
        let t = ScreeningThresholds::default();
        // 1 + min(0.10, 0.2) + 3
        assert_eq!(score(&strong("AAA"), &t), dec!(4.10));
    }

    #[test]
    fn test_roe_bonus_capped() {
        let mut m = strong("AAA");
        m.roe = Some(dec!(0.90));
        assert_eq!(score(&m, &ScreeningThresholds::default()), dec!(4.2));
    }

    #[test]
    fn test_missing_roe_scores_three() {
        let mut m = strong("AAA");
        m.roe = None;
        let t = ScreeningThresholds::default();
        assert_eq!(score(&m, &t), dec!(3));
        assert!(assess(&m, &t).passes());
    }

    #[test]
    fn test_peg_must_be_positive() {
        let mut m = strong("AAA");
        m.peg = Some(dec!(-0.5));
        let a = assess(&m, &ScreeningThresholds::default());
        assert_eq!(a.peg, CriterionOutcome::Fail);
        assert!(!a.passes());

        m.peg = Some(dec!(2.0));
        assert_eq!(assess(&m, &ScreeningThresholds::default()).peg, CriterionOutcome::Fail);
    }

    #[test]
    fn test_operating_margin_fallback() {
        let mut m = strong("AAA");
        m.profit_margin = None;
        m.operating_margin = Some(dec!(0.05));
        let a = assess(&m, &ScreeningThresholds::default());
        assert_eq!(a.profit_margin, CriterionOutcome::Fail);
    }

    #[test]
    fn test_high_leverage_excluded() {
        let mut levered = strong("LEV");
        levered.debt_to_equity = Some(dec!(1.5));
        let ranked = filter_and_rank(
            &[strong("AAA"), levered],
            &ScreeningThresholds::default(),
            15,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].metrics.ticker, "AAA");
    }

    #[test]
    fn test_incomplete_candidate_ranked_last_but_kept() {
        let mut incomplete = strong("BBB");
        incomplete.roe = None;
        let candidates = vec![incomplete, strong("AAA"), strong("CCC")];
        let ranked = filter_and_rank(&candidates, &ScreeningThresholds::default(), 15);
        let order: Vec<&str> = ranked.iter().map(|c| c.metrics.ticker.as_str()).collect();
        assert_eq!(order, vec!["AAA", "CCC", "BBB"]);
        assert_eq!(ranked[2].rank, 3);
    }

    #[test]
    fn test_top_n_truncates() {
        let candidates: Vec<FundamentalMetrics> =
            (0..5).map(|i| strong(&format!("T{}", i))).collect();
        let ranked = filter_and_rank(&candidates, &ScreeningThresholds::default(), 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].metrics.ticker, "T0");
    }

    #[test]
    fn test_screen_universe_envelope() {
        let mut levered = strong("LEV");
        levered.debt_to_equity = Some(dec!(3));
        let input = ScreeningInput {
            candidates: vec![strong("AAA"), levered, FundamentalMetrics::new("NODATA")],
            thresholds: ScreeningThresholds::default(),
            top_n: 15,
        };
        let out = screen_universe(&input).unwrap();
        assert_eq!(out.result.candidates_screened, 3);
        assert_eq!(out.result.candidates_passed, 2);
        assert_eq!(out.result.tickers(), vec!["AAA".to_string(), "NODATA".to_string()]);
        assert_eq!(out.result.excluded[0].failed, vec![Criterion::DebtToEquity]);
        assert_eq!(out.result.ranked[1].score, Decimal::ZERO);
        assert!(out.warnings.iter().any(|w| w.starts_with("NODATA")));
        assert_eq!(out.metadata.precision, "rust_decimal_128bit");
    }

    #[test]
    fn test_duplicate_tickers_rejected() {
        let input = ScreeningInput {
            candidates: vec![strong("AAA"), strong("AAA")],
            thresholds: ScreeningThresholds::default(),
            top_n: 15,
        };
        assert!(screen_universe(&input).is_err());
    }

    #[test]
    fn test_metrics_deserialize_with_missing_fields() {
        let m: FundamentalMetrics =
            serde_json::from_str(r#"{"ticker": "XYZ", "roe": "0.2"}"#).unwrap();
        assert_eq!(m.roe, Some(dec!(0.2)));
        assert_eq!(m.peg, None);
    }
}
