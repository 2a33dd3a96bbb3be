pub mod screener;

pub use screener::{
    assess, filter_and_rank, score, screen_universe, CriteriaAssessment, Criterion,
    CriterionOutcome, ExcludedCandidate, FundamentalMetrics, RankedCandidate, ScreeningInput,
    ScreeningOutput, ScreeningThresholds,
};
