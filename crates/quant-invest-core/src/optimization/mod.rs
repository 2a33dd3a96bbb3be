pub(crate) mod linalg;
pub mod objective;
pub mod optimizer;
pub mod slsqp;

pub use objective::{NegativeSharpe, Objective};
pub use optimizer::{
    optimize_max_sharpe, optimize_sharpe_portfolio, Allocation, AllocationOutcome, AssetWeight,
    FallbackReason, NoRecommendationReason, OptimizationStatus, OptimizerState,
    PortfolioOptimizer, SharpeOptimizationInput, SharpeOptimizationOutput,
};
pub use slsqp::{minimize_on_simplex, SolverReport, SolverSettings};
