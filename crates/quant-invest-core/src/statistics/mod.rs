pub mod estimator;
pub mod metrics;
pub mod technical;
