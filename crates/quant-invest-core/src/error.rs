use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuantInvestError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: f64,
    },

    #[error("Numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl QuantInvestError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        QuantInvestError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for QuantInvestError {
    fn from(e: serde_json::Error) -> Self {
        QuantInvestError::SerializationError(e.to_string())
    }
}
