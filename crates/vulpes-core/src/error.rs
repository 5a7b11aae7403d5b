//! Error types for the forecasting core.

use thiserror::Error;

/// Result type for forecast operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Error types surfaced by the forecasting core.
///
/// Variants are structured so the host can map them to user messages
/// without string matching.
#[derive(Error, Debug)]
pub enum ForecastError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid model: {0}")]
    InvalidModel(String),

    #[error("Insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Invalid parameter '{param}' = '{value}': {reason}")]
    InvalidParameter {
        param: String,
        value: String,
        reason: String,
    },

    #[error("Degenerate input: {0}")]
    Degenerate(String),

    #[error("Numerical failure: {0}")]
    NumericalFailure(String),
}

impl ForecastError {
    /// Stable numeric code per error kind.
    pub fn to_code(&self) -> i32 {
        match self {
            ForecastError::InvalidInput(_) => 1,
            ForecastError::InvalidModel(_) => 2,
            ForecastError::InsufficientData { .. } => 3,
            ForecastError::InvalidParameter { .. } => 4,
            ForecastError::Degenerate(_) => 5,
            ForecastError::NumericalFailure(_) => 6,
        }
    }

    /// Shorthand for an invalid-parameter error.
    pub fn invalid_parameter(
        param: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        ForecastError::InvalidParameter {
            param: param.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
