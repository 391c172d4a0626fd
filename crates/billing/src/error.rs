//! Billing error types

use thiserror::Error;

/// Billing-specific errors
#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Billing API error: {0}")]
    Api(String),

    #[error("Billing API returned {status} for {endpoint}")]
    UnexpectedStatus { endpoint: String, status: u16 },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for BillingError {
    fn from(err: reqwest::Error) -> Self {
        BillingError::Api(err.to_string())
    }
}

pub type BillingResult<T> = Result<T, BillingError>;
