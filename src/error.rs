use thiserror::Error;

pub type Result<T> = std::result::Result<T, PromoError>;

/// Error taxonomy for the redemption and payment core.
///
/// Every variant has a fixed HTTP mapping at the interface boundary:
/// `Validation` and `State` map to 400, `NotFound` to 404, `Internal` to 500.
/// `Signature` never becomes an HTTP error; callback authenticity failures are
/// reported as a structured outcome so the gateway still receives a 200 ack.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PromoError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    State(String),
    #[error("invalid gateway signature")]
    Signature,
    #[error("{0}")]
    Internal(String),
}

impl PromoError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
