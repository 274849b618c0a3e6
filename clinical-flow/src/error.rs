use std::time::Duration;
use thiserror::Error;

/// Request rejected before any prompt is built.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("{0} required")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("batch of {size} items exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("batch is empty")]
    EmptyBatch,
}

impl ValidationError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

/// Failure talking to an external inference provider.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("{provider} credential is not configured")]
    MissingCredential { provider: &'static str },

    #[error("network error: {0}")]
    Network(String),

    #[error("authentication rejected by provider: {0}")]
    Authentication(String),

    #[error("provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),

    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

/// Errors surfaced by the pipeline. Extraction problems never appear here.
#[derive(Error, Debug, Clone)]
pub enum FlowError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("inference failed: {0}")]
    Provider(#[from] ProviderError),
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("push channel closed")]
    ChannelClosed,

    #[error("failed to serialize push message: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
