//! Error types for push delivery.

use thiserror::Error;

/// Errors from the durable subscription registry.
#[derive(Debug, Error)]
pub enum PushError {
    /// Durable storage read/write failed.
    #[error("subscription storage unavailable: {0}")]
    Storage(#[from] std::io::Error),

    /// Stored subscription list is not valid JSON.
    #[error("subscription storage corrupted: {0}")]
    Corrupted(#[from] serde_json::Error),
}

/// Per-target push delivery failure.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The endpoint is permanently invalid and should be deregistered.
    #[error("endpoint gone (status {status})")]
    Gone { status: u16 },

    /// The provider rejected the delivery; retryable on a later trigger.
    #[error("push rejected (status {status})")]
    Rejected { status: u16 },

    /// Transport-level failure (timeout, connect error).
    #[error("push request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl DeliveryError {
    /// Whether this failure means the target is confirmed dead.
    pub fn is_permanent(&self) -> bool {
        matches!(self, DeliveryError::Gone { .. })
    }
}
