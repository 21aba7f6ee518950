use thiserror::Error;

use crate::types::SubscriptionId;

pub type Result<T, E = RegistryError> = std::result::Result<T, E>;

/// Errors returned by registry operations.
///
/// Delivery failures are *not* represented here: they are reported per
/// subscription through [`DeliveryError`] and never fail a `tell`.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Malformed input; `field` names the offending parameter.
    #[error("invalid `{field}`: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// Operation targeted a subscription that does not exist.
    #[error("unable to find webhook with id {0}")]
    NotFound(SubscriptionId),

    /// Persistence backend failure.
    #[error("store error: {0}")]
    Store(String),

    /// Registry was assembled with unusable settings.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl RegistryError {
    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistryError::Validation { .. } => "validation",
            RegistryError::NotFound(_) => "not_found",
            RegistryError::Store(_) => "store",
            RegistryError::Configuration(_) => "configuration",
        }
    }
}

/// Why delivering to a single subscription failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("remote endpoint returned status {0}")]
    Status(u16),

    /// Request could not be built (bad URL, header, or body). Not retried.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("gave up after {attempts} attempt(s): {last}")]
    MaxRetriesExceeded {
        attempts: u32,
        last: Box<DeliveryError>,
    },

    /// Delivery task ended without producing a result.
    #[error("delivery aborted: {0}")]
    Aborted(String),
}

impl DeliveryError {
    /// Every transport-level failure is retried; only requests that can
    /// never succeed are not.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DeliveryError::InvalidRequest(_)
                | DeliveryError::MaxRetriesExceeded { .. }
                | DeliveryError::Aborted(_)
        )
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            DeliveryError::Timeout => "timeout",
            DeliveryError::Network(_) => "network",
            DeliveryError::Status(_) => "status",
            DeliveryError::InvalidRequest(_) => "invalid_request",
            DeliveryError::MaxRetriesExceeded { .. } => "max_retries_exceeded",
            DeliveryError::Aborted(_) => "aborted",
        }
    }
}
