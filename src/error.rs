//! Error types for the sharing provider.

use thiserror::Error;

/// Errors that can occur while managing provider resources.
///
/// Errors returned by a [`RecipientsApi`](crate::sharing::RecipientsApi)
/// implementation are passed through the lifecycle operations unchanged.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The remote service has no recipient by that name.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The configuration failed schema validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An error reported by the remote service that fits no other variant.
    #[error("API error: {0}")]
    Api(String),

    /// The provider configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No resource of that type is served by this provider.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// State or a response could not be converted to or from JSON.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A recipient with that name already exists.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    /// The caller may not perform the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Rate limited or over quota.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The remote service is temporarily down.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Operation timed out.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),

    /// Invalid request from the host (e.g. state without an identifier).
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// An owner change was applied, the remaining update failed, and the
    /// compensating owner update failed as well.
    ///
    /// The remote resource may now carry either owner; it needs manual
    /// reconciliation.
    #[error(
        "{source}. Owner was changed from {previous_owner:?} to {desired_owner:?}, \
         but rolling it back failed: {rollback}"
    )]
    OwnerRollback {
        /// The failure of the non-owner update.
        source: Box<ProviderError>,
        /// The failure of the compensating owner update.
        rollback: Box<ProviderError>,
        /// The owner recorded before the update started.
        previous_owner: String,
        /// The owner the update tried to apply.
        desired_owner: String,
    },
}

impl ProviderError {
    /// The message without the variant prefix.
    ///
    /// For [`OwnerRollback`](Self::OwnerRollback) this is the message of the
    /// update failure that triggered the rollback.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg)
            | Self::Validation(msg)
            | Self::Api(msg)
            | Self::Configuration(msg)
            | Self::UnknownResource(msg)
            | Self::AlreadyExists(msg)
            | Self::PermissionDenied(msg)
            | Self::ResourceExhausted(msg)
            | Self::Unavailable(msg)
            | Self::DeadlineExceeded(msg)
            | Self::InvalidRequest(msg) => msg,
            Self::Serialization(_) => "malformed JSON state",
            Self::OwnerRollback { source, .. } => source.message(),
        }
    }

    /// Whether the remote side reported the resource as missing.
    ///
    /// Hosts use this to drop a resource from state after a read.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
