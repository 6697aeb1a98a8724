//! Error types for engine operations.

use std::time::Duration;
use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Kind of engine object an operation addressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Container.
    Container,
    /// Volume.
    Volume,
    /// Network.
    Network,
    /// Image.
    Image,
}

/// Errors that can occur talking to the container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Container not found.
    #[error("No such container: {0}")]
    ContainerNotFound(String),

    /// Volume not found.
    #[error("No such volume: {0}")]
    VolumeNotFound(String),

    /// Network not found.
    #[error("No such network: {0}")]
    NetworkNotFound(String),

    /// Image not found.
    #[error("No such image: {0}")]
    ImageNotFound(String),

    /// Invalid parameter.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Conflict (e.g., name already in use).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other non-success response from the engine.
    #[error("engine returned {status}: {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Engine-provided message.
        message: String,
    },

    /// Connection or protocol failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded the configured timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Request or response body could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid client configuration.
    #[error("invalid engine configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// Creates a not-found error for the given object kind.
    #[must_use]
    pub fn not_found(kind: ObjectKind, id: impl Into<String>) -> Self {
        let id = id.into();
        match kind {
            ObjectKind::Container => Self::ContainerNotFound(id),
            ObjectKind::Volume => Self::VolumeNotFound(id),
            ObjectKind::Network => Self::NetworkNotFound(id),
            ObjectKind::Image => Self::ImageNotFound(id),
        }
    }

    /// Maps an engine HTTP status and message to an error.
    #[must_use]
    pub fn from_status(status: u16, message: String, kind: ObjectKind, id: &str) -> Self {
        match status {
            404 => {
                // A 404 while creating a container means the image is missing,
                // which must not be confused with the container being gone.
                if message.contains("No such image") {
                    Self::ImageNotFound(message)
                } else {
                    Self::not_found(kind, id)
                }
            }
            409 => Self::Conflict(message),
            400 => Self::InvalidParameter(message),
            _ => Self::Api { status, message },
        }
    }

    /// Returns true if the addressed object does not exist.
    ///
    /// A missing image is not counted: it is a failure to create, not a
    /// signal that the object needs creating.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ContainerNotFound(_) | Self::VolumeNotFound(_) | Self::NetworkNotFound(_)
        )
    }

    /// Returns true if this is a conflict error.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
