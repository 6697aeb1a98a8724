//! Error types for building and reconciling.

use dockform_engine::EngineError;
use thiserror::Error;

/// Result type alias for reconcile operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;

/// A container parameter set that cannot be turned into a create request.
///
/// Build errors are fatal for the invocation; no partial request is ever
/// returned alongside one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    /// Size string with an unknown suffix or a non-numeric amount.
    #[error("invalid size {0:?}: expected <N>Mi, <N>Gi or a byte count")]
    InvalidSize(String),

    /// CPU quantity that is neither decimal cores nor `<N>m`.
    #[error("invalid cpu quantity {0:?}")]
    InvalidCpu(String),

    /// Duration humantime cannot parse.
    #[error("invalid duration {value:?} for {field}: {reason}")]
    InvalidDuration {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
        /// Parser message.
        reason: String,
    },

    /// Health check block with an empty test command.
    #[error("health check test command is required")]
    EmptyHealthCheck,

    /// Volume mount with no usable source.
    #[error("unsupported volume source for volume {0}")]
    UnsupportedVolumeSource(String),

    /// Bind mount without a source path.
    #[error("bind mount for volume {0} has no source path")]
    MissingBindSource(String),

    /// Environment entry whose external reference was not resolved first.
    #[error("environment variable {0} references an unresolved value")]
    UnresolvedEnv(String),

    /// `runAsNonRoot` set together with uid 0.
    #[error("runAsNonRoot is set but runAsUser is 0")]
    RunAsRoot,

    /// Image reference is empty.
    #[error("image is required")]
    MissingImage,
}

/// Failure looking up a referenced value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// Referenced object or key does not exist.
    #[error("{kind} {namespace}/{name} has no key {key:?}")]
    Missing {
        /// `configmap` or `secret`.
        kind: &'static str,
        /// Namespace.
        namespace: String,
        /// Object name.
        name: String,
        /// Key.
        key: String,
    },

    /// Reference names neither a config map nor a secret.
    #[error("reference for {0} names no source")]
    EmptyReference(String),

    /// Backend failure.
    #[error("value lookup failed: {0}")]
    Backend(String),
}

/// Errors that can occur while reconciling a record.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Parameters could not be turned into an engine request.
    #[error("cannot build container configuration: {0}")]
    Build(#[from] BuildError),

    /// Engine call failed.
    #[error("cannot {operation} {id}: {source}")]
    Engine {
        /// Operation, e.g. `inspect container`.
        operation: &'static str,
        /// Object identity.
        id: String,
        /// Underlying error.
        #[source]
        source: EngineError,
    },

    /// The kind does not support in-place updates.
    #[error("{0} update is not implemented; delete and recreate it")]
    UpdateNotSupported(&'static str),

    /// A referenced value could not be resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The invocation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// The record itself is malformed.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Children depend on each other in a cycle.
    #[error("dependency cycle between services: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
}

impl ReconcileError {
    /// Wraps an engine error with operation and object identity.
    #[must_use]
    pub fn engine(operation: &'static str, id: impl Into<String>, source: EngineError) -> Self {
        Self::Engine {
            operation,
            id: id.into(),
            source,
        }
    }

    /// Returns true if this wraps an engine not-found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Engine { source, .. } if source.is_not_found())
    }

    /// Returns true if the kind refused an in-place update.
    #[must_use]
    pub const fn is_update_not_supported(&self) -> bool {
        matches!(self, Self::UpdateNotSupported(_))
    }
}

/// Extension for attaching operation context to engine results.
pub(crate) trait EngineResultExt<T> {
    fn during(self, operation: &'static str, id: &str) -> Result<T>;
}

impl<T> EngineResultExt<T> for std::result::Result<T, EngineError> {
    fn during(self, operation: &'static str, id: &str) -> Result<T> {
        self.map_err(|e| ReconcileError::engine(operation, id, e))
    }
}
