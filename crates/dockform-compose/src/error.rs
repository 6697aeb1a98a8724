//! Compose error types.

use dockform_reconcile::{ReconcileError, ResolveError};
use thiserror::Error;

/// Result type alias for compose operations.
pub type Result<T> = std::result::Result<T, ComposeError>;

/// Errors that can occur while planning or reconciling a stack.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The document is not valid YAML or does not match the compose shape.
    #[error("cannot parse compose document: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// The document parsed but describes something unusable.
    #[error("invalid compose document: {0}")]
    Validation(String),

    /// `depends_on` edges form a cycle through these services.
    #[error("dependency cycle between services: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),

    /// A child container, network or volume operation failed.
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    /// The document, an env file or an environment value could not be
    /// resolved.
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

impl ComposeError {
    /// Shorthand for [`ComposeError::Validation`].
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<ComposeError> for ReconcileError {
    fn from(err: ComposeError) -> Self {
        match err {
            ComposeError::Reconcile(inner) => inner,
            ComposeError::Resolve(inner) => Self::Resolve(inner),
            ComposeError::DependencyCycle(services) => Self::DependencyCycle(services),
            other => Self::InvalidRecord(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_lists_services() {
        let err = ComposeError::DependencyCycle(vec!["api".into(), "db".into()]);
        assert_eq!(err.to_string(), "dependency cycle between services: api, db");
    }

    #[test]
    fn test_into_reconcile_error() {
        let err: ReconcileError = ComposeError::validation("no services").into();
        assert!(matches!(err, ReconcileError::InvalidRecord(ref m) if m.contains("no services")));

        let err: ReconcileError = ComposeError::Reconcile(ReconcileError::Cancelled).into();
        assert!(matches!(err, ReconcileError::Cancelled));
    }

    #[test]
    fn test_cycle_stays_distinct() {
        let err: ReconcileError =
            ComposeError::DependencyCycle(vec!["api".into(), "db".into()]).into();
        assert!(matches!(err, ReconcileError::DependencyCycle(ref s) if s == &["api", "db"]));
        assert_eq!(err.to_string(), "dependency cycle between services: api, db");
    }
}
