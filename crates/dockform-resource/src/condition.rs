//! Record conditions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Condition type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// Whether the engine object is usable.
    Ready,
    /// Whether the last reconcile succeeded.
    Synced,
}

/// Condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    /// Condition holds.
    True,
    /// Condition does not hold.
    False,
    /// Not yet known.
    Unknown,
}

/// Machine-readable reason for a condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Reason {
    /// Object exists and is usable.
    Available,
    /// Object exists but is not usable.
    Unavailable,
    /// Object is being created or is converging.
    Creating,
    /// Object is being deleted.
    Deleting,
    /// Last reconcile succeeded.
    ReconcileSuccess,
    /// Last reconcile failed.
    ReconcileError,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Available => "Available",
            Self::Unavailable => "Unavailable",
            Self::Creating => "Creating",
            Self::Deleting => "Deleting",
            Self::ReconcileSuccess => "ReconcileSuccess",
            Self::ReconcileError => "ReconcileError",
        };
        write!(f, "{s}")
    }
}

/// A condition on a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type.
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    /// Status.
    pub status: ConditionStatus,
    /// Reason.
    pub reason: Reason,
    /// Human readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When status or reason last changed.
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    fn new(condition_type: ConditionType, status: ConditionStatus, reason: Reason) -> Self {
        Self {
            condition_type,
            status,
            reason,
            message: None,
            last_transition_time: Utc::now(),
        }
    }

    /// Ready: the object is available.
    #[must_use]
    pub fn available() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::True, Reason::Available)
    }

    /// Ready: the object exists but is not usable.
    #[must_use]
    pub fn unavailable() -> Self {
        Self::new(
            ConditionType::Ready,
            ConditionStatus::False,
            Reason::Unavailable,
        )
    }

    /// Ready: the object is being created.
    #[must_use]
    pub fn creating() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, Reason::Creating)
    }

    /// Ready: the object is being deleted.
    #[must_use]
    pub fn deleting() -> Self {
        Self::new(ConditionType::Ready, ConditionStatus::False, Reason::Deleting)
    }

    /// Synced: the last reconcile succeeded.
    #[must_use]
    pub fn reconcile_success() -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::True,
            Reason::ReconcileSuccess,
        )
    }

    /// Synced: the last reconcile failed.
    #[must_use]
    pub fn reconcile_error(message: impl Into<String>) -> Self {
        Self::new(
            ConditionType::Synced,
            ConditionStatus::False,
            Reason::ReconcileError,
        )
        .with_message(message)
    }

    /// Attaches a message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns true if the status is `True`.
    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }

    /// Returns true if both conditions carry the same type, status and reason.
    #[must_use]
    pub fn same_state(&self, other: &Self) -> bool {
        self.condition_type == other.condition_type
            && self.status == other.status
            && self.reason == other.reason
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        assert!(Condition::available().is_true());
        assert!(!Condition::unavailable().is_true());
        assert_eq!(Condition::creating().reason, Reason::Creating);
        assert_eq!(Condition::deleting().reason, Reason::Deleting);

        let err = Condition::reconcile_error("boom");
        assert_eq!(err.condition_type, ConditionType::Synced);
        assert_eq!(err.message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(Condition::unavailable().with_message("dead")).unwrap();
        assert_eq!(value["type"], "Ready");
        assert_eq!(value["status"], "False");
        assert_eq!(value["reason"], "Unavailable");
        assert_eq!(value["message"], "dead");
        assert!(value.get("lastTransitionTime").is_some());
    }
}
