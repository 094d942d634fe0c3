//! Core types for the notification stream.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Position marker in the change-notification stream.
///
/// Revisions assigned by the server are non-negative and strictly increasing.
/// [`Revision::UNKNOWN`] means no position is known yet, which makes the next
/// connection start fresh and forces a resync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(i64);

impl Revision {
    /// No position known.
    pub const UNKNOWN: Self = Self(-1);

    /// Create a revision from its wire value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// The wire value.
    pub const fn value(self) -> i64 {
        self.0
    }

    /// Whether this is a real server position.
    pub const fn is_known(self) -> bool {
        self.0 >= 0
    }
}

impl Default for Revision {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "unknown")
        }
    }
}

/// Kind of resource a notification is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResourceType {
    /// `/v1/service_brokers`
    ServiceBrokers,
    /// `/v1/visibilities`
    Visibilities,
    /// Anything the agent does not reconcile.
    Other(String),
}

impl ResourceType {
    /// Wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServiceBrokers => "/v1/service_brokers",
            Self::Visibilities => "/v1/visibilities",
            Self::Other(other) => other,
        }
    }
}

impl From<String> for ResourceType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "/v1/service_brokers" => Self::ServiceBrokers,
            "/v1/visibilities" => Self::Visibilities,
            _ => Self::Other(value),
        }
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    Created,
    Modified,
    Deleted,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Modified => write!(f, "MODIFIED"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

/// How a label changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelOperation {
    Add,
    AddValues,
    Remove,
    RemoveValues,
}

impl LabelOperation {
    /// Whether values are being added.
    pub const fn is_addition(self) -> bool {
        matches!(self, Self::Add | Self::AddValues)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_revision_sentinel() {
        assert!(!Revision::UNKNOWN.is_known());
        assert!(Revision::new(0).is_known());
        assert_eq!(Revision::default(), Revision::UNKNOWN);
        assert_eq!(Revision::UNKNOWN.to_string(), "unknown");
        assert_eq!(Revision::new(42).to_string(), "42");
    }

    #[test]
    fn test_resource_type_round_trips_unknown_names() {
        let known: ResourceType = serde_json::from_str("\"/v1/visibilities\"").unwrap();
        assert_eq!(known, ResourceType::Visibilities);

        let other: ResourceType = serde_json::from_str("\"/v1/platforms\"").unwrap();
        assert_eq!(other, ResourceType::Other("/v1/platforms".to_string()));
        assert_eq!(serde_json::to_string(&other).unwrap(), "\"/v1/platforms\"");
    }

    #[test]
    fn test_operation_wire_names() {
        let op: Operation = serde_json::from_str("\"MODIFIED\"").unwrap();
        assert_eq!(op, Operation::Modified);
    }

    #[test]
    fn test_label_operation_wire_names() {
        let op: LabelOperation = serde_json::from_str("\"remove_values\"").unwrap();
        assert_eq!(op, LabelOperation::RemoveValues);
        assert!(!op.is_addition());
        assert!(LabelOperation::AddValues.is_addition());
    }
}
