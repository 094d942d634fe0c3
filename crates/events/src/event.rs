//! Notification and message types.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::types::{LabelOperation, Operation, ResourceType, Revision};

/// A single change notification as delivered by the stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub revision: Revision,
    pub resource: ResourceType,
    #[serde(rename = "type")]
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub payload: NotificationPayload,
}

impl Notification {
    /// Id used to trace everything this notification causes.
    pub fn correlation_id(&self) -> &str {
        self.correlation_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .unwrap_or(&self.id)
    }
}

/// Old/new resource snapshots plus label deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old: Option<ResourceEnvelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new: Option<ResourceEnvelope>,
    #[serde(default)]
    pub label_changes: Vec<LabelChange>,
}

/// A resource snapshot with any additional context the server attached.
///
/// Both parts stay raw until a handler decodes them into the shape it expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceEnvelope {
    #[serde(default)]
    pub resource: serde_json::Value,
    #[serde(default)]
    pub additional: serde_json::Value,
}

impl ResourceEnvelope {
    /// Decode the resource part.
    pub fn resource<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.resource)
    }

    /// Decode the additional part.
    pub fn additional<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.additional)
    }
}

/// One label delta.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelChange {
    pub op: LabelOperation,
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Unit of work handed from the producer to the reconciler.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Apply a single change.
    Notification(Notification),
    /// Run a full reconciliation.
    ResyncRequested,
}

impl Message {
    /// Whether this message asks for a full resync.
    pub const fn is_resync(&self) -> bool {
        matches!(self, Self::ResyncRequested)
    }

    /// Revision of the carried notification, if any.
    pub fn revision(&self) -> Option<Revision> {
        match self {
            Self::Notification(notification) => Some(notification.revision),
            Self::ResyncRequested => None,
        }
    }
}
