//! Registry of live notification stream connections.
//!
//! Owned by the producer. Each connection registers when the upgrade succeeds
//! and unregisters when it is torn down, so the set only ever holds sockets
//! that are currently open.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::types::Revision;

/// Snapshot of one live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub id: Uuid,
    pub url: String,
    /// Last revision forwarded on this connection.
    pub revision: Revision,
    pub connected_at: DateTime<Utc>,
}

/// Live connections keyed by id.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<Uuid, ConnectionInfo>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly opened connection and return its id.
    pub async fn register(&self, url: impl Into<String>, revision: Revision) -> Uuid {
        let id = Uuid::new_v4();
        let info = ConnectionInfo {
            id,
            url: url.into(),
            revision,
            connected_at: Utc::now(),
        };
        self.connections.write().await.insert(id, info);
        id
    }

    /// Advance the revision recorded for a connection.
    pub async fn update_revision(&self, id: Uuid, revision: Revision) {
        if let Some(info) = self.connections.write().await.get_mut(&id) {
            info.revision = revision;
        }
    }

    /// Forget a connection. Unknown ids are ignored.
    pub async fn unregister(&self, id: Uuid) {
        self.connections.write().await.remove(&id);
    }

    /// Snapshot of every live connection.
    pub async fn active(&self) -> Vec<ConnectionInfo> {
        self.connections.read().await.values().cloned().collect()
    }

    /// Number of live connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Whether no connection is live.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }
}
