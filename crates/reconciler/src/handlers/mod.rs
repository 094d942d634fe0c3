//! Per-resource notification handlers.

use async_trait::async_trait;
use brokersync_events::{NotificationPayload, ResourceEnvelope};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub mod brokers;
pub mod visibilities;

pub use brokers::BrokerHandler;
pub use visibilities::VisibilityHandler;

/// Applies one kind of resource change to the platform.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// A resource was created; `payload.new` holds it.
    async fn on_create(&self, payload: &NotificationPayload) -> Result<()>;

    /// A resource changed; `payload.old` and `payload.new` hold both versions.
    async fn on_update(&self, payload: &NotificationPayload) -> Result<()>;

    /// A resource was deleted; `payload.old` holds it.
    async fn on_delete(&self, payload: &NotificationPayload) -> Result<()>;
}

fn require<'a>(envelope: Option<&'a ResourceEnvelope>, side: &str) -> Result<&'a ResourceEnvelope> {
    envelope.ok_or_else(|| Error::invalid_payload(format!("missing '{side}' resource")))
}

fn decode_resource<T: DeserializeOwned>(envelope: &ResourceEnvelope, side: &str) -> Result<T> {
    envelope
        .resource()
        .map_err(|e| Error::invalid_payload(format!("bad '{side}' resource: {e}")))
}

fn decode_additional<T: DeserializeOwned>(envelope: &ResourceEnvelope, side: &str) -> Result<T> {
    envelope
        .additional()
        .map_err(|e| Error::invalid_payload(format!("bad '{side}' additional data: {e}")))
}
