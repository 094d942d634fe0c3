//! Notification consumer.
//!
//! Routes each notification to the handler for its resource kind inside a
//! span tagged with the notification's correlation id.

use std::sync::Arc;

use brokersync_core::Platform;
use brokersync_events::{Notification, Operation, ResourceType};
use tracing::{Instrument, debug, info_span, warn};

use crate::error::Result;
use crate::handlers::{BrokerHandler, ResourceHandler, VisibilityHandler};
use crate::types::ReconcilerConfig;

/// Applies single notifications to the platform.
pub struct NotificationConsumer {
    brokers: Option<Arc<dyn ResourceHandler>>,
    visibilities: Option<Arc<dyn ResourceHandler>>,
}

impl NotificationConsumer {
    /// Wire handlers for every capability the platform offers.
    pub fn new(platform: &dyn Platform, config: &ReconcilerConfig) -> Self {
        let brokers = platform.brokers().map(|client| {
            Arc::new(BrokerHandler::new(client, platform.catalog(), config.clone()))
                as Arc<dyn ResourceHandler>
        });
        let visibilities = platform.visibilities().map(|client| {
            Arc::new(VisibilityHandler::new(client, config.clone())) as Arc<dyn ResourceHandler>
        });
        Self {
            brokers,
            visibilities,
        }
    }

    /// Use explicit handlers.
    pub fn with_handlers(
        brokers: Option<Arc<dyn ResourceHandler>>,
        visibilities: Option<Arc<dyn ResourceHandler>>,
    ) -> Self {
        Self {
            brokers,
            visibilities,
        }
    }

    fn handler(&self, resource: &ResourceType) -> Option<&dyn ResourceHandler> {
        match resource {
            ResourceType::ServiceBrokers => self.brokers.as_deref(),
            ResourceType::Visibilities => self.visibilities.as_deref(),
            ResourceType::Other(_) => None,
        }
    }

    /// Apply one notification.
    ///
    /// Failures are logged here and also returned; the notification is not
    /// retried since the next resync repairs whatever it missed.
    pub async fn consume(&self, notification: &Notification) -> Result<()> {
        let span = info_span!(
            "consume",
            correlation_id = %notification.correlation_id(),
            revision = %notification.revision,
            resource = %notification.resource,
            operation = %notification.operation,
        );

        async {
            let Some(handler) = self.handler(&notification.resource) else {
                debug!("No handler for resource, ignoring notification");
                return Ok(());
            };

            let payload = &notification.payload;
            let result = match notification.operation {
                Operation::Created => handler.on_create(payload).await,
                Operation::Modified => handler.on_update(payload).await,
                Operation::Deleted => handler.on_delete(payload).await,
            };
            if let Err(e) = &result {
                warn!(error = %e, "Notification could not be applied");
            }
            result
        }
        .instrument(span)
        .await
    }
}
