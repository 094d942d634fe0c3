//! Broker notifications.

use std::sync::Arc;

use async_trait::async_trait;
use brokersync_core::{
    BrokerClient, CatalogFetcher, CreateBrokerRequest, DeleteBrokerRequest, DesiredBroker,
    UpdateBrokerRequest,
};
use brokersync_events::NotificationPayload;
use tracing::{debug, info, warn};

use super::{ResourceHandler, decode_resource, require};
use crate::error::Result;
use crate::types::ReconcilerConfig;

/// Mirrors registry broker changes as proxy registrations.
pub struct BrokerHandler {
    client: Arc<dyn BrokerClient>,
    catalog: Option<Arc<dyn CatalogFetcher>>,
    config: ReconcilerConfig,
}

impl BrokerHandler {
    /// Create a handler.
    pub fn new(
        client: Arc<dyn BrokerClient>,
        catalog: Option<Arc<dyn CatalogFetcher>>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            client,
            catalog,
            config,
        }
    }

    fn is_blacklisted(&self, broker: &DesiredBroker) -> bool {
        let blacklisted = self.config.blacklist.contains(&broker.name);
        if blacklisted {
            debug!(broker_name = %broker.name, "Broker is blacklisted, ignoring");
        }
        blacklisted
    }
}

#[async_trait]
impl ResourceHandler for BrokerHandler {
    async fn on_create(&self, payload: &NotificationPayload) -> Result<()> {
        let broker: DesiredBroker = decode_resource(require(payload.new.as_ref(), "new")?, "new")?;
        if self.is_blacklisted(&broker) {
            return Ok(());
        }

        let naming = &self.config.naming;
        let name = naming.proxy_name_for(&broker);
        let broker_url = naming.proxy_url(&broker.id);

        if let Some(existing) = self.client.get_broker_by_name(&name).await? {
            let request = UpdateBrokerRequest {
                id: broker.id,
                guid: existing.guid,
                name,
                broker_url,
            };
            if existing.broker_url == request.broker_url {
                info!(broker_name = %request.name, "Broker already registered, refetching catalog");
                if let Some(catalog) = &self.catalog {
                    catalog.fetch(&request).await?;
                }
            } else {
                info!(broker_name = %request.name, "Repointing existing registration");
                self.client.update_broker(&request).await?;
            }
            return Ok(());
        }

        if self.config.takeover_enabled {
            if let Some(existing) = self.client.get_broker_by_name(&broker.name).await? {
                if existing.broker_url == broker.broker_url {
                    info!(
                        broker_name = %broker.name,
                        guid = %existing.guid,
                        "Taking over unmanaged broker"
                    );
                    self.client
                        .update_broker(&UpdateBrokerRequest {
                            id: broker.id,
                            guid: existing.guid,
                            name,
                            broker_url,
                        })
                        .await?;
                    return Ok(());
                }
                debug!(
                    broker_name = %broker.name,
                    "Unmanaged broker with same name points elsewhere, not taking over"
                );
            }
        }

        info!(broker_name = %name, "Registering broker");
        self.client
            .create_broker(&CreateBrokerRequest {
                id: broker.id,
                name,
                broker_url,
            })
            .await?;
        Ok(())
    }

    async fn on_update(&self, payload: &NotificationPayload) -> Result<()> {
        let old: DesiredBroker = decode_resource(require(payload.old.as_ref(), "old")?, "old")?;
        let new: DesiredBroker = decode_resource(require(payload.new.as_ref(), "new")?, "new")?;
        if self.is_blacklisted(&old) || self.is_blacklisted(&new) {
            return Ok(());
        }

        let naming = &self.config.naming;
        let old_name = naming.proxy_name_for(&old);
        let Some(existing) = self.client.get_broker_by_name(&old_name).await? else {
            warn!(
                broker_name = %old_name,
                "Updated broker is not registered, leaving it to the next resync"
            );
            return Ok(());
        };

        let request = UpdateBrokerRequest {
            id: new.id.clone(),
            guid: existing.guid,
            name: naming.proxy_name_for(&new),
            broker_url: naming.proxy_url(&new.id),
        };
        info!(from = %old_name, to = %request.name, "Updating broker registration");
        self.client.update_broker(&request).await?;
        Ok(())
    }

    async fn on_delete(&self, payload: &NotificationPayload) -> Result<()> {
        let old: DesiredBroker = decode_resource(require(payload.old.as_ref(), "old")?, "old")?;
        if self.is_blacklisted(&old) {
            return Ok(());
        }

        let name = self.config.naming.proxy_name_for(&old);
        let Some(existing) = self.client.get_broker_by_name(&name).await? else {
            debug!(broker_name = %name, "Deleted broker was not registered");
            return Ok(());
        };

        info!(broker_name = %name, "Removing broker registration");
        self.client
            .delete_broker(&DeleteBrokerRequest {
                id: old.id,
                guid: existing.guid,
                name,
            })
            .await?;
        Ok(())
    }
}
