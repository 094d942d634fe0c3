//! Visibility notifications.

use std::sync::Arc;

use async_trait::async_trait;
use brokersync_core::{Labels, ModifyPlanAccessRequest, RegistryVisibility, VisibilityClient};
use brokersync_events::{LabelChange, NotificationPayload, ResourceEnvelope};
use serde::Deserialize;
use tracing::{debug, info};

use super::{ResourceHandler, decode_additional, decode_resource, require};
use crate::error::{Error, Result};
use crate::types::ReconcilerConfig;

/// Context the registry attaches to a visibility notification.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisibilityAdditional {
    #[serde(default)]
    pub broker_id: String,
    #[serde(default)]
    pub broker_name: String,
    #[serde(default)]
    pub service_plan: PlanReference,
}

/// Plan a visibility applies to.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlanReference {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub catalog_id: String,
}

/// A decoded and validated visibility snapshot.
struct Snapshot {
    visibility: RegistryVisibility,
    additional: VisibilityAdditional,
}

impl Snapshot {
    fn decode(envelope: &ResourceEnvelope, side: &str) -> Result<Self> {
        let visibility: RegistryVisibility = decode_resource(envelope, side)?;
        let additional: VisibilityAdditional = decode_additional(envelope, side)?;

        if visibility.id.is_empty() {
            return Err(Error::invalid_payload(format!("'{side}' visibility has no id")));
        }
        if visibility.service_plan_id.is_empty() {
            return Err(Error::invalid_payload(format!(
                "'{side}' visibility {} has no plan id",
                visibility.id
            )));
        }
        if additional.service_plan.catalog_id.is_empty() || additional.broker_id.is_empty() {
            return Err(Error::invalid_payload(format!(
                "'{side}' visibility {} lacks plan catalog id or broker id",
                visibility.id
            )));
        }

        Ok(Self {
            visibility,
            additional,
        })
    }
}

/// Turns visibility changes into plan access grants and revocations.
pub struct VisibilityHandler {
    client: Arc<dyn VisibilityClient>,
    config: ReconcilerConfig,
}

impl VisibilityHandler {
    /// Create a handler.
    pub fn new(client: Arc<dyn VisibilityClient>, config: ReconcilerConfig) -> Self {
        Self { client, config }
    }

    fn is_blacklisted(&self, snapshot: &Snapshot) -> bool {
        let blacklisted = self.config.blacklist.contains(&snapshot.additional.broker_name);
        if blacklisted {
            debug!(
                broker_name = %snapshot.additional.broker_name,
                "Visibility of blacklisted broker, ignoring"
            );
        }
        blacklisted
    }

    fn request(&self, snapshot: &Snapshot, labels: Labels) -> ModifyPlanAccessRequest {
        ModifyPlanAccessRequest {
            broker_name: self
                .config
                .naming
                .proxy_name(&snapshot.additional.broker_name, &snapshot.additional.broker_id),
            catalog_plan_id: snapshot.additional.service_plan.catalog_id.clone(),
            labels,
        }
    }

    /// Labels that scope a visibility on this platform; empty means public.
    fn scope_labels(&self, visibility: &RegistryVisibility) -> Labels {
        let scope_key = self.client.visibility_scope_label_key();
        if scope_key.is_empty() || visibility.platform_id.is_empty() {
            return Labels::new();
        }
        visibility
            .labels
            .get(scope_key)
            .map(|values| Labels::from([(scope_key.to_string(), values.clone())]))
            .unwrap_or_default()
    }
}

/// Split label deltas into values to grant and values to revoke, per key.
pub fn label_delta(changes: &[LabelChange]) -> (Labels, Labels) {
    let mut to_add = Labels::new();
    let mut to_remove = Labels::new();
    for change in changes {
        let side = if change.op.is_addition() {
            &mut to_add
        } else {
            &mut to_remove
        };
        side.entry(change.key.clone())
            .or_default()
            .extend(change.values.iter().cloned());
    }
    (to_add, to_remove)
}

#[async_trait]
impl ResourceHandler for VisibilityHandler {
    async fn on_create(&self, payload: &NotificationPayload) -> Result<()> {
        let new = Snapshot::decode(require(payload.new.as_ref(), "new")?, "new")?;
        if self.is_blacklisted(&new) {
            return Ok(());
        }

        let request = self.request(&new, self.scope_labels(&new.visibility));
        info!(
            broker_name = %request.broker_name,
            plan = %request.catalog_plan_id,
            "Enabling plan access"
        );
        self.client.enable_access_for_plan(&request).await?;
        Ok(())
    }

    async fn on_update(&self, payload: &NotificationPayload) -> Result<()> {
        let old = Snapshot::decode(require(payload.old.as_ref(), "old")?, "old")?;
        let new = Snapshot::decode(require(payload.new.as_ref(), "new")?, "new")?;
        if self.is_blacklisted(&old) || self.is_blacklisted(&new) {
            return Ok(());
        }

        let (to_add, to_remove) = label_delta(&payload.label_changes);
        let became_public = new.visibility.platform_id.is_empty() && !old.visibility.platform_id.is_empty();
        let became_scoped = old.visibility.platform_id.is_empty() && !new.visibility.platform_id.is_empty();

        if !to_add.is_empty() || became_public {
            let request = self.request(&new, to_add);
            info!(
                broker_name = %request.broker_name,
                plan = %request.catalog_plan_id,
                public = became_public,
                "Enabling plan access"
            );
            self.client.enable_access_for_plan(&request).await?;
        }

        if !to_remove.is_empty() || became_scoped {
            let request = self.request(&new, to_remove);
            info!(
                broker_name = %request.broker_name,
                plan = %request.catalog_plan_id,
                "Disabling plan access"
            );
            self.client.disable_access_for_plan(&request).await?;
        }

        Ok(())
    }

    async fn on_delete(&self, payload: &NotificationPayload) -> Result<()> {
        let old = Snapshot::decode(require(payload.old.as_ref(), "old")?, "old")?;
        if self.is_blacklisted(&old) {
            return Ok(());
        }

        let request = self.request(&old, self.scope_labels(&old.visibility));
        info!(
            broker_name = %request.broker_name,
            plan = %request.catalog_plan_id,
            "Disabling plan access"
        );
        self.client.disable_access_for_plan(&request).await?;
        Ok(())
    }
}
