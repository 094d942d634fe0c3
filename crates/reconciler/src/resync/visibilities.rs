//! Visibility reconciliation.
//!
//! Desired and observed visibilities are reduced to maps keyed by
//! [`VisibilityKey`]. There is no update verb on the platform, so a key that
//! exists on both sides is left untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use brokersync_core::{
    BrokerNaming, DesiredBroker, RegistryVisibility, ServiceOffering, ServicePlan, Visibility,
    VisibilityClient, VisibilityKey,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::executor::BoundedExecutor;
use crate::types::VisibilityPlan;

/// Registry state needed to place a visibility on a platform broker.
#[derive(Debug, Clone, Copy)]
pub struct Catalog<'a> {
    pub brokers: &'a [DesiredBroker],
    pub offerings: &'a [ServiceOffering],
    pub plans: &'a [ServicePlan],
}

/// Translate registry visibilities into platform visibility records.
///
/// A visibility without a platform id, or on a platform without a scope
/// label, becomes one public record. Otherwise every value of the scope label
/// becomes its own scoped record. Visibilities of plans outside `catalog`
/// are dropped.
pub fn translate(
    naming: &BrokerNaming,
    scope_key: &str,
    catalog: Catalog<'_>,
    visibilities: &[RegistryVisibility],
) -> Vec<Visibility> {
    let brokers: HashMap<&str, &DesiredBroker> =
        catalog.brokers.iter().map(|b| (b.id.as_str(), b)).collect();
    let offerings: HashMap<&str, &ServiceOffering> =
        catalog.offerings.iter().map(|o| (o.id.as_str(), o)).collect();
    let plans: HashMap<&str, &ServicePlan> =
        catalog.plans.iter().map(|p| (p.id.as_str(), p)).collect();

    let mut records = Vec::new();
    for visibility in visibilities {
        let Some(plan) = plans.get(visibility.service_plan_id.as_str()) else {
            trace!(plan_id = %visibility.service_plan_id, "Visibility for unknown plan, skipping");
            continue;
        };
        let Some(broker) = offerings
            .get(plan.service_offering_id.as_str())
            .and_then(|offering| brokers.get(offering.broker_id.as_str()))
        else {
            trace!(plan_id = %plan.id, "Plan without a synced broker, skipping");
            continue;
        };
        let broker_name = naming.proxy_name_for(broker);

        if scope_key.is_empty() || visibility.platform_id.is_empty() {
            records.push(Visibility::public(broker_name, &plan.catalog_id));
        } else {
            records.extend(
                visibility
                    .labels
                    .get(scope_key)
                    .into_iter()
                    .flatten()
                    .map(|value| {
                        Visibility::scoped(&broker_name, &plan.catalog_id, scope_key, value)
                    }),
            );
        }
    }
    records
}

/// Diff desired against observed visibilities.
pub fn plan(scope_key: &str, desired: &[Visibility], observed: &[Visibility]) -> VisibilityPlan {
    let desired: BTreeMap<VisibilityKey, &Visibility> =
        desired.iter().map(|v| (v.key(scope_key), v)).collect();
    let observed: BTreeMap<VisibilityKey, &Visibility> =
        observed.iter().map(|v| (v.key(scope_key), v)).collect();

    VisibilityPlan {
        to_disable: observed
            .iter()
            .filter(|(key, _)| !desired.contains_key(*key))
            .map(|(_, v)| (*v).clone())
            .collect(),
        to_enable: desired
            .iter()
            .filter(|(key, _)| !observed.contains_key(*key))
            .map(|(_, v)| (*v).clone())
            .collect(),
    }
}

/// Counts from applying a visibility plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityOutcome {
    pub disabled: usize,
    pub enabled: usize,
    pub failures: Vec<String>,
}

/// Apply a plan: disable first, then enable, each as one bounded fan-out.
///
/// A failure aborts only its own phase. Cancellation aborts both.
pub async fn apply(
    token: &CancellationToken,
    executor: BoundedExecutor,
    client: Arc<dyn VisibilityClient>,
    plan: VisibilityPlan,
) -> Result<VisibilityOutcome> {
    let mut outcome = VisibilityOutcome::default();

    let to_disable = plan.to_disable.len();
    debug!(count = to_disable, "Disabling visibilities");
    match run_phase(token, executor, Arc::clone(&client), plan.to_disable, false).await {
        Ok(()) => outcome.disabled = to_disable,
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => outcome.failures.push(format!("disable visibilities: {e}")),
    }

    let to_enable = plan.to_enable.len();
    debug!(count = to_enable, "Enabling visibilities");
    match run_phase(token, executor, client, plan.to_enable, true).await {
        Ok(()) => outcome.enabled = to_enable,
        Err(Error::Cancelled) => return Err(Error::Cancelled),
        Err(e) => outcome.failures.push(format!("enable visibilities: {e}")),
    }

    Ok(outcome)
}

async fn run_phase(
    token: &CancellationToken,
    executor: BoundedExecutor,
    client: Arc<dyn VisibilityClient>,
    visibilities: Vec<Visibility>,
    enable: bool,
) -> Result<()> {
    if visibilities.is_empty() {
        return Ok(());
    }
    executor
        .run(token, visibilities, move |visibility| {
            let client = Arc::clone(&client);
            async move {
                let request = visibility.to_access_request();
                if enable {
                    client.enable_access_for_plan(&request).await?;
                } else {
                    client.disable_access_for_plan(&request).await?;
                }
                trace!(visibility = %visibility.key(""), enable, "Visibility changed");
                Ok(())
            }
        })
        .await
        .map(|_| ())
}
