//! Broker reconciliation.
//!
//! Observed registrations are indexed three ways: owned ones by the registry
//! id their URL points at, and the rest by name and by (name, URL). Each
//! desired broker claims at most one registration; owned registrations left
//! unclaimed are orphans and get deleted.

use std::collections::{BTreeMap, HashMap};

use brokersync_core::{
    BrokerClient, CatalogFetcher, CreateBrokerRequest, DeleteBrokerRequest, DesiredBroker,
    PlatformBroker, UpdateBrokerRequest,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::types::{BrokerAction, ReconcilerConfig};

/// Compute the actions that bring `observed` in line with `desired`.
pub fn plan(
    config: &ReconcilerConfig,
    desired: &[DesiredBroker],
    observed: &[PlatformBroker],
) -> Vec<BrokerAction> {
    let naming = &config.naming;

    let mut owned: BTreeMap<String, PlatformBroker> = BTreeMap::new();
    let mut unmanaged: Vec<Option<PlatformBroker>> = Vec::new();
    for broker in observed {
        if config.is_blacklisted_registration(broker) {
            continue;
        }
        match naming.owned_broker_id(&broker.broker_url) {
            Some(id) => {
                owned.entry(id).or_insert_with(|| broker.clone());
            }
            None => unmanaged.push(Some(broker.clone())),
        }
    }

    let mut by_name: HashMap<String, usize> = HashMap::new();
    let mut by_name_url: HashMap<(String, String), usize> = HashMap::new();
    for (index, broker) in unmanaged.iter().enumerate() {
        if let Some(broker) = broker {
            by_name.entry(broker.name.clone()).or_insert(index);
            by_name_url
                .entry((broker.name.clone(), broker.broker_url.clone()))
                .or_insert(index);
        }
    }

    let mut actions = Vec::new();
    for broker in desired.iter().filter(|b| !config.blacklist.contains(&b.name)) {
        let name = naming.proxy_name_for(broker);
        let broker_url = naming.proxy_url(&broker.id);

        let claimed = owned
            .remove(&broker.id)
            .or_else(|| take(&mut unmanaged, by_name.get(&name)));

        if let Some(existing) = claimed {
            let canonical = existing.name == name && existing.broker_url == broker_url;
            let request = UpdateBrokerRequest {
                id: broker.id.clone(),
                guid: existing.guid,
                name,
                broker_url,
            };
            actions.push(if canonical {
                BrokerAction::Fetch(request)
            } else {
                BrokerAction::Update {
                    request,
                    takeover: false,
                }
            });
            continue;
        }

        if config.takeover_enabled {
            let key = (broker.name.clone(), broker.broker_url.clone());
            if let Some(existing) = take(&mut unmanaged, by_name_url.get(&key)) {
                actions.push(BrokerAction::Update {
                    request: UpdateBrokerRequest {
                        id: broker.id.clone(),
                        guid: existing.guid,
                        name,
                        broker_url,
                    },
                    takeover: true,
                });
                continue;
            }
        }

        actions.push(BrokerAction::Create(CreateBrokerRequest {
            id: broker.id.clone(),
            name,
            broker_url,
        }));
    }

    actions.extend(owned.into_iter().map(|(id, orphan)| {
        BrokerAction::Delete(DeleteBrokerRequest {
            id,
            guid: orphan.guid,
            name: orphan.name,
        })
    }));

    actions
}

fn take(slots: &mut [Option<PlatformBroker>], index: Option<&usize>) -> Option<PlatformBroker> {
    index
        .and_then(|index| slots.get_mut(*index))
        .and_then(Option::take)
}

/// Apply broker actions one by one.
///
/// A failing action is logged and recorded; the remaining actions still run.
/// Catalog refreshes are skipped when the platform cannot refetch catalogs.
pub async fn apply(
    token: &CancellationToken,
    client: &dyn BrokerClient,
    catalog: Option<&dyn CatalogFetcher>,
    actions: Vec<BrokerAction>,
) -> Result<(Vec<BrokerAction>, Vec<(BrokerAction, String)>)> {
    let mut taken = Vec::new();
    let mut failed = Vec::new();

    for action in actions {
        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        debug!(action = %action, "Applying broker action");

        let outcome = match &action {
            BrokerAction::Create(request) => client.create_broker(request).await.map(|_| true),
            BrokerAction::Update { request, .. } => {
                client.update_broker(request).await.map(|_| true)
            }
            BrokerAction::Fetch(request) => match catalog {
                Some(catalog) => catalog.fetch(request).await.map(|()| true),
                None => Ok(false),
            },
            BrokerAction::Delete(request) => client.delete_broker(request).await.map(|()| true),
        };

        match outcome {
            Ok(true) => {
                if action.is_mutation() {
                    info!(action = %action, "Broker action applied");
                }
                taken.push(action);
            }
            Ok(false) => debug!(action = %action, "Catalog refetch not supported, skipping"),
            Err(e) => {
                warn!(action = %action, error = %e, "Broker action failed");
                failed.push((action, e.to_string()));
            }
        }
    }

    Ok((taken, failed))
}
