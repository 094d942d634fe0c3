//! Full reconciliation pass.
//!
//! A pass fetches everything it needs up front. If any authoritative listing
//! fails the pass ends before touching the platform. Once mutation starts,
//! individual failures are recorded and the pass carries on.

pub mod brokers;
pub mod visibilities;

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use brokersync_core::{DesiredBroker, Platform, RegistryClient, Visibility, VisibilityClient};
use itertools::Itertools;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::executor::BoundedExecutor;
use crate::types::{ReconcilerConfig, ResyncReport};

use self::visibilities::Catalog;

/// One full reconciliation of brokers and visibilities.
pub struct ResyncJob {
    platform: Arc<dyn Platform>,
    registry: Arc<dyn RegistryClient>,
    config: ReconcilerConfig,
    executor: BoundedExecutor,
}

impl ResyncJob {
    /// Create a job.
    pub fn new(
        platform: Arc<dyn Platform>,
        registry: Arc<dyn RegistryClient>,
        config: ReconcilerConfig,
    ) -> Self {
        let executor = BoundedExecutor::new(config.max_parallel_requests);
        Self {
            platform,
            registry,
            config,
            executor,
        }
    }

    /// The configuration in use.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Run a pass under a fresh correlation id.
    pub async fn resync(&self, token: &CancellationToken) -> Result<ResyncReport> {
        let correlation_id = Uuid::new_v4().to_string();
        let span = info_span!("resync", correlation_id = %correlation_id);

        async {
            info!("Resync started");
            let started = Instant::now();
            let result = self.process(token, &correlation_id).await;
            let elapsed_ms = started.elapsed().as_millis();

            match &result {
                Ok(report) => info!(
                    brokers_created = report.brokers_created,
                    brokers_updated = report.brokers_updated,
                    brokers_deleted = report.brokers_deleted,
                    catalogs_fetched = report.catalogs_fetched,
                    visibilities_enabled = report.visibilities_enabled,
                    visibilities_disabled = report.visibilities_disabled,
                    failures = report.failures.len(),
                    elapsed_ms,
                    "Resync finished"
                ),
                Err(e) if e.is_cancelled() => info!(elapsed_ms, "Resync cancelled"),
                Err(e) => error!(error = %e, elapsed_ms, "Resync failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Fetch desired and observed state, then reconcile brokers and visibilities.
    pub async fn process(&self, token: &CancellationToken, correlation_id: &str) -> Result<ResyncReport> {
        let broker_client = self.platform.brokers();
        let visibility_client = self.platform.visibilities();
        if broker_client.is_none() && visibility_client.is_none() {
            return Err(Error::MissingCapability);
        }

        let desired = self.desired_brokers().await?;

        let desired_visibilities = match &visibility_client {
            Some(client) => Some(
                self.desired_visibilities(token, client.visibility_scope_label_key(), &desired)
                    .await?,
            ),
            None => None,
        };

        let observed = match &broker_client {
            Some(client) => Some(
                client
                    .get_brokers()
                    .await
                    .map_err(|e| Error::fetch_failed("platform brokers", e))?,
            ),
            None => None,
        };

        let mut report = ResyncReport::new(correlation_id);

        if let (Some(client), Some(observed)) = (&broker_client, &observed) {
            let actions = brokers::plan(&self.config, &desired, observed);
            debug!(actions = actions.len(), observed = observed.len(), "Planned broker actions");

            let catalog = self.platform.catalog();
            let (taken, failed) =
                brokers::apply(token, client.as_ref(), catalog.as_deref(), actions).await?;
            for action in &taken {
                report.record_broker(action);
            }
            for (action, reason) in failed {
                report.record_failure(format!("{action}: {reason}"));
            }
        }

        if let (Some(client), Some(wanted)) = (visibility_client, desired_visibilities) {
            self.reconcile_visibilities(token, client, &desired, &wanted, &mut report)
                .await?;
        }

        Ok(report)
    }

    async fn desired_brokers(&self) -> Result<Vec<DesiredBroker>> {
        let brokers = self
            .registry
            .get_brokers()
            .await
            .map_err(|e| Error::fetch_failed("registry brokers", e))?;

        let (kept, skipped): (Vec<_>, Vec<_>) = brokers
            .into_iter()
            .partition(|b| !self.config.blacklist.contains(&b.name));
        if !skipped.is_empty() {
            debug!(
                skipped = %skipped.iter().map(|b| b.name.as_str()).join(","),
                "Ignoring blacklisted brokers"
            );
        }
        Ok(kept)
    }

    async fn desired_visibilities(
        &self,
        token: &CancellationToken,
        scope_key: &str,
        brokers: &[DesiredBroker],
    ) -> Result<Vec<Visibility>> {
        let broker_ids = brokers.iter().map(|b| b.id.clone()).collect_vec();
        let offerings = self
            .lookup(token, broker_ids, "service offerings", |registry, batch| async move {
                registry.get_service_offerings_by_broker_ids(&batch).await
            })
            .await?;

        let offering_ids = offerings.iter().map(|o| o.id.clone()).collect_vec();
        let plans = self
            .lookup(token, offering_ids, "service plans", |registry, batch| async move {
                registry.get_plans_by_service_offerings(&batch).await
            })
            .await?;

        let registry_visibilities = self
            .registry
            .get_visibilities()
            .await
            .map_err(|e| Error::fetch_failed("registry visibilities", e))?;

        let catalog = Catalog {
            brokers,
            offerings: &offerings,
            plans: &plans,
        };
        let records = visibilities::translate(
            &self.config.naming,
            scope_key,
            catalog,
            &registry_visibilities,
        );
        debug!(
            offerings = offerings.len(),
            plans = plans.len(),
            visibilities = records.len(),
            "Computed desired visibilities"
        );
        Ok(records)
    }

    /// Batched registry lookup through the bounded executor.
    async fn lookup<R, F, Fut>(
        &self,
        token: &CancellationToken,
        ids: Vec<String>,
        what: &'static str,
        fetch: F,
    ) -> Result<Vec<R>>
    where
        R: Send + 'static,
        F: Fn(Arc<dyn RegistryClient>, Vec<String>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = brokersync_core::Result<Vec<R>>> + Send + 'static,
    {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let batches = ids
            .chunks(self.config.lookup_batch_size.max(1))
            .map(<[String]>::to_vec)
            .collect_vec();
        let registry = Arc::clone(&self.registry);

        let pages = self
            .executor
            .run(token, batches, move |batch| {
                let request = fetch(Arc::clone(&registry), batch);
                async move { request.await.map_err(|e| Error::fetch_failed(what, e)) }
            })
            .await?;

        Ok(pages.into_iter().flatten().collect())
    }

    async fn reconcile_visibilities(
        &self,
        token: &CancellationToken,
        client: Arc<dyn VisibilityClient>,
        brokers: &[DesiredBroker],
        desired: &[Visibility],
        report: &mut ResyncReport,
    ) -> Result<()> {
        let names = brokers
            .iter()
            .map(|b| self.config.naming.proxy_name_for(b))
            .collect_vec();

        let observed = if names.is_empty() {
            Vec::new()
        } else {
            match client.get_visibilities_by_brokers(&names).await {
                Ok(observed) => observed,
                Err(e) => {
                    warn!(error = %e, "Could not list platform visibilities, skipping visibility reconciliation");
                    report.record_failure(format!("list platform visibilities: {e}"));
                    return Ok(());
                }
            }
        };

        let scope_key = client.visibility_scope_label_key().to_string();
        let plan = visibilities::plan(&scope_key, desired, &observed);
        debug!(
            to_enable = plan.to_enable.len(),
            to_disable = plan.to_disable.len(),
            "Planned visibility changes"
        );

        let outcome = visibilities::apply(token, self.executor, client, plan).await?;
        report.visibilities_enabled = outcome.enabled;
        report.visibilities_disabled = outcome.disabled;
        for failure in outcome.failures {
            warn!(failure = %failure, "Visibility phase failed");
            report.record_failure(failure);
        }
        Ok(())
    }
}
