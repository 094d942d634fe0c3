//! In-memory platform and registry for reconciler tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use brokersync_core::{
    BrokerClient, BrokerNaming, CatalogFetcher, CreateBrokerRequest, DEFAULT_LEGACY_URL_PATTERN,
    DeleteBrokerRequest, DesiredBroker, Error, ModifyPlanAccessRequest, Platform, PlatformBroker,
    RegistryClient, RegistryVisibility, Result, ServiceOffering, ServicePlan, UpdateBrokerRequest,
    Visibility, VisibilityClient,
};
use brokersync_events::Notification;
use brokersync_reconciler::ReconcilerConfig;
use serde_json::{Value, json};

pub const OSB: &str = "https://sm.example.com/v1/osb";
pub const SCOPE: &str = "organization_guid";

pub fn config() -> ReconcilerConfig {
    ReconcilerConfig::new(BrokerNaming::new("sm-", OSB, DEFAULT_LEGACY_URL_PATTERN).unwrap())
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeBrokers {
    pub brokers: Mutex<Vec<PlatformBroker>>,
    pub calls: Mutex<Vec<String>>,
    /// Platform names whose create/update/delete fails.
    pub failing: Mutex<BTreeSet<String>>,
    next_guid: Mutex<usize>,
}

impl FakeBrokers {
    pub fn with(brokers: Vec<PlatformBroker>) -> Self {
        Self {
            brokers: Mutex::new(brokers),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> Vec<PlatformBroker> {
        self.brokers.lock().unwrap().clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn mutations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("get"))
            .collect()
    }

    pub fn fail_on(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    fn check(&self, name: &str, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        if self.failing.lock().unwrap().contains(name) {
            return Err(Error::request(call, "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for FakeBrokers {
    async fn get_brokers(&self) -> Result<Vec<PlatformBroker>> {
        self.calls.lock().unwrap().push("get_brokers".to_string());
        Ok(self.snapshot())
    }

    async fn get_broker_by_name(&self, name: &str) -> Result<Option<PlatformBroker>> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("get_broker_by_name {name}"));
        Ok(self.snapshot().into_iter().find(|b| b.name == name))
    }

    async fn create_broker(&self, request: &CreateBrokerRequest) -> Result<PlatformBroker> {
        self.check(&request.name, format!("create {} {}", request.name, request.broker_url))?;
        let guid = {
            let mut next = self.next_guid.lock().unwrap();
            *next += 1;
            format!("new-{next}")
        };
        let broker = PlatformBroker::new(guid, &request.name, &request.broker_url);
        self.brokers.lock().unwrap().push(broker.clone());
        Ok(broker)
    }

    async fn update_broker(&self, request: &UpdateBrokerRequest) -> Result<PlatformBroker> {
        self.check(
            &request.name,
            format!("update {} {} {}", request.guid, request.name, request.broker_url),
        )?;
        let mut brokers = self.brokers.lock().unwrap();
        let broker = brokers
            .iter_mut()
            .find(|b| b.guid == request.guid)
            .ok_or_else(|| Error::not_found("broker", &request.guid))?;
        broker.name.clone_from(&request.name);
        broker.broker_url.clone_from(&request.broker_url);
        Ok(broker.clone())
    }

    async fn delete_broker(&self, request: &DeleteBrokerRequest) -> Result<()> {
        self.check(&request.name, format!("delete {} {}", request.guid, request.name))?;
        self.brokers
            .lock()
            .unwrap()
            .retain(|b| b.guid != request.guid);
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeCatalog {
    pub fetched: Mutex<Vec<String>>,
}

#[async_trait]
impl CatalogFetcher for FakeCatalog {
    async fn fetch(&self, broker: &UpdateBrokerRequest) -> Result<()> {
        self.fetched.lock().unwrap().push(broker.name.clone());
        Ok(())
    }
}

pub struct FakeVisibilities {
    pub scope_key: String,
    pub visibilities: Mutex<Vec<Visibility>>,
    pub enabled: Mutex<Vec<ModifyPlanAccessRequest>>,
    pub disabled: Mutex<Vec<ModifyPlanAccessRequest>>,
    pub fail_listing: Mutex<bool>,
    /// Catalog plan ids whose enable/disable fails.
    pub failing_plans: Mutex<BTreeSet<String>>,
}

impl FakeVisibilities {
    pub fn new(scope_key: &str) -> Self {
        Self {
            scope_key: scope_key.to_string(),
            visibilities: Mutex::new(Vec::new()),
            enabled: Mutex::new(Vec::new()),
            disabled: Mutex::new(Vec::new()),
            fail_listing: Mutex::new(false),
            failing_plans: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn with(self, visibilities: Vec<Visibility>) -> Self {
        *self.visibilities.lock().unwrap() = visibilities;
        self
    }

    pub fn snapshot(&self) -> Vec<Visibility> {
        self.visibilities.lock().unwrap().clone()
    }

    pub fn enabled(&self) -> Vec<ModifyPlanAccessRequest> {
        self.enabled.lock().unwrap().clone()
    }

    pub fn disabled(&self) -> Vec<ModifyPlanAccessRequest> {
        self.disabled.lock().unwrap().clone()
    }

    fn records(&self, request: &ModifyPlanAccessRequest) -> Vec<Visibility> {
        let values = request.labels.get(&self.scope_key).cloned().unwrap_or_default();
        if values.is_empty() {
            return vec![Visibility::public(&request.broker_name, &request.catalog_plan_id)];
        }
        values
            .iter()
            .map(|v| {
                Visibility::scoped(
                    &request.broker_name,
                    &request.catalog_plan_id,
                    &self.scope_key,
                    v,
                )
            })
            .collect()
    }

    fn check(&self, request: &ModifyPlanAccessRequest) -> Result<()> {
        if self
            .failing_plans
            .lock()
            .unwrap()
            .contains(&request.catalog_plan_id)
        {
            return Err(Error::request("modify plan access", "injected failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl VisibilityClient for FakeVisibilities {
    fn visibility_scope_label_key(&self) -> &str {
        &self.scope_key
    }

    async fn get_visibilities_by_brokers(&self, broker_names: &[String]) -> Result<Vec<Visibility>> {
        if *self.fail_listing.lock().unwrap() {
            return Err(Error::request("get_visibilities", "injected failure"));
        }
        Ok(self
            .snapshot()
            .into_iter()
            .filter(|v| broker_names.contains(&v.platform_broker_name))
            .collect())
    }

    async fn enable_access_for_plan(&self, request: &ModifyPlanAccessRequest) -> Result<()> {
        self.check(request)?;
        self.enabled.lock().unwrap().push(request.clone());
        let scope_key = self.scope_key.clone();
        let mut state = self.visibilities.lock().unwrap();
        for record in self.records(request) {
            if !state.iter().any(|v| v.key(&scope_key) == record.key(&scope_key)) {
                state.push(record);
            }
        }
        Ok(())
    }

    async fn disable_access_for_plan(&self, request: &ModifyPlanAccessRequest) -> Result<()> {
        self.check(request)?;
        self.disabled.lock().unwrap().push(request.clone());
        let scope_key = self.scope_key.clone();
        let removed: Vec<_> = self
            .records(request)
            .iter()
            .map(|r| r.key(&scope_key))
            .collect();
        self.visibilities
            .lock()
            .unwrap()
            .retain(|v| !removed.contains(&v.key(&scope_key)));
        Ok(())
    }
}

pub struct FakePlatform {
    pub brokers: Option<Arc<FakeBrokers>>,
    pub visibilities: Option<Arc<FakeVisibilities>>,
    pub catalog: Option<Arc<FakeCatalog>>,
}

impl FakePlatform {
    pub fn new(brokers: FakeBrokers, visibilities: FakeVisibilities) -> Self {
        Self {
            brokers: Some(Arc::new(brokers)),
            visibilities: Some(Arc::new(visibilities)),
            catalog: Some(Arc::new(FakeCatalog::default())),
        }
    }

    pub fn brokers_only(brokers: FakeBrokers) -> Self {
        Self {
            brokers: Some(Arc::new(brokers)),
            visibilities: None,
            catalog: Some(Arc::new(FakeCatalog::default())),
        }
    }

    pub fn empty() -> Self {
        Self {
            brokers: None,
            visibilities: None,
            catalog: None,
        }
    }

    pub fn broker_client(&self) -> &FakeBrokers {
        self.brokers.as_deref().unwrap()
    }

    pub fn visibility_client(&self) -> &FakeVisibilities {
        self.visibilities.as_deref().unwrap()
    }

    pub fn fetched(&self) -> Vec<String> {
        self.catalog
            .as_ref()
            .map(|c| c.fetched.lock().unwrap().clone())
            .unwrap_or_default()
    }
}

impl Platform for FakePlatform {
    fn brokers(&self) -> Option<Arc<dyn BrokerClient>> {
        self.brokers
            .clone()
            .map(|c| c as Arc<dyn BrokerClient>)
    }

    fn visibilities(&self) -> Option<Arc<dyn VisibilityClient>> {
        self.visibilities
            .clone()
            .map(|c| c as Arc<dyn VisibilityClient>)
    }

    fn catalog(&self) -> Option<Arc<dyn CatalogFetcher>> {
        self.catalog
            .clone()
            .map(|c| c as Arc<dyn CatalogFetcher>)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeRegistry {
    pub brokers: Vec<DesiredBroker>,
    pub offerings: Vec<ServiceOffering>,
    pub plans: Vec<ServicePlan>,
    pub visibilities: Vec<RegistryVisibility>,
    pub fail_visibilities: bool,
    /// Size of every batched offering lookup, in call order.
    pub offering_batches: Mutex<Vec<usize>>,
}

impl FakeRegistry {
    pub fn with_brokers(brokers: Vec<DesiredBroker>) -> Self {
        Self {
            brokers,
            ..Self::default()
        }
    }

    /// Give broker `id` one offering `o-<id>` with one plan `p-<id>` (catalog id `cat-<id>`).
    pub fn with_plan_for(mut self, broker_id: &str) -> Self {
        self.offerings.push(ServiceOffering {
            id: format!("o-{broker_id}"),
            name: format!("offering-{broker_id}"),
            broker_id: broker_id.to_string(),
        });
        self.plans.push(ServicePlan {
            id: format!("p-{broker_id}"),
            name: "small".to_string(),
            catalog_id: format!("cat-{broker_id}"),
            service_offering_id: format!("o-{broker_id}"),
        });
        self
    }

    pub fn with_visibility(mut self, plan_id: &str, platform_id: &str, orgs: &[&str]) -> Self {
        let mut labels = brokersync_core::Labels::new();
        if !orgs.is_empty() {
            labels.insert(SCOPE.to_string(), orgs.iter().map(|o| (*o).to_string()).collect());
        }
        let id = format!("v{}", self.visibilities.len() + 1);
        self.visibilities.push(RegistryVisibility {
            id,
            platform_id: platform_id.to_string(),
            service_plan_id: plan_id.to_string(),
            labels,
        });
        self
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn get_brokers(&self) -> Result<Vec<DesiredBroker>> {
        Ok(self.brokers.clone())
    }

    async fn get_visibilities(&self) -> Result<Vec<RegistryVisibility>> {
        if self.fail_visibilities {
            return Err(Error::Http("503 Service Unavailable".to_string()));
        }
        Ok(self.visibilities.clone())
    }

    async fn get_service_offerings_by_broker_ids(
        &self,
        broker_ids: &[String],
    ) -> Result<Vec<ServiceOffering>> {
        self.offering_batches.lock().unwrap().push(broker_ids.len());
        Ok(self
            .offerings
            .iter()
            .filter(|o| broker_ids.contains(&o.broker_id))
            .cloned()
            .collect())
    }

    async fn get_plans_by_service_offerings(&self, offering_ids: &[String]) -> Result<Vec<ServicePlan>> {
        Ok(self
            .plans
            .iter()
            .filter(|p| offering_ids.contains(&p.service_offering_id))
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

pub fn notification(resource: &str, operation: &str, payload: Value) -> Notification {
    serde_json::from_value(json!({
        "id": "n-1",
        "revision": 1,
        "resource": resource,
        "type": operation,
        "correlation_id": "corr-1",
        "payload": payload,
    }))
    .unwrap()
}

pub fn broker_json(id: &str, name: &str, url: &str) -> Value {
    json!({"resource": {"id": id, "name": name, "broker_url": url}})
}

pub fn visibility_json(platform_id: &str, orgs: &[&str]) -> Value {
    let labels = if orgs.is_empty() {
        json!({})
    } else {
        json!({ SCOPE: orgs })
    };
    json!({
        "resource": {
            "id": "v1",
            "platform_id": platform_id,
            "service_plan_id": "p1",
            "labels": labels
        },
        "additional": {
            "broker_id": "b1",
            "broker_name": "mysql",
            "service_plan": {"id": "p1", "catalog_id": "cat-1"}
        }
    })
}
