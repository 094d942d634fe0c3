//! Domain types for desired (registry) and observed (platform) state.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Multi-valued labels as carried by registry visibilities and plan access requests.
pub type Labels = BTreeMap<String, Vec<String>>;

/// A broker as declared by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredBroker {
    /// Registry identifier of the broker.
    pub id: String,
    /// Registry name of the broker.
    pub name: String,
    /// URL of the real broker behind the registry.
    #[serde(default)]
    pub broker_url: String,
}

impl DesiredBroker {
    /// Create a desired broker.
    pub fn new(id: impl Into<String>, name: impl Into<String>, broker_url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            broker_url: broker_url.into(),
        }
    }
}

/// A broker registration as observed on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformBroker {
    /// Platform identifier of the registration.
    pub guid: String,
    /// Registered name.
    pub name: String,
    /// Registered URL.
    pub broker_url: String,
}

impl PlatformBroker {
    /// Create a platform broker.
    pub fn new(guid: impl Into<String>, name: impl Into<String>, broker_url: impl Into<String>) -> Self {
        Self {
            guid: guid.into(),
            name: name.into(),
            broker_url: broker_url.into(),
        }
    }
}

/// A service offering as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOffering {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub broker_id: String,
}

/// A service plan as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePlan {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Plan id in the broker's own catalog; this is what the platform knows.
    pub catalog_id: String,
    pub service_offering_id: String,
}

/// A visibility as listed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryVisibility {
    pub id: String,
    /// Platform the visibility is scoped to; empty means every platform.
    #[serde(default)]
    pub platform_id: String,
    pub service_plan_id: String,
    #[serde(default)]
    pub labels: Labels,
}

/// A single plan visibility in platform terms.
///
/// Labels hold at most one value per key: a registry visibility with several
/// scope values expands into several of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Visibility {
    pub public: bool,
    pub catalog_plan_id: String,
    pub platform_broker_name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl Visibility {
    /// A visibility open to everyone on the platform.
    pub fn public(broker_name: impl Into<String>, catalog_plan_id: impl Into<String>) -> Self {
        Self {
            public: true,
            catalog_plan_id: catalog_plan_id.into(),
            platform_broker_name: broker_name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// A visibility restricted to one scope value.
    pub fn scoped(
        broker_name: impl Into<String>,
        catalog_plan_id: impl Into<String>,
        scope_key: impl Into<String>,
        scope_value: impl Into<String>,
    ) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert(scope_key.into(), scope_value.into());
        Self {
            public: false,
            catalog_plan_id: catalog_plan_id.into(),
            platform_broker_name: broker_name.into(),
            labels,
        }
    }

    /// Diff identity of this visibility under the given scope label key.
    pub fn key(&self, scope_key: &str) -> VisibilityKey {
        VisibilityKey {
            public: self.public,
            scope_value: self.labels.get(scope_key).cloned().unwrap_or_default(),
            platform_broker_name: self.platform_broker_name.clone(),
            catalog_plan_id: self.catalog_plan_id.clone(),
        }
    }

    /// Convert into the request shape used to enable or disable plan access.
    pub fn to_access_request(&self) -> ModifyPlanAccessRequest {
        ModifyPlanAccessRequest {
            broker_name: self.platform_broker_name.clone(),
            catalog_plan_id: self.catalog_plan_id.clone(),
            labels: self
                .labels
                .iter()
                .map(|(key, value)| (key.clone(), vec![value.clone()]))
                .collect(),
        }
    }
}

/// Identity used when diffing desired and observed visibilities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VisibilityKey {
    pub public: bool,
    pub scope_value: String,
    pub platform_broker_name: String,
    pub catalog_plan_id: String,
}

impl fmt::Display for VisibilityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.platform_broker_name,
            self.catalog_plan_id,
            if self.public { "public" } else { "scoped" },
            self.scope_value
        )
    }
}

/// Register a new broker on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBrokerRequest {
    /// Registry id the registration proxies to.
    pub id: String,
    pub name: String,
    pub broker_url: String,
}

/// Rename or repoint an existing platform registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateBrokerRequest {
    /// Registry id the registration proxies to.
    pub id: String,
    pub guid: String,
    pub name: String,
    pub broker_url: String,
}

/// Remove a platform registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteBrokerRequest {
    /// Registry id, when known.
    pub id: String,
    pub guid: String,
    pub name: String,
}

/// Enable or disable access to a plan, optionally restricted by labels.
///
/// Empty labels address the public (unscoped) visibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyPlanAccessRequest {
    pub broker_name: String,
    pub catalog_plan_id: String,
    #[serde(default)]
    pub labels: Labels,
}
