//! Core types for the reconciler.

use std::fmt;

use brokersync_core::{
    BrokerBlacklist, BrokerNaming, CreateBrokerRequest, DeleteBrokerRequest, PlatformBroker,
    Settings, UpdateBrokerRequest, Visibility,
};
use serde::Serialize;

use crate::error::Result;

/// Configuration shared by the resync job and the notification handlers.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Proxy naming and ownership rules.
    pub naming: BrokerNaming,
    /// Registry broker names that are never touched.
    pub blacklist: BrokerBlacklist,
    /// Adopt unmanaged brokers with matching name and URL.
    pub takeover_enabled: bool,
    /// Cap on concurrent remote calls per fan-out.
    pub max_parallel_requests: usize,
    /// Ids per batched registry lookup.
    pub lookup_batch_size: usize,
}

impl ReconcilerConfig {
    /// Create a config with default limits and no blacklist.
    pub fn new(naming: BrokerNaming) -> Self {
        Self {
            naming,
            blacklist: BrokerBlacklist::default(),
            takeover_enabled: false,
            max_parallel_requests: 5,
            lookup_batch_size: 50,
        }
    }

    /// Derive the config from agent settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self {
            naming: settings.naming()?,
            blacklist: settings.reconcile.broker_blacklist.clone(),
            takeover_enabled: settings.reconcile.takeover_enabled,
            max_parallel_requests: settings.reconcile.max_parallel_requests,
            lookup_batch_size: settings.reconcile.lookup_batch_size.max(1),
        })
    }

    /// Set the blacklist.
    #[must_use]
    pub fn with_blacklist(mut self, blacklist: BrokerBlacklist) -> Self {
        self.blacklist = blacklist;
        self
    }

    /// Enable or disable takeover.
    #[must_use]
    pub const fn with_takeover(mut self, enabled: bool) -> Self {
        self.takeover_enabled = enabled;
        self
    }

    /// Set the concurrency cap.
    #[must_use]
    pub const fn with_max_parallel_requests(mut self, max: usize) -> Self {
        self.max_parallel_requests = max;
        self
    }

    /// Set the lookup batch size.
    #[must_use]
    pub fn with_lookup_batch_size(mut self, size: usize) -> Self {
        self.lookup_batch_size = size.max(1);
        self
    }

    /// Whether a platform registration belongs to a blacklisted broker.
    pub fn is_blacklisted_registration(&self, broker: &PlatformBroker) -> bool {
        let owned_id = self.naming.owned_broker_id(&broker.broker_url);
        self.blacklist
            .covers_registration(&broker.name, self.naming.prefix(), owned_id.as_deref())
    }
}

/// One corrective step against the platform's broker registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerAction {
    /// Register a proxy for a registry broker.
    Create(CreateBrokerRequest),
    /// Rename or repoint an owned registration, or adopt an unmanaged one.
    Update {
        request: UpdateBrokerRequest,
        takeover: bool,
    },
    /// Refresh the catalog of a canonical registration.
    Fetch(UpdateBrokerRequest),
    /// Remove an orphaned registration.
    Delete(DeleteBrokerRequest),
}

impl BrokerAction {
    /// Platform name the action targets.
    pub fn broker_name(&self) -> &str {
        match self {
            Self::Create(request) => &request.name,
            Self::Update { request, .. } | Self::Fetch(request) => &request.name,
            Self::Delete(request) => &request.name,
        }
    }

    /// Whether the action changes registrations, as opposed to a catalog refresh.
    pub const fn is_mutation(&self) -> bool {
        !matches!(self, Self::Fetch(_))
    }
}

impl fmt::Display for BrokerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create(request) => write!(f, "create broker {} ({})", request.name, request.broker_url),
            Self::Update {
                request,
                takeover: true,
            } => write!(f, "take over broker {} ({})", request.guid, request.name),
            Self::Update { request, .. } => {
                write!(f, "update broker {} to {} ({})", request.guid, request.name, request.broker_url)
            }
            Self::Fetch(request) => write!(f, "fetch catalog of broker {}", request.name),
            Self::Delete(request) => write!(f, "delete broker {} ({})", request.guid, request.name),
        }
    }
}

/// Visibility changes needed to converge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VisibilityPlan {
    /// Observed but not desired.
    pub to_disable: Vec<Visibility>,
    /// Desired but not observed.
    pub to_enable: Vec<Visibility>,
}

impl VisibilityPlan {
    /// Whether nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.to_disable.is_empty() && self.to_enable.is_empty()
    }
}

/// Outcome of one resync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResyncReport {
    pub correlation_id: String,
    pub brokers_created: usize,
    pub brokers_updated: usize,
    pub brokers_deleted: usize,
    pub catalogs_fetched: usize,
    pub visibilities_enabled: usize,
    pub visibilities_disabled: usize,
    /// Human-readable description of every failed step.
    pub failures: Vec<String>,
}

impl ResyncReport {
    /// Create an empty report for a pass.
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            ..Self::default()
        }
    }

    /// Count a successful broker action.
    pub fn record_broker(&mut self, action: &BrokerAction) {
        match action {
            BrokerAction::Create(_) => self.brokers_created += 1,
            BrokerAction::Update { .. } => self.brokers_updated += 1,
            BrokerAction::Fetch(_) => self.catalogs_fetched += 1,
            BrokerAction::Delete(_) => self.brokers_deleted += 1,
        }
    }

    /// Record a failed step.
    pub fn record_failure(&mut self, failure: impl Into<String>) {
        self.failures.push(failure.into());
    }

    /// Number of registration and visibility changes made.
    pub const fn mutations(&self) -> usize {
        self.brokers_created
            + self.brokers_updated
            + self.brokers_deleted
            + self.visibilities_enabled
            + self.visibilities_disabled
    }

    /// Whether every step succeeded.
    pub fn all_succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether the pass found nothing to change.
    pub fn converged(&self) -> bool {
        self.mutations() == 0 && self.all_succeeded()
    }
}
