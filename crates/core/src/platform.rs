//! Capability contract of the target platform.
//!
//! Concrete platforms implement whichever capabilities they support and expose
//! them through [`Platform`]. A platform without broker or visibility support
//! returns `None` for that capability and the agent skips the matching work.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{
    CreateBrokerRequest, DeleteBrokerRequest, ModifyPlanAccessRequest, PlatformBroker,
    UpdateBrokerRequest, Visibility,
};

/// Broker registration management.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// List every broker registered on the platform.
    async fn get_brokers(&self) -> Result<Vec<PlatformBroker>>;

    /// Look up a registration by exact name.
    async fn get_broker_by_name(&self, name: &str) -> Result<Option<PlatformBroker>>;

    /// Register a broker.
    async fn create_broker(&self, request: &CreateBrokerRequest) -> Result<PlatformBroker>;

    /// Rename or repoint a registration. Platforms refetch the catalog as part of this.
    async fn update_broker(&self, request: &UpdateBrokerRequest) -> Result<PlatformBroker>;

    /// Remove a registration.
    async fn delete_broker(&self, request: &DeleteBrokerRequest) -> Result<()>;
}

/// Catalog refetch for an unchanged registration.
#[async_trait]
pub trait CatalogFetcher: Send + Sync {
    /// Ask the platform to reload the broker's catalog.
    async fn fetch(&self, broker: &UpdateBrokerRequest) -> Result<()>;
}

/// Plan visibility management.
#[async_trait]
pub trait VisibilityClient: Send + Sync {
    /// Label key that scopes visibilities on this platform (e.g. an org id).
    ///
    /// An empty key means the platform has no scoping concept and every
    /// visibility is public.
    fn visibility_scope_label_key(&self) -> &str;

    /// List visibilities of plans belonging to the given platform brokers.
    async fn get_visibilities_by_brokers(&self, broker_names: &[String]) -> Result<Vec<Visibility>>;

    /// Grant access to a plan.
    async fn enable_access_for_plan(&self, request: &ModifyPlanAccessRequest) -> Result<()>;

    /// Revoke access to a plan.
    async fn disable_access_for_plan(&self, request: &ModifyPlanAccessRequest) -> Result<()>;
}

/// A target platform and the capabilities it offers.
///
/// Capabilities are handed out as shared handles so fan-out tasks can own them.
pub trait Platform: Send + Sync {
    /// Broker management, if supported.
    fn brokers(&self) -> Option<Arc<dyn BrokerClient>>;

    /// Visibility management, if supported.
    fn visibilities(&self) -> Option<Arc<dyn VisibilityClient>>;

    /// Catalog refetch, if supported.
    fn catalog(&self) -> Option<Arc<dyn CatalogFetcher>>;
}
