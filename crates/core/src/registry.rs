//! Read contract of the central registry.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{DesiredBroker, RegistryVisibility, ServiceOffering, ServicePlan};

/// Plain listing calls against the registry.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Every broker the registry declares.
    async fn get_brokers(&self) -> Result<Vec<DesiredBroker>>;

    /// Every visibility the registry declares for this platform.
    async fn get_visibilities(&self) -> Result<Vec<RegistryVisibility>>;

    /// Service offerings owned by the given brokers.
    async fn get_service_offerings_by_broker_ids(
        &self,
        broker_ids: &[String],
    ) -> Result<Vec<ServiceOffering>>;

    /// Plans belonging to the given service offerings.
    async fn get_plans_by_service_offerings(&self, offering_ids: &[String]) -> Result<Vec<ServicePlan>>;
}
