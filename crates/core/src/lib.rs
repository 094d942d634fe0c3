#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

//! # brokersync-core
//!
//! Shared vocabulary of the broker sync agent:
//!
//! - **Types**: desired brokers and visibilities from the registry, observed
//!   registrations on the platform, and the requests that mutate them
//! - **Naming**: proxy registration names/URLs and ownership detection
//! - **Settings**: file + environment configuration
//! - **Contracts**: the platform capability traits and the registry read trait

pub mod config;
pub mod error;
pub mod naming;
pub mod platform;
pub mod registry;
pub mod types;

pub use config::{NotificationSettings, ReconcileSettings, RegistrySettings, Settings};
pub use error::{Error, Result};
pub use naming::{BrokerBlacklist, BrokerNaming, DEFAULT_LEGACY_URL_PATTERN};
pub use platform::{BrokerClient, CatalogFetcher, Platform, VisibilityClient};
pub use registry::RegistryClient;
pub use types::{
    CreateBrokerRequest, DeleteBrokerRequest, DesiredBroker, Labels, ModifyPlanAccessRequest,
    PlatformBroker, RegistryVisibility, ServiceOffering, ServicePlan, UpdateBrokerRequest,
    Visibility, VisibilityKey,
};
