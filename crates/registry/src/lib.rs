//! HTTP implementation of the registry read contract.
//!
//! Listings are paged with an opaque continuation token and id lookups are
//! expressed as `fieldQuery` filters:
//!
//! ```ignore
//! use brokersync_core::{RegistryClient, Settings};
//! use brokersync_registry::HttpRegistryClient;
//!
//! let client = HttpRegistryClient::from_settings(&Settings::default())?;
//! let brokers = client.get_brokers().await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

mod client;
mod page;

pub use client::{
    HttpRegistryClient, PLANS_PATH, SERVICE_BROKERS_PATH, SERVICE_OFFERINGS_PATH, VISIBILITIES_PATH,
};
pub use page::{Page, field_in};
