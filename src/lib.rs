//! # brokersync
//!
//! Keeps a platform's service brokers and plan visibilities in sync with a
//! central registry. A notification stream drives incremental changes and a
//! periodic full resync repairs anything the stream missed.
//!
//! This crate wires the workspace together and re-exports its crates:
//!
//! ```ignore
//! use std::sync::Arc;
//! use brokersync::{Agent, Settings, telemetry};
//! use tokio_util::sync::CancellationToken;
//!
//! telemetry::init_tracing();
//! let settings = Settings::from_file("brokersync.toml".as_ref())?.with_env();
//! let agent = Agent::new(settings, Arc::new(my_platform))?;
//!
//! let token = CancellationToken::new();
//! tokio::spawn(brokersync::shutdown_on_ctrl_c(token.clone()));
//! let stats = agent.run(token).await?;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod agent;
pub mod telemetry;

pub use agent::{Agent, shutdown_on_ctrl_c};

// Re-export the workspace crates
pub use brokersync_core;
pub use brokersync_events;
pub use brokersync_reconciler;
pub use brokersync_registry;

pub use brokersync_core::{Platform, RegistryClient, Settings};
pub use brokersync_reconciler::ReconcilerStats;
