//! Reconciliation engine of the broker sync agent.
//!
//! This crate keeps a platform's broker registrations and plan visibilities
//! in line with the registry:
//!
//! - **Resync**: fetch desired and observed state, diff, apply
//! - **Notifications**: apply a single registry change through a per-resource handler
//! - **Reconciler**: run exactly one of the two at a time, folding bursts of
//!   queued work into a single resync
//! - **Bounded executor**: every fan-out against a remote API is capped
//!
//! # Example
//!
//! ```ignore
//! use brokersync_reconciler::{ReconcilerBuilder, ReconcilerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let reconciler = ReconcilerBuilder::new()
//!     .with_platform(platform)
//!     .with_registry(registry)
//!     .with_config(ReconcilerConfig::from_settings(&settings)?)
//!     .build()?;
//!
//! let token = CancellationToken::new();
//! let (messages, _producer) = producer.start(token.clone());
//! let stats = reconciler.run(token, messages).await;
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod consumer;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod reconciler;
pub mod resync;
pub mod types;

// Re-export main types
pub use consumer::NotificationConsumer;
pub use error::{Error, Result};
pub use executor::BoundedExecutor;
pub use handlers::{BrokerHandler, ResourceHandler, VisibilityHandler};
pub use reconciler::{Reconciler, ReconcilerBuilder, ReconcilerStats};
pub use resync::ResyncJob;
pub use types::{BrokerAction, ReconcilerConfig, ResyncReport, VisibilityPlan};
