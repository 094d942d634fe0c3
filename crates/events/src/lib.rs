//! Change-notification stream for the broker sync agent.
//!
//! This crate turns the registry's notification stream into an ordered
//! sequence of work for the reconciler. Key features:
//!
//! - **Notification model**: revisions, resources, label deltas
//! - **Handshake**: resume-after-revision upgrade with keepalive negotiation
//! - **Producer**: reconnecting pinger/reader pair feeding a bounded queue
//! - **Connection registry**: snapshot of live stream connections
//!
//! # Example
//!
//! ```ignore
//! use brokersync_events::{Message, NotificationProducer, ProducerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> brokersync_events::Result<()> {
//!     let settings = brokersync_core::Settings::default();
//!     let producer = NotificationProducer::new(ProducerConfig::from_settings(&settings)?);
//!
//!     let token = CancellationToken::new();
//!     let (mut messages, handle) = producer.start(token.clone());
//!     while let Some(message) = messages.recv().await {
//!         match message {
//!             Message::ResyncRequested => println!("full resync"),
//!             Message::Notification(n) => println!("revision {}", n.revision),
//!         }
//!     }
//!     token.cancel();
//!     let _ = handle.await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod connections;
pub mod error;
pub mod event;
pub mod handshake;
pub mod producer;
pub mod types;

// Re-export main types
pub use connections::{ConnectionInfo, ConnectionRegistry};
pub use error::{Error, Result};
pub use event::{LabelChange, Message, Notification, NotificationPayload, ResourceEnvelope};
pub use handshake::{Credentials, Handshake, MAX_PING_PERIOD_HEADER, REVISION_PARAM};
pub use producer::{NotificationProducer, ProducerConfig};
pub use types::{LabelOperation, Operation, ResourceType, Revision};
