//! Reconciler implementation.
//!
//! The reconciler is the only place platform mutations start from. It takes
//! messages one at a time and runs either a full resync or a single
//! notification to completion before looking at the next message.

use std::sync::Arc;

use brokersync_core::{Platform, RegistryClient};
use brokersync_events::Message;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::consumer::NotificationConsumer;
use crate::error::{Error, Result};
use crate::resync::ResyncJob;
use crate::types::{ReconcilerConfig, ResyncReport};

/// Counters for one run of the reconciler loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcilerStats {
    /// Resync passes that completed.
    pub resyncs: usize,
    /// Resync passes that ended with an error.
    pub resync_failures: usize,
    /// Notifications applied.
    pub notifications: usize,
    /// Notifications that could not be applied.
    pub notification_failures: usize,
    /// Queued messages folded into a following resync.
    pub coalesced: usize,
}

/// Serializes resyncs and notifications against the platform.
pub struct Reconciler {
    resync: ResyncJob,
    consumer: NotificationConsumer,
}

impl Reconciler {
    /// Create a reconciler from its two operations.
    pub fn new(resync: ResyncJob, consumer: NotificationConsumer) -> Self {
        Self { resync, consumer }
    }

    /// The resync job.
    pub fn resync_job(&self) -> &ResyncJob {
        &self.resync
    }

    /// Run a single resync outside the loop.
    pub async fn resync(&self, token: &CancellationToken) -> Result<ResyncReport> {
        self.resync.resync(token).await
    }

    /// Consume messages until the token is cancelled or the sender goes away.
    pub async fn run(
        &self,
        token: CancellationToken,
        mut messages: mpsc::Receiver<Message>,
    ) -> ReconcilerStats {
        let mut stats = ReconcilerStats::default();
        info!("Reconciler started");

        loop {
            let message = tokio::select! {
                biased;
                () = token.cancelled() => break,
                message = messages.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match message {
                Message::ResyncRequested => {
                    let coalesced = drain(&mut messages);
                    if coalesced > 0 {
                        debug!(coalesced, "Folded queued messages into resync");
                    }
                    stats.coalesced += coalesced;

                    match self.resync.resync(&token).await {
                        Ok(_) => stats.resyncs += 1,
                        Err(Error::Cancelled) => break,
                        Err(_) => stats.resync_failures += 1,
                    }
                }
                Message::Notification(notification) => {
                    match self.consumer.consume(&notification).await {
                        Ok(()) => stats.notifications += 1,
                        Err(_) => stats.notification_failures += 1,
                    }
                }
            }
        }

        info!(
            resyncs = stats.resyncs,
            notifications = stats.notifications,
            "Reconciler stopped"
        );
        stats
    }
}

/// Discard everything already queued; a resync supersedes it.
fn drain(messages: &mut mpsc::Receiver<Message>) -> usize {
    let mut drained = 0;
    while messages.try_recv().is_ok() {
        drained += 1;
    }
    drained
}

/// Builder for Reconciler.
#[derive(Default)]
pub struct ReconcilerBuilder {
    platform: Option<Arc<dyn Platform>>,
    registry: Option<Arc<dyn RegistryClient>>,
    config: Option<ReconcilerConfig>,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the target platform.
    #[must_use]
    pub fn with_platform(mut self, platform: Arc<dyn Platform>) -> Self {
        self.platform = Some(platform);
        self
    }

    /// Set the registry client.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the reconciler.
    pub fn build(self) -> Result<Reconciler> {
        let platform = self
            .platform
            .ok_or_else(|| Error::invalid_config("platform is required"))?;
        let registry = self
            .registry
            .ok_or_else(|| Error::invalid_config("registry client is required"))?;
        let config = self
            .config
            .ok_or_else(|| Error::invalid_config("configuration is required"))?;

        if platform.brokers().is_none() && platform.visibilities().is_none() {
            warn!("Platform offers neither brokers nor visibilities, every resync will fail");
        }

        let consumer = NotificationConsumer::new(platform.as_ref(), &config);
        let resync = ResyncJob::new(platform, registry, config);
        Ok(Reconciler::new(resync, consumer))
    }
}
