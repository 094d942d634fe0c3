//! Producer to reconciler wiring.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use brokersync_core::{Platform, RegistryClient, Settings};
use brokersync_events::{NotificationProducer, ProducerConfig};
use brokersync_reconciler::{ReconcilerBuilder, ReconcilerConfig, ReconcilerStats};
use brokersync_registry::HttpRegistryClient;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A configured sync agent for one platform.
pub struct Agent {
    settings: Settings,
    platform: Arc<dyn Platform>,
    registry: Arc<dyn RegistryClient>,
}

impl Agent {
    /// Create an agent reading the registry over HTTP.
    pub fn new(settings: Settings, platform: Arc<dyn Platform>) -> Result<Self> {
        settings.validate().context("Invalid settings")?;
        let registry = HttpRegistryClient::from_settings(&settings)
            .context("Failed to create registry client")?;
        Ok(Self {
            settings,
            platform,
            registry: Arc::new(registry),
        })
    }

    /// Read desired state from another registry client.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = registry;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run until the token is cancelled.
    ///
    /// The producer gets its own child token so that it always stops once the
    /// reconciler has, whichever side ended first.
    pub async fn run(&self, token: CancellationToken) -> Result<ReconcilerStats> {
        let started = Instant::now();

        let config =
            ReconcilerConfig::from_settings(&self.settings).context("Invalid reconcile settings")?;
        let reconciler = ReconcilerBuilder::new()
            .with_platform(Arc::clone(&self.platform))
            .with_registry(Arc::clone(&self.registry))
            .with_config(config)
            .build()
            .context("Failed to build reconciler")?;

        let producer_config = ProducerConfig::from_settings(&self.settings)
            .context("Invalid notification settings")?;
        let stream_url = producer_config.url.to_string();
        let producer = NotificationProducer::new(producer_config);

        let producer_token = token.child_token();
        let (messages, producer_task) = producer.start(producer_token.clone());
        info!(
            url = %stream_url,
            startup_ms = started.elapsed().as_millis(),
            "Agent started"
        );

        let stats = reconciler.run(token, messages).await;

        producer_token.cancel();
        producer_task
            .await
            .context("Notification producer task failed")?;

        info!(
            resyncs = stats.resyncs,
            resync_failures = stats.resync_failures,
            notifications = stats.notifications,
            notification_failures = stats.notification_failures,
            "Agent stopped"
        );
        Ok(stats)
    }
}

/// Cancel the token on Ctrl+C.
pub async fn shutdown_on_ctrl_c(token: CancellationToken) {
    tokio::select! {
        () = token.cancelled() => {}
        result = signal::ctrl_c() => match result {
            Ok(()) => {
                info!("Received Ctrl+C, initiating graceful shutdown");
                token.cancel();
            }
            Err(err) => {
                error!(error = %err, "Failed to listen for shutdown signal");
                token.cancelled().await;
            }
        },
    }
}
