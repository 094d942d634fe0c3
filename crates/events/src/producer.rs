//! Notification producer.
//!
//! Keeps the stream connection alive and turns it into an ordered, bounded
//! sequence of [`Message`]s:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> (error | ping timeout | cancel) -> Disconnected
//!       ^                                                                          |
//!       +------------- after reconnect delay, or immediately on 410 --------------+
//! ```
//!
//! While connected a pinger and a reader run side by side on the split socket.
//! Whichever stops first cancels the other, and both are joined before the
//! socket is dropped. A separate timer requests a full resync periodically;
//! a resync is also requested right after any connect that started without a
//! known revision.

use std::sync::Arc;
use std::time::Duration;

use brokersync_core::{NotificationSettings, Settings};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep, timeout};
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use url::Url;
use uuid::Uuid;

use crate::connections::ConnectionRegistry;
use crate::error::{Error, Result};
use crate::event::{Message, Notification};
use crate::handshake::{self, Credentials, Handshake, NotificationSocket};
use crate::types::Revision;

/// Where the stream lives and how to keep it alive.
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub url: Url,
    pub credentials: Option<Credentials>,
    pub timing: NotificationSettings,
}

impl ProducerConfig {
    /// Create a config for an unauthenticated stream.
    pub fn new(url: Url, timing: NotificationSettings) -> Self {
        Self {
            url,
            credentials: None,
            timing,
        }
    }

    /// Derive the config from agent settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let credentials = settings.registry.has_credentials().then(|| {
            Credentials::new(&settings.registry.username, &settings.registry.password)
        });
        Ok(Self {
            url: settings.registry.notifications_url()?,
            credentials,
            timing: settings.notifications.clone(),
        })
    }

    /// Attach basic credentials.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Produces the message sequence consumed by the reconciler.
#[derive(Debug)]
pub struct NotificationProducer {
    config: Arc<ProducerConfig>,
    connections: Arc<ConnectionRegistry>,
}

impl NotificationProducer {
    /// Create a producer.
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            config: Arc::new(config),
            connections: Arc::new(ConnectionRegistry::new()),
        }
    }

    /// Live connections of this producer.
    pub fn connections(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.connections)
    }

    /// Start producing.
    ///
    /// Returns the bounded message sequence and a handle that completes once
    /// the token is cancelled (or the receiver is dropped) and every producer
    /// task has stopped.
    pub fn start(&self, token: CancellationToken) -> (mpsc::Receiver<Message>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.config.timing.queue_size.max(1));
        let timer_reset = Arc::new(Notify::new());

        let timer = tokio::spawn(resync_timer(
            self.config.timing.resync_period,
            tx.clone(),
            Arc::clone(&timer_reset),
            token.clone(),
        ));

        let session = Session {
            config: Arc::clone(&self.config),
            connections: Arc::clone(&self.connections),
            tx,
            timer_reset,
            token: token.clone(),
        };

        let handle = tokio::spawn(async move {
            session.run().await;
            // The timer would otherwise outlive a producer whose consumer went away.
            token.cancel();
            if let Err(e) = timer.await {
                warn!(error = %e, "Resync timer task failed");
            }
        });

        (rx, handle)
    }
}

/// Connection loop state shared across reconnects.
struct Session {
    config: Arc<ProducerConfig>,
    connections: Arc<ConnectionRegistry>,
    tx: mpsc::Sender<Message>,
    timer_reset: Arc<Notify>,
    token: CancellationToken,
}

impl Session {
    async fn run(self) {
        let mut last_revision = Revision::UNKNOWN;

        loop {
            if self.token.is_cancelled() || self.tx.is_closed() {
                break;
            }

            match self.connect_and_stream(&mut last_revision).await {
                Err(e) if e.is_shutdown() => break,
                Err(e) if e.is_revision_gone() => {
                    warn!(error = %e, "Revision aged out, reconnecting without a revision");
                    last_revision = Revision::UNKNOWN;
                    continue;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        revision = %last_revision,
                        delay_ms = self.config.timing.reconnect_delay.as_millis(),
                        "Notification stream lost, reconnecting after delay"
                    );
                }
                Ok(()) => {}
            }

            tokio::select! {
                biased;
                () = self.token.cancelled() => break,
                () = sleep(self.config.timing.reconnect_delay) => {}
            }
        }

        info!("Notification producer stopped");
    }

    async fn connect_and_stream(&self, last_revision: &mut Revision) -> Result<()> {
        let requested = *last_revision;
        let connected = tokio::select! {
            biased;
            () = self.token.cancelled() => return Err(Error::Cancelled),
            connected = handshake::connect(&self.config.url, self.config.credentials.as_ref(), requested) => connected,
        };
        let (socket, handshake) = connected?;

        *last_revision = handshake.revision;
        let connection_id = self
            .connections
            .register(self.config.url.as_str(), handshake.revision)
            .await;
        info!(
            revision = %handshake.revision,
            max_ping_period_ms = handshake.max_ping_period.as_millis(),
            "Connected to notification stream"
        );

        let result = self
            .after_connect(requested, socket, handshake, last_revision, connection_id)
            .await;
        self.connections.unregister(connection_id).await;
        result
    }

    async fn after_connect(
        &self,
        requested: Revision,
        socket: NotificationSocket,
        handshake: Handshake,
        last_revision: &mut Revision,
        connection_id: Uuid,
    ) -> Result<()> {
        if !requested.is_known() {
            // Nothing seen before this connection can be trusted without a resync.
            self.timer_reset.notify_one();
            self.send(Message::ResyncRequested).await?;
        }
        self.stream(socket, handshake, last_revision, connection_id)
            .await
    }

    /// Run pinger and reader until either stops, then join both.
    async fn stream(
        &self,
        socket: NotificationSocket,
        handshake: Handshake,
        last_revision: &mut Revision,
        connection_id: Uuid,
    ) -> Result<()> {
        let timing = &self.config.timing;
        let ping_period = timing.ping_period(handshake.max_ping_period);
        let read_deadline = timing.read_deadline(handshake.max_ping_period);
        debug!(
            ping_period_ms = ping_period.as_millis(),
            read_deadline_ms = read_deadline.as_millis(),
            "Starting keepalive"
        );

        let (sink, stream) = socket.split();
        let connection = self.token.child_token();

        let pinger = async {
            let result = ping_loop(sink, ping_period, &connection).await;
            connection.cancel();
            result
        };
        let reader = async {
            let result = self
                .read_loop(stream, read_deadline, &connection, last_revision, connection_id)
                .await;
            connection.cancel();
            result
        };
        let (ping_result, read_result) = tokio::join!(pinger, reader);

        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        read_result.and(ping_result)
    }

    async fn read_loop(
        &self,
        mut stream: SplitStream<NotificationSocket>,
        deadline: Duration,
        connection: &CancellationToken,
        last_revision: &mut Revision,
        connection_id: Uuid,
    ) -> Result<()> {
        loop {
            let next = tokio::select! {
                biased;
                () = connection.cancelled() => return Ok(()),
                next = timeout(deadline, stream.next()) => next,
            };

            let frame = match next {
                Err(_) => return Err(Error::PingTimeout { deadline }),
                Ok(None) => return Err(Error::StreamClosed),
                Ok(Some(frame)) => frame?,
            };

            let notification: Notification = match frame {
                Frame::Text(text) => serde_json::from_str(text.as_str())?,
                Frame::Binary(bytes) => serde_json::from_slice(&bytes)?,
                Frame::Close(reason) => {
                    debug!(reason = ?reason, "Server closed notification stream");
                    return Err(Error::StreamClosed);
                }
                Frame::Ping(_) | Frame::Pong(_) | Frame::Frame(_) => {
                    trace!("Keepalive frame received");
                    continue;
                }
            };

            if last_revision.is_known() && notification.revision <= *last_revision {
                debug!(
                    revision = %notification.revision,
                    last = %last_revision,
                    "Skipping already forwarded notification"
                );
                continue;
            }

            let revision = notification.revision;
            trace!(
                revision = %revision,
                resource = %notification.resource,
                operation = %notification.operation,
                "Forwarding notification"
            );
            tokio::select! {
                biased;
                () = connection.cancelled() => return Ok(()),
                sent = self.tx.send(Message::Notification(notification)) => {
                    sent.map_err(|_| Error::ChannelClosed)?;
                }
            }
            *last_revision = revision;
            self.connections
                .update_revision(connection_id, revision)
                .await;
        }
    }

    async fn send(&self, message: Message) -> Result<()> {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(Error::Cancelled),
            sent = self.tx.send(message) => sent.map_err(|_| Error::ChannelClosed),
        }
    }
}

async fn ping_loop(
    mut sink: SplitSink<NotificationSocket, Frame>,
    period: Duration,
    connection: &CancellationToken,
) -> Result<()> {
    let mut ticker = interval_at(Instant::now() + period, period);
    let result = loop {
        tokio::select! {
            biased;
            () = connection.cancelled() => break Ok(()),
            _ = ticker.tick() => {
                if let Err(e) = sink.send(Frame::Ping(Vec::new().into())).await {
                    break Err(Error::from(e));
                }
                trace!("Ping sent");
            }
        }
    };
    if let Err(e) = sink.close().await {
        trace!(error = %e, "Closing notification socket failed");
    }
    result
}

async fn resync_timer(
    period: Duration,
    tx: mpsc::Sender<Message>,
    reset: Arc<Notify>,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => return,
            () = reset.notified() => {
                trace!("Resync timer restarted");
            }
            () = sleep(period) => {
                info!(period_secs = period.as_secs(), "Periodic resync due");
                tokio::select! {
                    biased;
                    () = token.cancelled() => return,
                    sent = tx.send(Message::ResyncRequested) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}
