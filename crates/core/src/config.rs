//! Agent settings.
//!
//! Settings load from a TOML (or JSON) file and can be overlaid from
//! `BROKERSYNC_*` environment variables. Every field has a default so a file
//! only needs to name what differs.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::naming::{BrokerBlacklist, BrokerNaming, DEFAULT_LEGACY_URL_PATTERN};

/// Complete agent configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub registry: RegistrySettings,
    #[serde(default)]
    pub reconcile: ReconcileSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
}

/// Where the registry lives and how to talk to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySettings {
    /// Base URL of the registry API.
    #[serde(default = "default_registry_url")]
    pub url: String,

    /// Base path proxied brokers are rooted at. Defaults to `<url>/v1/osb`.
    #[serde(default)]
    pub osb_path: Option<String>,

    /// Path of the notification stream endpoint.
    #[serde(default = "default_notifications_path")]
    pub notifications_path: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Timeout for a single registry request.
    #[serde(with = "duration_secs", default = "default_request_timeout")]
    pub request_timeout: Duration,

    /// Page size requested from listing endpoints.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            url: default_registry_url(),
            osb_path: None,
            notifications_path: default_notifications_path(),
            username: String::new(),
            password: String::new(),
            request_timeout: default_request_timeout(),
            page_size: default_page_size(),
        }
    }
}

impl RegistrySettings {
    /// Base path proxied brokers are rooted at.
    pub fn osb_path(&self) -> String {
        self.osb_path
            .clone()
            .unwrap_or_else(|| format!("{}/v1/osb", self.url.trim_end_matches('/')))
    }

    /// WebSocket URL of the notification stream.
    pub fn notifications_url(&self) -> Result<Url> {
        let mut url =
            Url::parse(&self.url).map_err(|e| Error::invalid_url(&self.url, e.to_string()))?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(Error::invalid_url(
                    &self.url,
                    format!("unsupported scheme '{other}'"),
                ));
            }
        };
        url.set_scheme(scheme)
            .map_err(|()| Error::invalid_url(&self.url, "cannot switch to websocket scheme"))?;
        let path = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            self.notifications_path.trim_start_matches('/')
        );
        url.set_path(&path);
        Ok(url)
    }

    /// Whether basic credentials are configured.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty()
    }
}

/// Reconciliation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Upper bound on concurrent platform/registry calls in one fan-out.
    #[serde(default = "default_max_parallel_requests")]
    pub max_parallel_requests: usize,

    /// Prefix of proxy registration names.
    #[serde(default = "default_broker_prefix")]
    pub broker_prefix: String,

    /// Registry broker names that are never reconciled.
    #[serde(default)]
    pub broker_blacklist: BrokerBlacklist,

    /// Adopt pre-existing platform brokers with the same name and URL.
    #[serde(default)]
    pub takeover_enabled: bool,

    /// Regex recognising registrations made by older proxies; needs an `id` group.
    #[serde(default = "default_legacy_url_pattern")]
    pub legacy_url_pattern: String,

    /// Number of ids per batched registry lookup.
    #[serde(default = "default_lookup_batch_size")]
    pub lookup_batch_size: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            max_parallel_requests: default_max_parallel_requests(),
            broker_prefix: default_broker_prefix(),
            broker_blacklist: BrokerBlacklist::default(),
            takeover_enabled: false,
            legacy_url_pattern: default_legacy_url_pattern(),
            lookup_batch_size: default_lookup_batch_size(),
        }
    }
}

/// Notification stream timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Share of the server's max ping period used as the ping interval.
    #[serde(default = "default_ping_period_percentage")]
    pub ping_period_percentage: u64,

    /// Extra time allowed for the server to answer a ping.
    #[serde(with = "duration_millis", default = "default_pong_timeout")]
    pub pong_timeout: Duration,

    /// Interval between forced full resyncs.
    #[serde(with = "duration_secs", default = "default_resync_period")]
    pub resync_period: Duration,

    /// Wait before reconnecting after a lost connection.
    #[serde(with = "duration_millis", default = "default_reconnect_delay")]
    pub reconnect_delay: Duration,

    /// Capacity of the outbound message queue.
    #[serde(default = "default_queue_size")]
    pub queue_size: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            ping_period_percentage: default_ping_period_percentage(),
            pong_timeout: default_pong_timeout(),
            resync_period: default_resync_period(),
            reconnect_delay: default_reconnect_delay(),
            queue_size: default_queue_size(),
        }
    }
}

impl NotificationSettings {
    /// Ping interval derived from the server's advertised maximum.
    pub fn ping_period(&self, max_ping_period: Duration) -> Duration {
        let millis = max_ping_period
            .as_millis()
            .saturating_mul(u128::from(self.ping_period_percentage))
            / 100;
        Duration::from_millis(u64::try_from(millis).unwrap_or(u64::MAX))
    }

    /// Longest silence tolerated before the connection is considered dead.
    pub fn read_deadline(&self, max_ping_period: Duration) -> Duration {
        self.ping_period(max_ping_period)
            .saturating_add(self.pong_timeout)
    }
}

impl Settings {
    /// Load settings from a file; `.json` files are read as JSON, anything else as TOML.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;

        let settings = if path.extension().is_some_and(|e| e == "json") {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content).map_err(|e| Error::toml_parse_failed(e.to_string()))?
        };
        debug!(path = %path.display(), "Loaded settings file");
        Ok(settings)
    }

    /// Overlay values from the process environment.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable source.
    #[must_use]
    pub fn with_env_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("BROKERSYNC_REGISTRY_URL") {
            self.registry.url = url;
        }
        if let Some(username) = lookup("BROKERSYNC_REGISTRY_USERNAME") {
            self.registry.username = username;
        }
        if let Some(password) = lookup("BROKERSYNC_REGISTRY_PASSWORD") {
            self.registry.password = password;
        }
        if let Some(raw) = lookup("BROKERSYNC_MAX_PARALLEL_REQUESTS") {
            match raw.parse() {
                Ok(max) => self.reconcile.max_parallel_requests = max,
                Err(e) => warn!(
                    value = %raw,
                    error = %e,
                    "Ignoring unparseable BROKERSYNC_MAX_PARALLEL_REQUESTS"
                ),
            }
        }
        if let Some(prefix) = lookup("BROKERSYNC_BROKER_PREFIX") {
            self.reconcile.broker_prefix = prefix;
        }
        if let Some(names) = lookup("BROKERSYNC_BROKER_BLACKLIST") {
            self.reconcile.broker_blacklist = BrokerBlacklist::new(
                names
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty()),
            );
        }
        if let Some(enabled) = lookup("BROKERSYNC_TAKEOVER_ENABLED") {
            self.reconcile.takeover_enabled = matches!(enabled.to_lowercase().as_str(), "1" | "true" | "yes");
        }
        self
    }

    /// Reject settings the agent cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.reconcile.max_parallel_requests == 0 {
            return Err(Error::invalid_config("max_parallel_requests must be > 0"));
        }
        if self.reconcile.lookup_batch_size == 0 {
            return Err(Error::invalid_config("lookup_batch_size must be > 0"));
        }
        if !(1..100).contains(&self.notifications.ping_period_percentage) {
            return Err(Error::invalid_config(
                "ping_period_percentage must be between 1 and 99",
            ));
        }
        if self.notifications.queue_size == 0 {
            return Err(Error::invalid_config("queue_size must be > 0"));
        }
        if self.notifications.resync_period.is_zero() {
            return Err(Error::invalid_config("resync_period must be > 0"));
        }
        if self.registry.has_credentials() && self.registry.password.is_empty() {
            return Err(Error::invalid_config("registry password missing for username"));
        }
        self.registry.notifications_url()?;
        self.naming()?;
        Ok(())
    }

    /// Naming and ownership rules derived from these settings.
    pub fn naming(&self) -> Result<BrokerNaming> {
        BrokerNaming::new(
            self.reconcile.broker_prefix.clone(),
            self.registry.osb_path(),
            &self.reconcile.legacy_url_pattern,
        )
    }
}

fn default_registry_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_notifications_path() -> String {
    "/v1/notifications".to_string()
}

const fn default_request_timeout() -> Duration {
    Duration::from_secs(60)
}

const fn default_page_size() -> usize {
    200
}

const fn default_max_parallel_requests() -> usize {
    5
}

fn default_broker_prefix() -> String {
    "sm-".to_string()
}

fn default_legacy_url_pattern() -> String {
    DEFAULT_LEGACY_URL_PATTERN.to_string()
}

const fn default_lookup_batch_size() -> usize {
    50
}

const fn default_ping_period_percentage() -> u64 {
    60
}

const fn default_pong_timeout() -> Duration {
    Duration::from_millis(2_000)
}

const fn default_resync_period() -> Duration {
    Duration::from_secs(12 * 60 * 60)
}

const fn default_reconnect_delay() -> Duration {
    Duration::from_millis(3_000)
}

const fn default_queue_size() -> usize {
    1024
}

/// Serialization helper for Duration as seconds.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Serialization helper for Duration as milliseconds.
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
