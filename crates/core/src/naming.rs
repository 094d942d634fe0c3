//! Proxy registration naming and ownership rules.
//!
//! A broker registered by the agent is named `<prefix><registry name>-<registry id>`
//! and points at `<osb path>/<registry id>`. Ownership of an observed platform
//! broker is decided from its URL: either rooted at the registry OSB path, or
//! matching the legacy proxy pattern.

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::DesiredBroker;

/// Default pattern for registrations created by older proxy deployments.
///
/// It accepts any host, so every platform broker served under `/v1/osb/<id>`
/// counts as owned and is deleted once no registry broker claims it. Narrow
/// `legacy_url_pattern` to the old proxy host when the platform also hosts
/// third-party brokers under that path.
pub const DEFAULT_LEGACY_URL_PATTERN: &str = r"^https?://[^/]+/v1/osb/(?P<id>[^/?#]+)/?$";

/// Computes canonical proxy names/URLs and recognises owned registrations.
#[derive(Debug, Clone)]
pub struct BrokerNaming {
    prefix: String,
    osb_path: String,
    legacy_pattern: Regex,
}

impl BrokerNaming {
    /// Create naming rules.
    ///
    /// `legacy_pattern` must contain a capture group named `id`.
    pub fn new(
        prefix: impl Into<String>,
        osb_path: impl Into<String>,
        legacy_pattern: &str,
    ) -> Result<Self> {
        let legacy_pattern = Regex::new(legacy_pattern)
            .map_err(|e| Error::invalid_config(format!("invalid legacy_url_pattern: {e}")))?;
        if !legacy_pattern.capture_names().flatten().any(|name| name == "id") {
            return Err(Error::invalid_config(
                "legacy_url_pattern must contain a named capture group 'id'",
            ));
        }

        Ok(Self {
            prefix: prefix.into(),
            osb_path: osb_path.into().trim_end_matches('/').to_string(),
            legacy_pattern,
        })
    }

    /// The configured name prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The registry OSB base path proxied brokers are rooted at.
    pub fn osb_path(&self) -> &str {
        &self.osb_path
    }

    /// Canonical platform name for a registry broker.
    pub fn proxy_name(&self, name: &str, id: &str) -> String {
        format!("{}{name}-{id}", self.prefix)
    }

    /// Canonical platform name for a desired broker.
    pub fn proxy_name_for(&self, broker: &DesiredBroker) -> String {
        self.proxy_name(&broker.name, &broker.id)
    }

    /// Canonical platform URL for a registry broker id.
    pub fn proxy_url(&self, id: &str) -> String {
        format!("{}/{id}", self.osb_path)
    }

    /// Registry broker id a platform URL points at, if the registration is owned.
    pub fn owned_broker_id(&self, broker_url: &str) -> Option<String> {
        if let Some(rest) = broker_url
            .strip_prefix(self.osb_path.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
        {
            let id = rest.split(['/', '?', '#']).next().unwrap_or_default();
            return (!id.is_empty()).then(|| id.to_string());
        }

        self.legacy_pattern
            .captures(broker_url)
            .and_then(|captures| captures.name("id"))
            .map(|id| id.as_str().to_string())
    }
}

/// Registry broker names the agent must never touch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BrokerBlacklist(BTreeSet<String>);

impl BrokerBlacklist {
    /// Create a blacklist from registry broker names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    /// Whether a registry broker name is blacklisted.
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    /// Whether a platform registration belongs to a blacklisted broker.
    ///
    /// A registration is covered when its name is a blacklisted name verbatim,
    /// or when it is owned (`owned_id` taken from its URL) and named exactly
    /// `<prefix><blacklisted name>-<owned_id>`.
    pub fn covers_registration(
        &self,
        platform_name: &str,
        prefix: &str,
        owned_id: Option<&str>,
    ) -> bool {
        self.0.iter().any(|name| {
            platform_name == name
                || owned_id.is_some_and(|id| {
                    platform_name
                        .strip_prefix(prefix)
                        .and_then(|rest| rest.strip_prefix(name.as_str()))
                        .and_then(|rest| rest.strip_prefix('-'))
                        == Some(id)
                })
        })
    }

    /// Number of blacklisted names.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is blacklisted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
