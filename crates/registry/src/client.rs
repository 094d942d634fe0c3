//! Registry client over HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use brokersync_core::{
    DesiredBroker, Error, RegistryClient, RegistrySettings, RegistryVisibility, Result,
    ServiceOffering, ServicePlan, Settings,
};
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::page::{Page, field_in};

pub const SERVICE_BROKERS_PATH: &str = "/v1/service_brokers";
pub const SERVICE_OFFERINGS_PATH: &str = "/v1/service_offerings";
pub const PLANS_PATH: &str = "/v1/service_plans";
pub const VISIBILITIES_PATH: &str = "/v1/visibilities";

/// Reads desired state from the registry.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    settings: Arc<RegistrySettings>,
    http_client: reqwest::Client,
}

impl HttpRegistryClient {
    /// Create a client from registry settings.
    pub fn new(settings: RegistrySettings) -> Result<Self> {
        Url::parse(&settings.url).map_err(|e| Error::invalid_url(&settings.url, e.to_string()))?;

        let http_client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| Error::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            settings: Arc::new(settings),
            http_client,
        })
    }

    /// Create a client from the agent settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Self::new(settings.registry.clone())
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}{path}", self.settings.url.trim_end_matches('/'));
        Url::parse(&raw).map_err(|e| Error::invalid_url(raw, e.to_string()))
    }

    /// Fetch every page of a listing.
    async fn list<T: DeserializeOwned>(&self, path: &str, field_query: Option<&str>) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut url = self.endpoint(path)?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("max_items", &self.settings.page_size.to_string());
                if let Some(filter) = field_query {
                    query.append_pair("fieldQuery", filter);
                }
                if let Some(token) = &token {
                    query.append_pair("token", token);
                }
            }

            let page: Page<T> = self.get_page(path, url).await?;
            debug!(path, items = page.items.len(), "Fetched registry page");
            token = page.next_token().map(str::to_string);
            items.extend(page.items);

            if token.is_none() {
                return Ok(items);
            }
        }
    }

    async fn get_page<T: DeserializeOwned>(&self, path: &str, url: Url) -> Result<Page<T>> {
        let operation = format!("GET {path}");
        let mut request = self.http_client.get(url);
        if self.settings.has_credentials() {
            request = request.basic_auth(&self.settings.username, Some(&self.settings.password));
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::request(&operation, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::request(
                operation,
                format!("registry returned {status}: {body}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| Error::request(operation, format!("invalid response body: {e}")))
    }

    /// Listing filtered to `field in ids`; no request when `ids` is empty.
    async fn list_in<T: DeserializeOwned>(&self, path: &str, field: &str, ids: &[String]) -> Result<Vec<T>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.list(path, Some(&field_in(field, ids))).await
    }
}

#[async_trait]
impl RegistryClient for HttpRegistryClient {
    async fn get_brokers(&self) -> Result<Vec<DesiredBroker>> {
        self.list(SERVICE_BROKERS_PATH, None).await
    }

    async fn get_visibilities(&self) -> Result<Vec<RegistryVisibility>> {
        self.list(VISIBILITIES_PATH, None).await
    }

    async fn get_service_offerings_by_broker_ids(
        &self,
        broker_ids: &[String],
    ) -> Result<Vec<ServiceOffering>> {
        self.list_in(SERVICE_OFFERINGS_PATH, "broker_id", broker_ids)
            .await
    }

    async fn get_plans_by_service_offerings(&self, offering_ids: &[String]) -> Result<Vec<ServicePlan>> {
        self.list_in(PLANS_PATH, "service_offering_id", offering_ids)
            .await
    }
}
