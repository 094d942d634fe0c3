//! End-to-end agent wiring.
//!
//! GIVEN a notification stream, a registry and a platform
//! WHEN the agent runs
//! THEN the connect-time resync and streamed changes reach the platform

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use brokersync_core::{
    BrokerClient, CatalogFetcher, CreateBrokerRequest, DeleteBrokerRequest, DesiredBroker, Error,
    PlatformBroker, RegistryVisibility, Result, ServiceOffering, ServicePlan, UpdateBrokerRequest,
    VisibilityClient,
};
use brokersync::{Agent, Platform, RegistryClient, Settings};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct Brokers(Mutex<Vec<PlatformBroker>>);

impl Brokers {
    fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.0.lock().unwrap().iter().map(|b| b.name.clone()).collect();
        names.sort();
        names
    }
}

#[async_trait]
impl BrokerClient for Brokers {
    async fn get_brokers(&self) -> Result<Vec<PlatformBroker>> {
        Ok(self.0.lock().unwrap().clone())
    }

    async fn get_broker_by_name(&self, name: &str) -> Result<Option<PlatformBroker>> {
        Ok(self.0.lock().unwrap().iter().find(|b| b.name == name).cloned())
    }

    async fn create_broker(&self, request: &CreateBrokerRequest) -> Result<PlatformBroker> {
        let mut brokers = self.0.lock().unwrap();
        let broker = PlatformBroker::new(
            format!("g{}", brokers.len() + 1),
            &request.name,
            &request.broker_url,
        );
        brokers.push(broker.clone());
        Ok(broker)
    }

    async fn update_broker(&self, request: &UpdateBrokerRequest) -> Result<PlatformBroker> {
        let mut brokers = self.0.lock().unwrap();
        let broker = brokers
            .iter_mut()
            .find(|b| b.guid == request.guid)
            .ok_or_else(|| Error::not_found("broker", &request.guid))?;
        broker.name.clone_from(&request.name);
        broker.broker_url.clone_from(&request.broker_url);
        Ok(broker.clone())
    }

    async fn delete_broker(&self, request: &DeleteBrokerRequest) -> Result<()> {
        self.0.lock().unwrap().retain(|b| b.guid != request.guid);
        Ok(())
    }
}

struct BrokersOnly(Arc<Brokers>);

impl Platform for BrokersOnly {
    fn brokers(&self) -> Option<Arc<dyn BrokerClient>> {
        Some(Arc::clone(&self.0) as _)
    }

    fn visibilities(&self) -> Option<Arc<dyn VisibilityClient>> {
        None
    }

    fn catalog(&self) -> Option<Arc<dyn CatalogFetcher>> {
        None
    }
}

struct Registry(Vec<DesiredBroker>);

#[async_trait]
impl RegistryClient for Registry {
    async fn get_brokers(&self) -> Result<Vec<DesiredBroker>> {
        Ok(self.0.clone())
    }

    async fn get_visibilities(&self) -> Result<Vec<RegistryVisibility>> {
        Ok(Vec::new())
    }

    async fn get_service_offerings_by_broker_ids(&self, _: &[String]) -> Result<Vec<ServiceOffering>> {
        Ok(Vec::new())
    }

    async fn get_plans_by_service_offerings(&self, _: &[String]) -> Result<Vec<ServicePlan>> {
        Ok(Vec::new())
    }
}

/// Accept stream connections, send `notifications` on each and hold it open.
async fn serve_stream(notifications: Vec<serde_json::Value>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let notifications = notifications.clone();
            tokio::spawn(async move {
                let callback = |_: &Request, mut response: Response| -> std::result::Result<Response, ErrorResponse> {
                    let headers = response.headers_mut();
                    headers.insert("last_notification_revision", HeaderValue::from(0));
                    headers.insert("max_ping_period", HeaderValue::from_static("1m0s"));
                    Ok(response)
                };
                let Ok(mut ws) = accept_hdr_async(tcp, callback).await else {
                    return;
                };
                for notification in notifications {
                    if ws.send(Message::Text(notification.to_string().into())).await.is_err() {
                        return;
                    }
                }
                while let Some(Ok(_)) = ws.next().await {}
            });
        }
    });

    format!("http://{addr}")
}

fn settings(url: String) -> Settings {
    let mut settings = Settings::default();
    settings.registry.url = url;
    settings.registry.osb_path = Some("https://sm.example.com/v1/osb".to_string());
    settings
}

async fn wait_until(check: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn should_sync_platform_until_cancelled() {
    let url = serve_stream(vec![json!({
        "id": "n-1",
        "revision": 1,
        "resource": "/v1/service_brokers",
        "type": "CREATED",
        "payload": {"new": {"resource": {"id": "b2", "name": "n2", "broker_url": "https://b2"}}}
    })])
    .await;

    let brokers = Arc::new(Brokers::default());
    let agent = Agent::new(settings(url), Arc::new(BrokersOnly(Arc::clone(&brokers))))
        .unwrap()
        .with_registry(Arc::new(Registry(vec![
            DesiredBroker::new("b1", "n1", "https://b1"),
            DesiredBroker::new("b2", "n2", "https://b2"),
        ])));

    let token = CancellationToken::new();
    let run = {
        let token = token.clone();
        tokio::spawn(async move { agent.run(token).await })
    };

    wait_until(|| brokers.names().len() == 2).await;
    token.cancel();
    let stats = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(stats.resyncs, 1);
    assert_eq!(brokers.names(), vec!["sm-n1-b1".to_string(), "sm-n2-b2".to_string()]);
}

#[tokio::test]
async fn should_stop_without_reachable_stream() {
    let brokers = Arc::new(Brokers::default());
    let agent = Agent::new(
        settings("http://127.0.0.1:1".to_string()),
        Arc::new(BrokersOnly(Arc::clone(&brokers))),
    )
    .unwrap();

    let token = CancellationToken::new();
    let run = {
        let token = token.clone();
        tokio::spawn(async move { agent.run(token).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let stats = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(stats.resyncs, 0);
    assert!(brokers.names().is_empty());
}

#[test]
fn test_rejects_invalid_settings() {
    let mut settings = settings("http://localhost:8080".to_string());
    settings.reconcile.max_parallel_requests = 0;

    let result = Agent::new(settings, Arc::new(BrokersOnly(Arc::default())));
    assert!(result.is_err());
}
