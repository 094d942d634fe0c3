//! Scripted notification stream server for producer tests.

#![allow(clippy::unwrap_used, dead_code)]

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};

/// What the server does once it has sent its notifications.
#[derive(Debug, Clone, Copy)]
pub enum After {
    /// Send a close frame.
    Close,
    /// Keep reading so pings get answered.
    Hold,
    /// Keep the socket open but never read, so pings go unanswered.
    Silent,
}

/// How the server answers one connection attempt.
#[derive(Debug, Clone)]
pub enum Step {
    /// Refuse with 410 Gone.
    Gone,
    /// Upgrade, announce `revision`, send notifications with the given revisions.
    Serve {
        revision: i64,
        max_ping_period: &'static str,
        notifications: Vec<i64>,
        after: After,
    },
}

impl Step {
    pub fn serve(revision: i64, notifications: Vec<i64>, after: After) -> Self {
        Self::Serve {
            revision,
            max_ping_period: "200ms",
            notifications,
            after,
        }
    }
}

/// A running scripted server.
pub struct StreamServer {
    pub addr: SocketAddr,
    requested: Arc<Mutex<Vec<Option<i64>>>>,
    handle: JoinHandle<()>,
}

impl StreamServer {
    /// Start serving the given steps; attempts past the script are held open.
    pub async fn start(steps: Vec<Step>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let script = Arc::new(Mutex::new(VecDeque::from(steps)));
        let requested = Arc::new(Mutex::new(Vec::new()));

        let handle = {
            let requested = Arc::clone(&requested);
            tokio::spawn(async move {
                while let Ok((tcp, _)) = listener.accept().await {
                    let step = script
                        .lock()
                        .unwrap()
                        .pop_front()
                        .unwrap_or_else(|| Step::serve(0, Vec::new(), After::Hold));
                    let requested = Arc::clone(&requested);
                    tokio::spawn(serve_connection(tcp, step, requested));
                }
            })
        };

        Self {
            addr,
            requested,
            handle,
        }
    }

    /// Stream URL of this server.
    pub fn url(&self) -> url::Url {
        url::Url::parse(&format!("ws://{}/v1/notifications", self.addr)).unwrap()
    }

    /// Revision requested by each connection attempt so far, in order.
    pub fn requested(&self) -> Vec<Option<i64>> {
        self.requested.lock().unwrap().clone()
    }

    /// Wait until at least `count` attempts were made.
    pub async fn wait_for_attempts(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(10), async {
            while self.requested().len() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_connection(
    tcp: tokio::net::TcpStream,
    step: Step,
    requested: Arc<Mutex<Vec<Option<i64>>>>,
) {
    let callback = {
        let step = step.clone();
        move |request: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
            let revision = request.uri().query().and_then(|query| {
                query
                    .split('&')
                    .filter_map(|pair| pair.split_once('='))
                    .find(|(key, _)| *key == "last_notification_revision")
                    .and_then(|(_, value)| value.parse::<i64>().ok())
            });
            requested.lock().unwrap().push(revision);

            match step {
                Step::Gone => {
                    let mut gone = ErrorResponse::new(None);
                    *gone.status_mut() = StatusCode::GONE;
                    Err(gone)
                }
                Step::Serve {
                    revision,
                    max_ping_period,
                    ..
                } => {
                    let headers = response.headers_mut();
                    headers.insert("last_notification_revision", HeaderValue::from(revision));
                    headers.insert("max_ping_period", HeaderValue::from_static(max_ping_period));
                    Ok(response)
                }
            }
        }
    };

    let Ok(mut ws) = accept_hdr_async(tcp, callback).await else {
        return;
    };
    let Step::Serve {
        notifications,
        after,
        ..
    } = step
    else {
        return;
    };

    for revision in notifications {
        let body = notification(revision).to_string();
        if ws.send(Message::Text(body.into())).await.is_err() {
            return;
        }
    }

    match after {
        After::Close => {
            let _ = ws.close(None).await;
        }
        After::Hold => while let Some(Ok(_)) = ws.next().await {},
        After::Silent => {
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(ws);
        }
    }
}

/// A broker creation notification at the given revision.
pub fn notification(revision: i64) -> serde_json::Value {
    json!({
        "id": format!("n-{revision}"),
        "revision": revision,
        "resource": "/v1/service_brokers",
        "type": "CREATED",
        "payload": {
            "new": {"resource": {"id": format!("b-{revision}"), "name": "broker", "broker_url": "https://broker"}}
        }
    })
}
