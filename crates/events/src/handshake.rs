//! Opening the notification stream.
//!
//! The client asks to resume after its last known revision via the
//! `last_notification_revision` query parameter. The server either upgrades,
//! answering with the revision to resume after and the longest keepalive
//! interval it tolerates, or refuses with `410 Gone` when that revision has
//! aged out.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderMap, HeaderValue, StatusCode, header};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};
use crate::types::Revision;

/// Query parameter and response header carrying a revision.
pub const REVISION_PARAM: &str = "last_notification_revision";

/// Response header carrying the maximum keepalive interval.
pub const MAX_PING_PERIOD_HEADER: &str = "max_ping_period";

/// Upgraded notification stream socket.
pub type NotificationSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the server agreed to during the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    /// Revision after which notifications will be delivered.
    pub revision: Revision,
    /// Longest interval the server tolerates between keepalives.
    pub max_ping_period: Duration,
}

/// Basic credentials presented on the upgrade request.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", self.username, self.password))
        )
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Stream URL with the resume position attached, if one is known.
pub fn stream_url(base: &Url, last: Revision) -> Url {
    let mut url = base.clone();
    if last.is_known() {
        url.query_pairs_mut()
            .append_pair(REVISION_PARAM, &last.value().to_string());
    }
    url
}

/// Read the handshake headers of a successful upgrade.
///
/// When a revision was requested the server may omit the revision header and
/// the requested one stands.
pub fn parse_handshake(headers: &HeaderMap, requested: Revision) -> Result<Handshake> {
    let revision = match header_str(headers, REVISION_PARAM)? {
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map(Revision::new)
            .map_err(|e| Error::invalid_handshake(format!("bad {REVISION_PARAM} '{value}': {e}")))?,
        None if requested.is_known() => requested,
        None => {
            return Err(Error::invalid_handshake(format!(
                "missing {REVISION_PARAM} header"
            )));
        }
    };
    if !revision.is_known() {
        return Err(Error::invalid_handshake(format!(
            "server answered with invalid revision {}",
            revision.value()
        )));
    }

    let max_ping_period = header_str(headers, MAX_PING_PERIOD_HEADER)?
        .ok_or_else(|| Error::invalid_handshake(format!("missing {MAX_PING_PERIOD_HEADER} header")))
        .and_then(parse_duration)?;
    if max_ping_period.is_zero() {
        return Err(Error::invalid_handshake("max_ping_period must be positive"));
    }

    Ok(Handshake {
        revision,
        max_ping_period,
    })
}

/// Open the stream, resuming after `last` when it is known.
pub async fn connect(
    base: &Url,
    credentials: Option<&Credentials>,
    last: Revision,
) -> Result<(NotificationSocket, Handshake)> {
    use tokio_tungstenite::tungstenite::Error as WsError;

    let url = stream_url(base, last);
    let mut request = url.as_str().into_client_request()?;
    if let Some(credentials) = credentials {
        let value = HeaderValue::from_str(&credentials.authorization())
            .map_err(|e| Error::connection_failed(format!("invalid credentials: {e}")))?;
        request.headers_mut().insert(header::AUTHORIZATION, value);
    }

    debug!(url = %base, revision = %last, "Opening notification stream");
    match connect_async(request).await {
        Ok((socket, response)) => {
            let handshake = parse_handshake(response.headers(), last)?;
            Ok((socket, handshake))
        }
        Err(WsError::Http(response)) if response.status() == StatusCode::GONE => {
            Err(Error::RevisionGone {
                revision: last.value(),
            })
        }
        Err(WsError::Http(response)) => Err(Error::connection_failed(format!(
            "upgrade rejected with status {}",
            response.status()
        ))),
        Err(e) => Err(e.into()),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>> {
    headers
        .get(name)
        .map(|value| {
            value
                .to_str()
                .map_err(|e| Error::invalid_handshake(format!("non-ascii {name} header: {e}")))
        })
        .transpose()
}

/// Durations arrive as strings such as `1m0s`, `30s` or `500ms`; bare
/// integers are taken as milliseconds.
fn parse_duration(value: &str) -> Result<Duration> {
    let value = value.trim();
    if let Ok(millis) = value.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(value)
        .map_err(|e| Error::invalid_handshake(format!("bad {MAX_PING_PERIOD_HEADER} '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_stream_url_carries_known_revision_only() {
        let base = Url::parse("ws://registry/v1/notifications").unwrap();
        assert_eq!(stream_url(&base, Revision::UNKNOWN).as_str(), "ws://registry/v1/notifications");
        assert_eq!(
            stream_url(&base, Revision::new(7)).as_str(),
            "ws://registry/v1/notifications?last_notification_revision=7"
        );
    }

    #[test]
    fn test_parse_handshake_with_server_revision() {
        let handshake = parse_handshake(
            &headers(&[(REVISION_PARAM, "41"), (MAX_PING_PERIOD_HEADER, "1m0s")]),
            Revision::UNKNOWN,
        )
        .unwrap();
        assert_eq!(handshake.revision, Revision::new(41));
        assert_eq!(handshake.max_ping_period, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_handshake_keeps_requested_revision() {
        let handshake =
            parse_handshake(&headers(&[(MAX_PING_PERIOD_HEADER, "30s")]), Revision::new(7)).unwrap();
        assert_eq!(handshake.revision, Revision::new(7));
        assert_eq!(handshake.max_ping_period, Duration::from_secs(30));
    }

    #[test]
    fn test_parse_handshake_requires_revision_on_fresh_start() {
        let result = parse_handshake(&headers(&[(MAX_PING_PERIOD_HEADER, "30s")]), Revision::UNKNOWN);
        assert!(matches!(result, Err(Error::InvalidHandshake { .. })));
    }

    #[test]
    fn test_parse_handshake_requires_ping_period() {
        let result = parse_handshake(&headers(&[(REVISION_PARAM, "1")]), Revision::UNKNOWN);
        assert!(matches!(result, Err(Error::InvalidHandshake { .. })));
    }

    #[test]
    fn test_parse_handshake_rejects_garbage() {
        let result = parse_handshake(
            &headers(&[(REVISION_PARAM, "abc"), (MAX_PING_PERIOD_HEADER, "30s")]),
            Revision::UNKNOWN,
        );
        assert!(result.is_err());
        let result = parse_handshake(
            &headers(&[(REVISION_PARAM, "1"), (MAX_PING_PERIOD_HEADER, "soon")]),
            Revision::UNKNOWN,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_duration_accepts_millis() {
        assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_credentials_header_and_redaction() {
        let credentials = Credentials::new("agent", "secret");
        assert_eq!(credentials.authorization(), "Basic YWdlbnQ6c2VjcmV0");
        assert!(!format!("{credentials:?}").contains("secret"));
    }
}
