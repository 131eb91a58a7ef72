//! Single health probe against a JSON health endpoint.
//!
//! The endpoint answers with a flat object mapping each check to a status
//! string, e.g. `{"DatabaseBackend": "working", "RedisHealthCheck": "working"}`.
//! Only an all-`working` report is healthy.

use std::time::Duration;

use bytes::Bytes;
use http::Uri;
use http_body_util::{BodyExt, Empty, Limited};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

/// Status every check must report.
pub const WORKING: &str = "working";

const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("invalid health url `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Result of a single health probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Every reported check is `working`.
    Healthy,
    /// The service answered, but these checks are not `working`.
    Degraded { failing: Vec<String> },
    /// No usable report: connection error, non-2xx, bad body, timeout.
    Failed { reason: String },
}

impl ProbeResult {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeResult::Healthy)
    }
}

/// A parsed `http://host[:port]/path?query` health URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthEndpoint {
    uri: Uri,
    address: String,
    authority: String,
}

impl HealthEndpoint {
    pub fn parse(url: &str) -> Result<Self, HealthError> {
        let invalid = |reason: &str| HealthError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http:// is supported"));
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let port = authority.port_u16().unwrap_or(80);
        let address = format!("{}:{}", authority.host(), port);
        let authority = authority.as_str().to_string();
        Ok(Self {
            uri,
            address,
            authority,
        })
    }

    /// `host:port` to connect to.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Request target, path plus query.
    pub fn target(&self) -> &str {
        self.uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    }

    pub fn url(&self) -> String {
        self.uri.to_string()
    }
}

/// Decide health from a response body.
pub fn evaluate(body: &[u8]) -> ProbeResult {
    let report: Map<String, Value> = match serde_json::from_slice(body) {
        Ok(report) => report,
        Err(e) => {
            return ProbeResult::Failed {
                reason: format!("health body is not a JSON object: {e}"),
            };
        }
    };
    if report.is_empty() {
        return ProbeResult::Failed {
            reason: "health report is empty".to_string(),
        };
    }
    let failing: Vec<String> = report
        .iter()
        .filter(|(_, status)| status.as_str() != Some(WORKING))
        .map(|(name, _)| name.clone())
        .collect();
    if failing.is_empty() {
        ProbeResult::Healthy
    } else {
        ProbeResult::Degraded { failing }
    }
}

/// Perform one GET against `endpoint`, bounded by `timeout`.
pub async fn http_probe(endpoint: &HealthEndpoint, timeout: Duration) -> ProbeResult {
    match tokio::time::timeout(timeout, fetch(endpoint)).await {
        Ok(Ok(body)) => evaluate(&body),
        Ok(Err(reason)) => {
            debug!(url = %endpoint.url(), %reason, "health probe failed");
            ProbeResult::Failed { reason }
        }
        Err(_) => {
            debug!(url = %endpoint.url(), ?timeout, "health probe timed out");
            ProbeResult::Failed {
                reason: format!("timed out after {timeout:?}"),
            }
        }
    }
}

async fn fetch(endpoint: &HealthEndpoint) -> Result<Bytes, String> {
    let stream = tokio::net::TcpStream::connect(endpoint.address())
        .await
        .map_err(|e| format!("connect {}: {e}", endpoint.address()))?;

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
        .await
        .map_err(|e| format!("handshake: {e}"))?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(endpoint.target())
        .header("host", endpoint.authority.as_str())
        .header("accept", "application/json")
        .header("user-agent", "keel-health/0.1")
        .body(Empty::<Bytes>::new())
        .map_err(|e| format!("request: {e}"))?;

    let resp = sender
        .send_request(req)
        .await
        .map_err(|e| format!("request: {e}"))?;
    let status = resp.status();
    if !status.is_success() {
        return Err(format!("HTTP {status}"));
    }

    let body = Limited::new(resp.into_body(), MAX_BODY_BYTES)
        .collect()
        .await
        .map_err(|e| format!("reading body: {e}"))?;
    Ok(body.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_working_is_healthy() {
        let body = br#"{"DatabaseBackend": "working", "Cache backend: default": "working"}"#;
        assert_eq!(evaluate(body), ProbeResult::Healthy);
    }

    #[test]
    fn one_starting_check_is_degraded() {
        let body = br#"{"DatabaseBackend": "working", "RedisHealthCheck": "starting"}"#;
        assert_eq!(
            evaluate(body),
            ProbeResult::Degraded {
                failing: vec!["RedisHealthCheck".to_string()]
            }
        );
    }

    #[test]
    fn non_string_values_are_not_working() {
        let body = br#"{"DatabaseBackend": true, "Storage": {"status": "working"}}"#;
        match evaluate(body) {
            ProbeResult::Degraded { failing } => assert_eq!(failing.len(), 2),
            other => panic!("expected Degraded, got {other:?}"),
        }
    }

    #[test]
    fn empty_or_invalid_bodies_fail() {
        assert!(matches!(evaluate(b"{}"), ProbeResult::Failed { .. }));
        assert!(matches!(evaluate(b"<html>"), ProbeResult::Failed { .. }));
        assert!(matches!(evaluate(br#"["working"]"#), ProbeResult::Failed { .. }));
    }

    #[test]
    fn endpoint_defaults_port_and_keeps_query() {
        let endpoint = HealthEndpoint::parse("http://localhost/health/?format=json").unwrap();
        assert_eq!(endpoint.address(), "localhost:80");
        assert_eq!(endpoint.target(), "/health/?format=json");

        let endpoint = HealthEndpoint::parse("http://127.0.0.1:8000").unwrap();
        assert_eq!(endpoint.address(), "127.0.0.1:8000");
        assert_eq!(endpoint.target(), "/");
    }

    #[test]
    fn endpoint_rejects_other_schemes() {
        assert!(HealthEndpoint::parse("https://example.com/health/").is_err());
        assert!(HealthEndpoint::parse("/health/").is_err());
        assert!(HealthEndpoint::parse("not a url").is_err());
    }

    #[tokio::test]
    async fn probe_to_closed_port_fails() {
        let endpoint = HealthEndpoint::parse("http://127.0.0.1:1/health/").unwrap();
        let result = http_probe(&endpoint, Duration::from_millis(200)).await;
        assert!(matches!(result, ProbeResult::Failed { .. }));
    }
}
