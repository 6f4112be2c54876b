//! Probe logic.
//!
//! A probe runs exactly one check against one target and classifies the
//! outcome. It never touches shared state and never retries.

use std::time::Duration;

use tracing::{debug, warn};
use vigil_state::{ServiceId, ServiceStatus};

/// Unencrypted web check.
pub const SERVICE_HTTP: ServiceId = 1;
/// Encrypted web check. Shares the HTTP probe.
pub const SERVICE_HTTPS: ServiceId = 2;
/// Certificate expiry check. No probe exists for it yet.
pub const SERVICE_SSL_CERTIFICATE: ServiceId = 3;

/// Message and classification from one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub message: String,
    pub status: ServiceStatus,
}

impl CheckOutcome {
    pub fn healthy(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: ServiceStatus::Healthy,
        }
    }

    pub fn problem(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: ServiceStatus::Problem,
        }
    }
}

/// Result of dispatching a probe by service kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    /// The probe ran and produced a classification.
    Checked(CheckOutcome),
    /// No probe exists for this service kind. Nothing must be persisted.
    Unsupported(ServiceId),
}

/// Run the probe for `service_id` against `target`.
pub async fn probe(service_id: ServiceId, target: &str, timeout: Duration) -> ProbeOutcome {
    match service_id {
        SERVICE_HTTP | SERVICE_HTTPS => ProbeOutcome::Checked(http_probe(target, timeout).await),
        other => {
            warn!(service_id = other, %target, "no probe for service kind");
            ProbeOutcome::Unsupported(other)
        }
    }
}

/// Strip one trailing slash and downgrade `https://` to `http://`.
///
/// The downgrade means HTTPS targets are probed over plain HTTP. Existing
/// deployments rely on it, so it is kept as-is.
pub fn normalize_target(target: &str) -> String {
    let trimmed = target.strip_suffix('/').unwrap_or(target);
    trimmed.replace("https://", "http://")
}

/// Issue a single GET against `target`.
///
/// 2xx is `healthy`; any other status, and any connect, handshake or
/// timeout failure, is `problem`.
pub async fn http_probe(target: &str, timeout: Duration) -> CheckOutcome {
    let url = normalize_target(target);
    let connect_failed = || CheckOutcome::problem(format!("{url} - error connecting"));

    let uri: http::Uri = match url.parse() {
        Ok(uri) => uri,
        Err(e) => {
            debug!(error = %e, %url, "probe target is not a valid url");
            return connect_failed();
        }
    };
    let Some(host) = uri.host().map(str::to_string) else {
        debug!(%url, "probe target has no host");
        return connect_failed();
    };
    let port = uri.port_u16().unwrap_or(80);
    let path = uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "/".to_string());
    let authority = uri
        .authority()
        .map(|a| a.as_str().to_string())
        .unwrap_or_else(|| host.clone());

    let result = tokio::time::timeout(timeout, async {
        let stream = match tokio::net::TcpStream::connect((host.as_str(), port)).await {
            Ok(s) => s,
            Err(e) => {
                debug!(error = %e, %url, "probe connection failed");
                return None;
            }
        };

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
            Ok(pair) => pair,
            Err(e) => {
                debug!(error = %e, %url, "probe handshake failed");
                return None;
            }
        };

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = match http::Request::builder()
            .method("GET")
            .uri(path.as_str())
            .header("host", authority.as_str())
            .header("user-agent", "vigil-health/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
        {
            Ok(req) => req,
            Err(e) => {
                debug!(error = %e, %url, "probe request could not be built");
                return None;
            }
        };

        match sender.send_request(req).await {
            Ok(resp) => Some(resp.status()),
            Err(e) => {
                debug!(error = %e, %url, "probe request failed");
                None
            }
        }
    })
    .await;

    match result {
        Ok(Some(status)) => {
            let message = format!("{url} - {status}");
            if status.is_success() {
                CheckOutcome::healthy(message)
            } else {
                debug!(%status, %url, "probe non-2xx");
                CheckOutcome::problem(message)
            }
        }
        Ok(None) => connect_failed(),
        Err(_) => {
            debug!(%url, "probe timed out");
            connect_failed()
        }
    }
}
