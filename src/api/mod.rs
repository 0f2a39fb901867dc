//! HTTP surface over the orchestrator.
//!
//! Errors map to status codes through [`status_for`]; every operation runs
//! under the configured request timeout and answers 504 when it expires.

mod routes;

pub use routes::{ApiContext, api_routes};

use crate::error::{NotFoundKind, PlaygroundError};
use crate::types::{Instance, Session};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use warp::http::StatusCode;
use warp::reply::{self, Reply, Response};

use crate::orchestrator::Orchestrator;

/// Error payload returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ApiError {
    pub fn new(code: &str) -> Self {
        Self {
            error: code.to_string(),
            message: None,
        }
    }

    pub fn with_message(code: &str, message: impl Into<String>) -> Self {
        Self {
            error: code.to_string(),
            message: Some(message.into()),
        }
    }
}

/// Body of `POST /sessions`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub playground_id: String,
    #[serde(default)]
    pub user_id: String,
    /// Zero or absent means the playground default
    #[serde(default)]
    pub duration_secs: u64,
    #[serde(default)]
    pub image_name: Option<String>,
}

/// Query of the terminal resize route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ResizeQuery {
    pub rows: u16,
    pub cols: u16,
}

/// A session together with its instances.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: Session,
    pub instances: Vec<Instance>,
}

/// HTTP status for an orchestrator error.
pub fn status_for(err: &PlaygroundError) -> StatusCode {
    match err {
        PlaygroundError::NotFound(NotFoundKind::Playground(_)) => StatusCode::BAD_REQUEST,
        PlaygroundError::NotFound(_) => StatusCode::NOT_FOUND,
        PlaygroundError::PolicyDenied { .. } => StatusCode::UNAUTHORIZED,
        PlaygroundError::SessionComplete { .. } => StatusCode::CONFLICT,
        PlaygroundError::CapacityExhausted => StatusCode::SERVICE_UNAVAILABLE,
        PlaygroundError::Runtime(_)
        | PlaygroundError::Storage(_)
        | PlaygroundError::Provisioning(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error payload for an orchestrator error.
///
/// Internal failures carry no message; details only go to the log.
pub fn error_body(err: &PlaygroundError) -> ApiError {
    match err {
        PlaygroundError::CapacityExhausted => ApiError::new("out_of_capacity"),
        PlaygroundError::SessionComplete { .. } => {
            ApiError::with_message("session_complete", err.to_string())
        }
        PlaygroundError::PolicyDenied { .. } => {
            ApiError::with_message("policy_denied", err.to_string())
        }
        PlaygroundError::NotFound(_) => ApiError::with_message("not_found", err.to_string()),
        _ => ApiError::new("internal"),
    }
}

pub(crate) fn json_reply<T: Serialize>(value: &T, status: StatusCode) -> Response {
    reply::with_status(reply::json(value), status).into_response()
}

pub(crate) fn error_reply(err: &PlaygroundError) -> Response {
    let status = status_for(err);
    if status.is_server_error() && !err.is_out_of_capacity() {
        error!("Request failed: {}", err);
    } else {
        info!("Request rejected ({}): {}", status.as_u16(), err);
    }
    json_reply(&error_body(err), status)
}

pub(crate) fn bad_request(message: impl Into<String>) -> Response {
    json_reply(
        &ApiError::with_message("bad_request", message),
        StatusCode::BAD_REQUEST,
    )
}

/// Decode a JSON body. An empty body decodes to `T::default()`.
pub fn parse_body<T>(body: &[u8]) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
}

/// Public FQDN from a `Host` header, without the port.
pub fn fqdn_from_host(host: Option<&str>) -> String {
    let host = host.unwrap_or_default().trim();
    match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name.to_string(),
        _ => host.to_string(),
    }
}

/// Run `op` under `timeout` and turn the outcome into a response.
pub(crate) async fn run_timed<T, F>(timeout: Duration, op: F) -> Response
where
    T: Serialize,
    F: Future<Output = crate::error::Result<T>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(Ok(value)) => json_reply(&value, StatusCode::OK),
        Ok(Err(e)) => error_reply(&e),
        Err(_) => {
            warn!("Request exceeded {:?}", timeout);
            json_reply(&ApiError::new("timeout"), StatusCode::GATEWAY_TIMEOUT)
        }
    }
}

/// HTTP server bound to one orchestrator.
pub struct ApiServer {
    context: ApiContext,
}

impl ApiServer {
    pub fn new(orchestrator: Arc<Orchestrator>, request_timeout: Duration) -> Self {
        Self {
            context: ApiContext::new(orchestrator, request_timeout),
        }
    }

    /// Serve until `shutdown` resolves.
    pub async fn run<S>(self, addr: SocketAddr, shutdown: S)
    where
        S: Future<Output = ()>,
    {
        let routes = api_routes(self.context);
        info!("API listening on http://{}", addr);

        tokio::select! {
            _ = warp::serve(routes).run(addr) => {}
            _ = shutdown => info!("API server shutting down"),
        }
    }
}
