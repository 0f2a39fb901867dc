use super::{
    ApiError, CreateSessionRequest, ResizeQuery, SessionResponse, bad_request, fqdn_from_host,
    json_reply, parse_body, run_timed,
};
use crate::error::{NotFoundKind, PlaygroundError};
use crate::orchestrator::Orchestrator;
use crate::types::{InstanceConfig, SessionConfig};
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

const MAX_BODY_BYTES: u64 = 64 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct ApiContext {
    orchestrator: Arc<Orchestrator>,
    request_timeout: Duration,
}

impl ApiContext {
    pub fn new(orchestrator: Arc<Orchestrator>, request_timeout: Duration) -> Self {
        Self {
            orchestrator,
            request_timeout,
        }
    }
}

fn with_context(ctx: ApiContext) -> impl Filter<Extract = (ApiContext,), Error = Infallible> + Clone {
    warp::any().map(move || ctx.clone())
}

fn json_body() -> impl Filter<Extract = (Bytes,), Error = Rejection> + Clone {
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::bytes())
}

/// All API routes.
pub fn api_routes(
    ctx: ApiContext,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    // GET /healthz
    let healthz = warp::path!("healthz")
        .and(warp::get())
        .map(|| json_reply(&serde_json::json!({"status": "ok"}), StatusCode::OK));

    // POST /sessions
    let create_session_route = warp::path!("sessions")
        .and(warp::post())
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(create_session);

    // GET /sessions/:id
    let get_session_route = warp::path!("sessions" / String)
        .and(warp::get())
        .and(with_context(ctx.clone()))
        .and_then(get_session);

    // DELETE /sessions/:id
    let close_session_route = warp::path!("sessions" / String)
        .and(warp::delete())
        .and(with_context(ctx.clone()))
        .and_then(close_session);

    // POST /sessions/:id/instances
    let create_instance_route = warp::path!("sessions" / String / "instances")
        .and(warp::post())
        .and(warp::header::optional::<String>("host"))
        .and(json_body())
        .and(with_context(ctx.clone()))
        .and_then(create_instance);

    // DELETE /sessions/:id/instances/:name
    let delete_instance_route = warp::path!("sessions" / String / "instances" / String)
        .and(warp::delete())
        .and(with_context(ctx.clone()))
        .and_then(delete_instance);

    // POST /sessions/:id/instances/:name/resize?rows=&cols=
    let resize_instance_route = warp::path!("sessions" / String / "instances" / String / "resize")
        .and(warp::post())
        .and(warp::query::<ResizeQuery>())
        .and(with_context(ctx.clone()))
        .and_then(resize_instance);

    // GET /hosts/:label
    let resolve_host_route = warp::path!("hosts" / String)
        .and(warp::get())
        .and(with_context(ctx))
        .and_then(resolve_host);

    healthz
        .or(resolve_host_route)
        .or(create_session_route)
        .or(get_session_route)
        .or(close_session_route)
        .or(create_instance_route)
        .or(delete_instance_route)
        .or(resize_instance_route)
        .recover(handle_rejection)
}

pub(crate) async fn resolve_host(label: String, ctx: ApiContext) -> Result<Response, Rejection> {
    let orchestrator = ctx.orchestrator.clone();
    Ok(run_timed(ctx.request_timeout, async move {
        orchestrator.instance_find_by_proxy_host(&label).await
    })
    .await)
}

pub(crate) async fn create_session(body: Bytes, ctx: ApiContext) -> Result<Response, Rejection> {
    let request: CreateSessionRequest = match parse_body(&body) {
        Ok(request) => request,
        Err(e) => return Ok(bad_request(e.to_string())),
    };

    let config = SessionConfig {
        playground_id: request.playground_id,
        user_id: request.user_id,
        duration: Duration::from_secs(request.duration_secs),
        image_name: request.image_name,
    };

    let orchestrator = ctx.orchestrator.clone();
    Ok(run_timed(ctx.request_timeout, async move { orchestrator.session_new(config).await }).await)
}

pub(crate) async fn get_session(id: String, ctx: ApiContext) -> Result<Response, Rejection> {
    let orchestrator = ctx.orchestrator.clone();
    Ok(run_timed(ctx.request_timeout, async move {
        let session = orchestrator.session_get(&id).await?;
        let instances = orchestrator.instance_find_by_session(&id).await?;
        Ok(SessionResponse { session, instances })
    })
    .await)
}

pub(crate) async fn close_session(id: String, ctx: ApiContext) -> Result<Response, Rejection> {
    let orchestrator = ctx.orchestrator.clone();
    Ok(run_timed(ctx.request_timeout, async move {
        let session = orchestrator.session_get(&id).await?;
        orchestrator.session_close(&session).await?;
        Ok(session)
    })
    .await)
}

pub(crate) async fn create_instance(
    id: String,
    host: Option<String>,
    body: Bytes,
    ctx: ApiContext,
) -> Result<Response, Rejection> {
    let mut config: InstanceConfig = match parse_body(&body) {
        Ok(config) => config,
        Err(e) => return Ok(bad_request(e.to_string())),
    };
    config.playground_fqdn = fqdn_from_host(host.as_deref());

    let orchestrator = ctx.orchestrator.clone();
    Ok(run_timed(ctx.request_timeout, async move {
        let session = orchestrator.session_get(&id).await?;
        orchestrator.instance_new(&session, config).await
    })
    .await)
}

pub(crate) async fn delete_instance(
    id: String,
    name: String,
    ctx: ApiContext,
) -> Result<Response, Rejection> {
    let orchestrator = ctx.orchestrator.clone();
    Ok(run_timed(ctx.request_timeout, async move {
        let session = orchestrator.session_get(&id).await?;
        let instance = owned_instance(&orchestrator, &id, &name).await?;
        orchestrator.instance_delete(&session, &instance).await?;
        Ok(instance)
    })
    .await)
}

pub(crate) async fn resize_instance(
    id: String,
    name: String,
    query: ResizeQuery,
    ctx: ApiContext,
) -> Result<Response, Rejection> {
    let orchestrator = ctx.orchestrator.clone();
    Ok(run_timed(ctx.request_timeout, async move {
        let instance = owned_instance(&orchestrator, &id, &name).await?;
        orchestrator
            .instance_resize_terminal(&instance, query.rows, query.cols)
            .await?;
        Ok(serde_json::json!({"rows": query.rows, "cols": query.cols}))
    })
    .await)
}

/// Look up an instance, treating one from another session as missing.
async fn owned_instance(
    orchestrator: &Orchestrator,
    session_id: &str,
    name: &str,
) -> crate::error::Result<crate::types::Instance> {
    let instance = orchestrator.instance_get(name).await?;
    if instance.session_id != session_id {
        return Err(PlaygroundError::NotFound(NotFoundKind::Instance(
            name.to_string(),
        )));
    }
    Ok(instance)
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, body) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, ApiError::new("not_found"))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        (
            StatusCode::BAD_REQUEST,
            ApiError::with_message("bad_request", e.to_string()),
        )
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::new("payload_too_large"),
        )
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            ApiError::new("method_not_allowed"),
        )
    } else {
        debug!("Unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::new("internal"),
        )
    };
    Ok(json_reply(&body, status))
}
