use anyhow::{Context, Result};
use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, Instant},
};

use tracing::{error, info, warn};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use super::image_proxy::{ImageProxy, ProxyError};
use super::metrics::metrics_handler;
use super::session::Caller;
use super::{log_requests, state::*};
use crate::config::AppConfig;
use crate::mcp::handler::{SERVER_NAME, SESSION_HEADER};
use crate::mcp::{create_mcp_state, mcp_delete_handler, mcp_post_handler, McpError};
use crate::services::SageServices;

/// How often stale rate limiter windows are dropped.
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

const PROXY_CACHE_HEADER: &str = "x-sage-proxy";

#[derive(Serialize)]
struct ServerStats {
    pub name: &'static str,
    pub version: String,
    pub uptime: String,
    pub tools: usize,
    pub resources: usize,
    pub prompts: usize,
    pub sessions: usize,
}

fn format_uptime(duration: Duration) -> String {
    let total_seconds = duration.as_secs();

    let days = total_seconds / 86_400;
    let hours = (total_seconds % 86_400) / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    format!("{}d {:02}:{:02}:{:02}", days, hours, minutes, seconds)
}

async fn home(State(state): State<ServerState>) -> impl IntoResponse {
    let registry = &state.mcp_state.registry;
    let stats = ServerStats {
        name: SERVER_NAME,
        version: state.version(),
        uptime: format_uptime(state.start_time.elapsed()),
        tools: registry.tool_count(),
        resources: registry.resource_count(),
        prompts: registry.prompt_count(),
        sessions: state.mcp_state.session_count(),
    };
    Json(stats)
}

/// Tools the caller may use, for clients that want a quick look without
/// speaking JSON-RPC.
async fn list_tools(caller: Caller, State(state): State<ServerState>) -> impl IntoResponse {
    let tools = state
        .mcp_state
        .registry
        .get_available_tools(caller.is_authenticated());
    Json(tools)
}

fn mcp_error_status(error: &McpError) -> StatusCode {
    match error {
        McpError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
        McpError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        McpError::Unauthorized => StatusCode::UNAUTHORIZED,
        McpError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        McpError::InvalidParams(_) | McpError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn read_resource(
    caller: Caller,
    State(state): State<ServerState>,
    Path(uri): Path<String>,
) -> Response {
    let ctx = state.tool_context(caller.credentials);
    match state.mcp_state.read_resource(ctx, &uri).await {
        Ok(contents) => {
            let mime_type = contents
                .first()
                .and_then(|c| c.mime_type.clone())
                .unwrap_or_else(|| "text/plain".to_string());
            let body = contents
                .into_iter()
                .map(|c| c.text)
                .collect::<Vec<_>>()
                .join("\n");
            ([(header::CONTENT_TYPE, mime_type)], body).into_response()
        }
        Err(e) => (mcp_error_status(&e), e.message()).into_response(),
    }
}

#[derive(Deserialize, Debug)]
struct ImageQuery {
    pub url: Option<String>,
}

async fn proxy_image(
    caller: Caller,
    State(proxy): State<GuardedImageProxy>,
    Query(query): Query<ImageQuery>,
) -> Response {
    let Some(url) = query.url.filter(|u| !u.trim().is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing url parameter").into_response();
    };

    match proxy.fetch(caller.credentials.as_ref(), &url).await {
        Ok((file, cache_status)) => {
            let cache_control = format!("private, max-age={}", proxy.ttl().as_secs());
            let content_type = file.content_type.clone();
            let mut response = (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CACHE_CONTROL, cache_control),
                ],
                file.into_body(),
            )
                .into_response();
            response.headers_mut().insert(
                PROXY_CACHE_HEADER,
                HeaderValue::from_static(cache_status.as_str()),
            );
            response
        }
        Err(e) => {
            let status = match &e {
                ProxyError::InvalidUrl(_) | ProxyError::HostNotAllowed(_) => {
                    StatusCode::BAD_REQUEST
                }
                ProxyError::Denied(401) => StatusCode::UNAUTHORIZED,
                ProxyError::Denied(_) => StatusCode::FORBIDDEN,
                ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            };
            warn!("Image proxy refused {}: {}", url, e);
            (status, e.to_string()).into_response()
        }
    }
}

fn make_state(config: AppConfig, services: SageServices) -> Result<ServerState> {
    let image_proxy = ImageProxy::new(config.image_proxy.clone(), config.upstream.timeout_sec)
        .context("Failed to build image proxy")?;
    let mcp_state = create_mcp_state(config.rate_limit.clone());
    Ok(ServerState {
        config: Arc::new(config),
        start_time: Instant::now(),
        services,
        mcp_state: Arc::new(mcp_state),
        image_proxy: Arc::new(image_proxy),
        hash: env!("GIT_HASH").to_owned(),
    })
}

fn make_router(state: ServerState) -> Router {
    let mcp_routes: Router = Router::new()
        .route("/tools", get(list_tools))
        .route("/resources/{*uri}", get(read_resource))
        .with_state(state.clone());

    let proxy_routes: Router = Router::new()
        .route("/image", get(proxy_image))
        .with_state(state.clone());

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers([header::HeaderName::from_static(SESSION_HEADER)]);

    let home_router: Router = Router::new()
        .route("/", get(home))
        .route("/mcp", post(mcp_post_handler).delete(mcp_delete_handler))
        .with_state(state.clone());

    home_router
        .nest("/mcp", mcp_routes)
        .nest("/proxy", proxy_routes)
        .layer(cors)
        .layer(middleware::from_fn_with_state(state, log_requests))
}

/// Builds the full HTTP application for `config`, talking to `services`.
pub async fn make_app(config: AppConfig, services: SageServices) -> Result<Router> {
    Ok(make_router(make_state(config, services)?))
}

async fn run_metrics_server(port: u16) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([0, 0, 0, 0], port)))
        .await
        .with_context(|| format!("Failed to bind metrics port {}", port))?;
    Ok(axum::serve(listener, app).await?)
}

pub async fn run_server(config: AppConfig, services: SageServices) -> Result<()> {
    let address = SocketAddr::new(config.bind_address, config.port);
    let metrics_port = config.metrics_port;
    let state = make_state(config, services)?;

    if metrics_port > 0 {
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(metrics_port).await {
                error!("Metrics server stopped: {:#}", e);
            }
        });
        info!("Metrics available at port {}!", metrics_port);
    }

    let rate_limiter = state.mcp_state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            rate_limiter.cleanup_stale_entries();
        }
    });

    let app = make_router(state);

    let listener = tokio::net::TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind {}", address))?;
    info!("Ready to serve at {}!", address);

    Ok(axum::serve(listener, app).await?)
}
