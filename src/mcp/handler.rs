//! MCP Streamable HTTP Handler
//!
//! `POST /mcp` carries one JSON-RPC message or a batch; `DELETE /mcp` ends
//! a session.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::context::ToolContext;
use super::protocol::{
    methods, InitializeParams, InitializeResult, ListChangedCapability, McpError, McpRequest,
    McpResponse, PingResult, PromptsGetParams, PromptsGetResult, PromptsListResult,
    ResourceContent, ResourceTemplatesListResult, ResourcesCapability, ResourcesListResult,
    ResourcesReadParams, ResourcesReadResult, ServerCapabilities, ServerInfo, ToolsCallParams,
    ToolsCallResult, ToolsListResult, JSONRPC_VERSION, MCP_PROTOCOL_VERSION,
};
use super::rate_limit::{McpRateLimiter, RateLimitConfig};
use super::registry::{McpRegistry, ToolCategory};
use crate::server::metrics::{record_rate_limit_hit, record_tool_call, set_active_sessions};
use crate::server::session::Caller;
use crate::server::state::ServerState;

pub const SESSION_HEADER: &str = "mcp-session-id";

pub const SERVER_NAME: &str = "sage-mcp-server";

/// Sessions untouched for this long are forgotten.
const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60 * 4);

const INSTRUCTIONS: &str = "Tools for the SAGE edge computing platform: query sensor data \
from nodes, look up node and sensor metadata, find plugins, submit and manage jobs, and \
search the documentation. Job tools require SAGE credentials (user:token).";

struct McpSession {
    client_name: String,
    last_seen: Instant,
}

/// State shared across MCP requests
pub struct McpState {
    pub registry: Arc<McpRegistry>,
    pub rate_limiter: Arc<McpRateLimiter>,
    sessions: Mutex<HashMap<String, McpSession>>,
}

impl McpState {
    pub fn new(registry: McpRegistry, rate_limiter: McpRateLimiter) -> Self {
        Self {
            registry: Arc::new(registry),
            rate_limiter: Arc::new(rate_limiter),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn open_session(&self, client_name: &str) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.last_seen.elapsed() < SESSION_IDLE_TIMEOUT);
        sessions.insert(
            id.clone(),
            McpSession {
                client_name: client_name.to_string(),
                last_seen: Instant::now(),
            },
        );
        set_active_sessions(sessions.len());
        id
    }

    /// Marks a session as used; false when it is unknown or expired.
    fn touch_session(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        match sessions.get_mut(id) {
            Some(session) if session.last_seen.elapsed() < SESSION_IDLE_TIMEOUT => {
                session.last_seen = Instant::now();
                true
            }
            _ => false,
        }
    }

    pub fn close_session(&self, id: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let closed = sessions.remove(id);
        set_active_sessions(sessions.len());
        if let Some(session) = &closed {
            debug!("MCP session for {} closed", session.client_name);
        }
        closed.is_some()
    }

    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn check_rate_limit(&self, caller: &str, category: ToolCategory) -> Result<(), McpError> {
        self.rate_limiter
            .check_and_record(caller, category)
            .map_err(|retry_after_secs| {
                warn!("Rate limit hit for {} ({})", caller, category.as_str());
                record_rate_limit_hit(category.as_str());
                McpError::RateLimited { retry_after_secs }
            })
    }

    /// Runs a tool after access and rate limit checks.
    pub async fn call_tool(
        &self,
        ctx: ToolContext,
        name: &str,
        arguments: Value,
    ) -> Result<ToolsCallResult, McpError> {
        let tool = self.registry.get_tool(name, ctx.is_authenticated())?;
        self.check_rate_limit(&ctx.caller(), tool.category)?;

        debug!("Calling tool {} for {}", name, ctx.caller());
        let result = (tool.handler)(ctx, arguments).await;
        let outcome = match &result {
            Ok(r) if r.is_error() => "tool_error",
            Ok(_) => "ok",
            Err(_) => "failed",
        };
        record_tool_call(name, outcome);
        result
    }

    /// Reads a resource; reads count against the read limit.
    pub async fn read_resource(
        &self,
        ctx: ToolContext,
        uri: &str,
    ) -> Result<Vec<ResourceContent>, McpError> {
        let (resource, request) = self
            .registry
            .find_resource(uri)
            .ok_or_else(|| McpError::ResourceNotFound(uri.to_string()))?;
        self.check_rate_limit(&ctx.caller(), ToolCategory::Read)?;
        (resource.handler)(ctx, request).await
    }
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, McpError> {
    serde_json::to_value(value).map_err(|e| McpError::InternalError(e.to_string()))
}

// ============================================================================
// HTTP entry points
// ============================================================================

fn session_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn json_rpc_error(status: StatusCode, error: McpError) -> Response {
    (status, Json(McpResponse::error(None, error))).into_response()
}

/// Outcome of a POST: the responses plus the session id to announce.
struct Handled {
    responses: Vec<McpResponse>,
    new_session: Option<String>,
}

/// `POST /mcp`
pub async fn mcp_post_handler(
    caller: Caller,
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let message: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => {
            return json_rpc_error(StatusCode::BAD_REQUEST, McpError::ParseError(e.to_string()))
        }
    };

    let (messages, is_batch) = match message {
        Value::Array(items) if items.is_empty() => {
            return json_rpc_error(
                StatusCode::BAD_REQUEST,
                McpError::InvalidRequest("empty batch".to_string()),
            )
        }
        Value::Array(items) => (items, true),
        single => (vec![single], false),
    };

    let session = session_id(&headers);
    let mcp_state = state.mcp_state.clone();
    if let Some(id) = &session {
        let needs_session = messages.iter().any(|m| {
            !matches!(
                m.get("method").and_then(Value::as_str),
                Some(methods::INITIALIZE) | Some(methods::PING)
            )
        });
        if needs_session && !mcp_state.touch_session(id) {
            debug!("Unknown MCP session {}", id);
            return StatusCode::NOT_FOUND.into_response();
        }
    }

    let ctx = state.tool_context(caller.credentials);
    let mut handled = Handled {
        responses: Vec::new(),
        new_session: None,
    };
    for message in messages {
        handle_message(message, &ctx, &mcp_state, &mut handled).await;
    }

    let mut response = if handled.responses.is_empty() {
        StatusCode::ACCEPTED.into_response()
    } else if is_batch {
        Json(handled.responses).into_response()
    } else {
        let single = handled.responses.swap_remove(0);
        Json(single).into_response()
    };
    if let Some(id) = handled.new_session {
        if let Ok(value) = HeaderValue::from_str(&id) {
            response.headers_mut().insert(SESSION_HEADER, value);
        }
    }
    response
}

/// `DELETE /mcp`
pub async fn mcp_delete_handler(State(state): State<ServerState>, headers: HeaderMap) -> Response {
    match session_id(&headers) {
        None => (StatusCode::BAD_REQUEST, "Missing Mcp-Session-Id header").into_response(),
        Some(id) if state.mcp_state.close_session(&id) => StatusCode::NO_CONTENT.into_response(),
        Some(_) => StatusCode::NOT_FOUND.into_response(),
    }
}

// ============================================================================
// Dispatch
// ============================================================================

async fn handle_message(
    message: Value,
    ctx: &ToolContext,
    mcp_state: &McpState,
    handled: &mut Handled,
) {
    let request: McpRequest = match serde_json::from_value(message) {
        Ok(request) => request,
        Err(e) => {
            handled.responses.push(McpResponse::error(
                None,
                McpError::InvalidRequest(e.to_string()),
            ));
            return;
        }
    };

    let Some(id) = request.id.clone() else {
        handle_notification(&request);
        return;
    };

    if request.jsonrpc != JSONRPC_VERSION {
        handled.responses.push(McpResponse::error(
            Some(id),
            McpError::InvalidRequest(format!("unsupported jsonrpc version {:?}", request.jsonrpc)),
        ));
        return;
    }

    let result = match request.method.as_str() {
        methods::INITIALIZE => handle_initialize(&request, ctx, mcp_state).map(|(value, session)| {
            handled.new_session = Some(session);
            value
        }),
        methods::PING => to_value(PingResult {}),
        methods::TOOLS_LIST => to_value(ToolsListResult {
            tools: mcp_state.registry.get_available_tools(ctx.is_authenticated()),
        }),
        methods::TOOLS_CALL => handle_tools_call(&request, ctx, mcp_state).await,
        methods::RESOURCES_LIST => to_value(ResourcesListResult {
            resources: mcp_state.registry.get_resources(),
        }),
        methods::RESOURCES_TEMPLATES_LIST => to_value(ResourceTemplatesListResult {
            resource_templates: mcp_state.registry.get_resource_templates(),
        }),
        methods::RESOURCES_READ => handle_resources_read(&request, ctx, mcp_state).await,
        methods::PROMPTS_LIST => to_value(PromptsListResult {
            prompts: mcp_state.registry.get_prompts(),
        }),
        methods::PROMPTS_GET => handle_prompts_get(&request, mcp_state),
        methods::SHUTDOWN => Ok(Value::Object(Default::default())),
        other => Err(McpError::MethodNotFound(other.to_string())),
    };

    handled.responses.push(match result {
        Ok(value) => McpResponse::success(id, value),
        Err(error) => {
            debug!("MCP {} failed: {}", request.method, error);
            McpResponse::error(Some(id), error)
        }
    });
}

fn handle_notification(request: &McpRequest) {
    match request.method.as_str() {
        methods::INITIALIZED => debug!("MCP client initialized"),
        methods::CANCELLED => debug!("MCP request cancelled by client"),
        other => debug!("Ignoring MCP notification {}", other),
    }
}

fn handle_initialize(
    request: &McpRequest,
    ctx: &ToolContext,
    mcp_state: &McpState,
) -> Result<(Value, String), McpError> {
    let params: Option<InitializeParams> = request.parse_params()?;
    let client_name = params
        .as_ref()
        .and_then(|p| p.client_info.as_ref())
        .map(|c| c.name.clone())
        .unwrap_or_else(|| "unknown".to_string());
    if let Some(version) = params.as_ref().and_then(|p| p.protocol_version.as_deref()) {
        if version != MCP_PROTOCOL_VERSION {
            debug!(
                "Client {} asked for protocol {}, answering with {}",
                client_name, version, MCP_PROTOCOL_VERSION
            );
        }
    }

    let session = mcp_state.open_session(&client_name);
    info!(
        "MCP session opened for client {} (caller {})",
        client_name,
        ctx.caller()
    );

    let result = InitializeResult {
        protocol_version: MCP_PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: ListChangedCapability {
                list_changed: false,
            },
            resources: ResourcesCapability {
                subscribe: false,
                list_changed: false,
            },
            prompts: ListChangedCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_string(),
            version: ctx.server_version.clone(),
        },
        instructions: Some(INSTRUCTIONS.to_string()),
    };
    Ok((to_value(result)?, session))
}

async fn handle_tools_call(
    request: &McpRequest,
    ctx: &ToolContext,
    mcp_state: &McpState,
) -> Result<Value, McpError> {
    let params: ToolsCallParams = request.parse_params()?;
    let arguments = params
        .arguments
        .unwrap_or_else(|| Value::Object(Default::default()));
    let result = mcp_state
        .call_tool(ctx.clone(), &params.name, arguments)
        .await?;
    to_value(result)
}

async fn handle_resources_read(
    request: &McpRequest,
    ctx: &ToolContext,
    mcp_state: &McpState,
) -> Result<Value, McpError> {
    let params: ResourcesReadParams = request.parse_params()?;
    let contents = mcp_state.read_resource(ctx.clone(), &params.uri).await?;
    to_value(ResourcesReadResult { contents })
}

fn handle_prompts_get(request: &McpRequest, mcp_state: &McpState) -> Result<Value, McpError> {
    let params: PromptsGetParams = request.parse_params()?;
    let prompt = mcp_state
        .registry
        .get_prompt(&params.name)
        .ok_or_else(|| McpError::InvalidParams(format!("Unknown prompt: {}", params.name)))?;
    let messages = (prompt.handler)(&params.arguments.unwrap_or_default())?;
    to_value(PromptsGetResult {
        description: prompt.description.clone(),
        messages,
    })
}

/// Create the MCP state with registered tools, resources and prompts
pub fn create_mcp_state(rate_limit: RateLimitConfig) -> McpState {
    let mut registry = McpRegistry::new();
    super::tools::register_all_tools(&mut registry);
    super::resources::register_all_resources(&mut registry);
    super::prompts::register_all_prompts(&mut registry);

    info!(
        "MCP registry initialized with {} tools, {} resources and {} prompts",
        registry.tool_count(),
        registry.resource_count(),
        registry.prompt_count()
    );

    McpState::new(registry, McpRateLimiter::new(rate_limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::tools::test_support::Fixture;
    use serde_json::json;

    fn state() -> McpState {
        create_mcp_state(RateLimitConfig {
            read_per_minute: 2,
            write_per_minute: 1,
        })
    }

    async fn dispatch(state: &McpState, ctx: &ToolContext, message: Value) -> Handled {
        let mut handled = Handled {
            responses: Vec::new(),
            new_session: None,
        };
        handle_message(message, ctx, state, &mut handled).await;
        handled
    }

    #[tokio::test]
    async fn test_initialize_opens_session() {
        let state = state();
        let ctx = Fixture::new().context();
        let handled = dispatch(
            &state,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                   "params": {"protocolVersion": "2024-11-05", "clientInfo": {"name": "claude"}}}),
        )
        .await;
        let session = handled.new_session.unwrap();
        assert!(state.touch_session(&session));
        assert_eq!(state.session_count(), 1);

        let result = handled.responses[0].result.as_ref().unwrap();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);

        assert!(state.close_session(&session));
        assert!(!state.touch_session(&session));
    }

    #[tokio::test]
    async fn test_notifications_get_no_response() {
        let state = state();
        let ctx = Fixture::new().context();
        let handled = dispatch(
            &state,
            &ctx,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .await;
        assert!(handled.responses.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_version() {
        let state = state();
        let ctx = Fixture::new().context();
        let handled = dispatch(&state, &ctx, json!({"jsonrpc": "2.0", "id": 1, "method": "nope"})).await;
        assert_eq!(handled.responses[0].error.as_ref().unwrap().code, -32601);

        let handled = dispatch(&state, &ctx, json!({"jsonrpc": "1.0", "id": 2, "method": "ping"})).await;
        assert_eq!(handled.responses[0].error.as_ref().unwrap().code, -32600);
    }

    #[tokio::test]
    async fn test_anonymous_caller_cannot_see_job_tools() {
        let state = state();
        let anonymous = Fixture::new().context();
        let handled = dispatch(
            &state,
            &anonymous,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
        )
        .await;
        let tools = handled.responses[0].result.as_ref().unwrap()["tools"]
            .as_array()
            .unwrap()
            .clone();
        assert!(tools.iter().all(|t| t["name"] != "submit_plugin_job"));
        assert!(tools.iter().any(|t| t["name"] == "get_node_info"));

        let handled = dispatch(
            &state,
            &anonymous,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "check_job_status", "arguments": {"job_id": "42"}}}),
        )
        .await;
        assert_eq!(handled.responses[0].error.as_ref().unwrap().code, -32002);
    }

    #[tokio::test]
    async fn test_rate_limit_per_category() {
        let state = state();
        let fixture = Fixture::new().authenticated();
        let ctx = fixture.context();
        let call = |id: i64| {
            json!({"jsonrpc": "2.0", "id": id, "method": "tools/call",
                   "params": {"name": "suspend_job", "arguments": {"job_id": "42"}}})
        };

        let first = dispatch(&state, &ctx, call(1)).await;
        assert!(first.responses[0].result.is_some());
        let second = dispatch(&state, &ctx, call(2)).await;
        let error = second.responses[0].error.as_ref().unwrap();
        assert_eq!(error.code, -32003);
        assert!(error.data.is_some());

        // Reads have their own budget.
        let read = dispatch(
            &state,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                   "params": {"name": "sage_faq", "arguments": {}}}),
        )
        .await;
        assert!(read.responses[0].result.is_some());
    }

    #[tokio::test]
    async fn test_status_polls_do_not_use_write_budget() {
        let state = create_mcp_state(RateLimitConfig {
            read_per_minute: 10,
            write_per_minute: 1,
        });
        let fixture = Fixture::new().authenticated();
        let ctx = fixture.context();
        for id in 1..=3 {
            let poll = dispatch(
                &state,
                &ctx,
                json!({"jsonrpc": "2.0", "id": id, "method": "tools/call",
                       "params": {"name": "check_job_status", "arguments": {"job_id": "42"}}}),
            )
            .await;
            assert!(poll.responses[0].result.is_some());
        }

        let suspend = dispatch(
            &state,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
                   "params": {"name": "suspend_job", "arguments": {"job_id": "42"}}}),
        )
        .await;
        assert!(suspend.responses[0].result.is_some());
    }

    #[tokio::test]
    async fn test_prompts_get() {
        let state = state();
        let ctx = Fixture::new().context();
        let handled = dispatch(
            &state,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 1, "method": "prompts/get",
                   "params": {"name": "troubleshooting_guide"}}),
        )
        .await;
        let result = handled.responses[0].result.as_ref().unwrap();
        assert_eq!(result["messages"][0]["role"], "user");
        assert_eq!(result["messages"][0]["content"]["type"], "text");

        let handled = dispatch(
            &state,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 2, "method": "prompts/get", "params": {"name": "nope"}}),
        )
        .await;
        assert_eq!(handled.responses[0].error.as_ref().unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_resource_templates_list() {
        let state = state();
        let ctx = Fixture::new().context();
        let handled = dispatch(
            &state,
            &ctx,
            json!({"jsonrpc": "2.0", "id": 1, "method": "resources/templates/list"}),
        )
        .await;
        let templates = handled.responses[0].result.as_ref().unwrap()["resourceTemplates"]
            .as_array()
            .unwrap()
            .clone();
        let uris: Vec<&str> = templates
            .iter()
            .filter_map(|t| t["uriTemplate"].as_str())
            .collect();
        assert!(uris.contains(&"query://{plugin}"));
        assert!(uris.contains(&"docs://faq/{topic}"));
    }
}
