//! HTTP client for end-to-end tests
//!
//! This module provides a high-level HTTP client that wraps reqwest
//! and speaks MCP JSON-RPC to the server under test.
//!
//! When API routes or request formats change, update only this file.

use super::constants::*;
use reqwest::Response;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP test client carrying optional SAGE credentials and an MCP session
pub struct TestClient {
    /// The underlying reqwest client (public for custom requests in tests)
    pub client: reqwest::Client,
    /// The base URL of the test server
    pub base_url: String,
    /// Value sent as `X-Sage-Token`
    token: Option<String>,
    /// Session announced by the server on `initialize`
    pub session_id: Option<String>,
    next_id: AtomicU64,
}

impl TestClient {
    /// Creates a client that sends no credentials
    pub fn anonymous(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build reqwest client");

        Self {
            client,
            base_url,
            token: None,
            session_id: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Creates a client sending `user:token` the mock upstreams accept
    pub fn authenticated(base_url: String) -> Self {
        Self::with_token(base_url, &format!("{}:{}", TEST_USER, TEST_TOKEN))
    }

    /// Creates a client sending an arbitrary token
    pub fn with_token(base_url: String, token: &str) -> Self {
        let mut client = Self::anonymous(base_url);
        client.token = Some(token.to_string());
        client
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self
            .client
            .request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = &self.token {
            request = request.header("x-sage-token", token);
        }
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }
        request
    }

    // ========================================================================
    // Raw MCP transport
    // ========================================================================

    /// POSTs any JSON body to `/mcp`
    pub async fn post_mcp(&self, body: Value) -> Response {
        self.request(reqwest::Method::POST, "/mcp")
            .json(&body)
            .send()
            .await
            .expect("POST /mcp failed")
    }

    /// Sends one JSON-RPC request and returns the decoded response message
    pub async fn rpc(&self, method: &str, params: Value) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .post_mcp(json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}))
            .await;
        assert!(
            response.status().is_success(),
            "{} returned HTTP {}",
            method,
            response.status()
        );
        let message: Value = response.json().await.expect("Invalid JSON-RPC response");
        assert_eq!(message["id"], id);
        message
    }

    /// Sends a notification (no id)
    pub async fn notify(&self, method: &str) -> Response {
        self.post_mcp(json!({"jsonrpc": "2.0", "method": method}))
            .await
    }

    /// Runs the initialize handshake and remembers the session id
    pub async fn initialize(&mut self) -> Value {
        let response = self
            .post_mcp(json!({
                "jsonrpc": "2.0",
                "id": 0,
                "method": "initialize",
                "params": {
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {"name": "e2e-tests", "version": "1.0"}
                }
            }))
            .await;
        assert!(response.status().is_success());
        self.session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let message: Value = response.json().await.expect("Invalid initialize response");
        self.notify("notifications/initialized").await;
        message
    }

    /// Ends the session with `DELETE /mcp`
    pub async fn close_session(&self) -> Response {
        self.request(reqwest::Method::DELETE, "/mcp")
            .send()
            .await
            .expect("DELETE /mcp failed")
    }

    // ========================================================================
    // MCP helpers
    // ========================================================================

    /// Names of the tools visible to this client
    pub async fn tool_names(&self) -> Vec<String> {
        let message = self.rpc("tools/list", json!({})).await;
        message["result"]["tools"]
            .as_array()
            .expect("tools/list without tools")
            .iter()
            .filter_map(|t| t["name"].as_str().map(str::to_string))
            .collect()
    }

    /// Calls a tool and returns the whole JSON-RPC response
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Value {
        self.rpc("tools/call", json!({"name": name, "arguments": arguments}))
            .await
    }

    /// Calls a tool and returns `(text, is_error)`, panicking on JSON-RPC errors
    pub async fn call_tool_text(&self, name: &str, arguments: Value) -> (String, bool) {
        let message = self.call_tool(name, arguments).await;
        assert!(
            message.get("error").is_none(),
            "{} failed: {}",
            name,
            message["error"]
        );
        let result = &message["result"];
        let text = result["content"]
            .as_array()
            .expect("tool result without content")
            .iter()
            .filter_map(|c| c["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n");
        (text, result["isError"].as_bool().unwrap_or(false))
    }

    /// Reads a resource over JSON-RPC and returns its text
    pub async fn read_resource(&self, uri: &str) -> Value {
        self.rpc("resources/read", json!({"uri": uri})).await
    }

    // ========================================================================
    // Plain HTTP endpoints
    // ========================================================================

    pub async fn get_home(&self) -> Response {
        self.request(reqwest::Method::GET, "/")
            .send()
            .await
            .expect("GET / failed")
    }

    pub async fn get_tools(&self) -> Response {
        self.request(reqwest::Method::GET, "/mcp/tools")
            .send()
            .await
            .expect("GET /mcp/tools failed")
    }

    pub async fn get_resource(&self, uri: &str) -> Response {
        let path = format!("/mcp/resources/{}", urlencoding::encode(uri));
        self.request(reqwest::Method::GET, &path)
            .send()
            .await
            .expect("GET /mcp/resources failed")
    }

    pub async fn get_proxied_image(&self, url: &str) -> Response {
        let path = format!("/proxy/image?url={}", urlencoding::encode(url));
        self.request(reqwest::Method::GET, &path)
            .send()
            .await
            .expect("GET /proxy/image failed")
    }
}
