//! Common test infrastructure
//!
//! This module provides all the infrastructure needed for end-to-end tests.
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestServer, TestClient, NODE_1_VSN};
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_node_info() {
//!     let server = TestServer::spawn().await;
//!     let client = TestClient::anonymous(server.base_url.clone());
//!
//!     let (text, is_error) = client
//!         .call_tool_text("get_node_info", json!({"node_id": NODE_1_VSN}))
//!         .await;
//!     assert!(!is_error);
//! }
//! ```

mod client;
mod constants;
mod mock_upstream;
mod server;

// Public API - this is what tests import
pub use client::TestClient;
pub use constants::*;
#[allow(unused_imports)]
pub use server::{TestServer, TestServerOptions};
