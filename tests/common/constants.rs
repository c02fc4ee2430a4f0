//! Shared constants for end-to-end tests
//!
//! This module contains all constants used across the test suite.
//! When the mock upstream data changes, update only this file.

// ============================================================================
// Test Credentials
// ============================================================================

/// User accepted by the mock scheduler and storage
pub const TEST_USER: &str = "alice";

/// Token accepted by the mock scheduler and storage
pub const TEST_TOKEN: &str = "secret-token";

/// A token the mock upstreams reject
pub const BAD_TOKEN: &str = "expired-token";

// ============================================================================
// Mock Upstream Data
// ============================================================================

/// Node present in the manifests and the data API
pub const NODE_1_VSN: &str = "W023";

/// Name of NODE_1 in the manifests
pub const NODE_1_NAME: &str = "000048b02d15bc7c";

/// Second deployed node, with no data
pub const NODE_2_VSN: &str = "W027";

/// Job id returned by the mock scheduler on submit
pub const SUBMITTED_JOB_ID: &str = "4242";

/// Path of the protected image on the mock storage
pub const IMAGE_PATH: &str = "/api/v1/data/W023/sample.jpg";

/// Bytes of the protected image
pub const IMAGE_BYTES: &[u8] = b"\xff\xd8\xff\xe0fake-jpeg";

// ============================================================================
// Timeouts
// ============================================================================

/// Maximum time to wait for the server to become ready
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Delay between readiness polls
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;

/// Timeout for test requests
pub const REQUEST_TIMEOUT_SECS: u64 = 10;
