//! MCP Rate Limiting
//!
//! Per-caller rate limiting for MCP tool calls. Callers are keyed by the
//! identity derived from their credentials (see `SageCredentials::identity`),
//! anonymous callers share one bucket.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::registry::ToolCategory;

const WINDOW: Duration = Duration::from_secs(60);

/// Rate limit configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub read_per_minute: u32,
    pub write_per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            read_per_minute: 120,
            write_per_minute: 30,
        }
    }
}

/// Tracks rate limit state for a single caller
#[derive(Debug)]
struct CallerRateLimitState {
    read_count: u32,
    write_count: u32,
    window_start: Instant,
}

impl CallerRateLimitState {
    fn new() -> Self {
        Self {
            read_count: 0,
            write_count: 0,
            window_start: Instant::now(),
        }
    }

    fn reset_if_expired(&mut self) {
        if self.window_start.elapsed() > WINDOW {
            self.read_count = 0;
            self.write_count = 0;
            self.window_start = Instant::now();
        }
    }
}

/// Rate limiter for MCP tool calls
pub struct McpRateLimiter {
    config: RateLimitConfig,
    states: Mutex<HashMap<String, CallerRateLimitState>>,
}

impl McpRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Check if a call is allowed and record it if so.
    /// Returns Ok(()) if allowed, Err(retry_after_secs) if rate limited.
    pub fn check_and_record(&self, caller: &str, category: ToolCategory) -> Result<(), u32> {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let state = states
            .entry(caller.to_string())
            .or_insert_with(CallerRateLimitState::new);

        state.reset_if_expired();

        let (current, limit) = match category {
            ToolCategory::Read => (&mut state.read_count, self.config.read_per_minute),
            ToolCategory::Write => (&mut state.write_count, self.config.write_per_minute),
        };

        if *current >= limit {
            let elapsed = state.window_start.elapsed().as_secs();
            let retry_after = WINDOW.as_secs().saturating_sub(elapsed) as u32;
            return Err(retry_after.max(1));
        }

        *current += 1;
        Ok(())
    }

    /// Current (read, write) usage for a caller
    pub fn get_usage(&self, caller: &str) -> Option<(u32, u32)> {
        let states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        states.get(caller).map(|s| (s.read_count, s.write_count))
    }

    /// Drops callers whose window is long gone
    pub fn cleanup_stale_entries(&self) {
        let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
        let threshold = WINDOW * 5;
        states.retain(|_, state| state.window_start.elapsed() < threshold);
    }
}

impl Default for McpRateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
