//! On-disk copy of the plugin listing.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::models::PluginMetadata;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedPlugins {
    pub timestamp: DateTime<Utc>,
    pub data: Vec<PluginMetadata>,
}

impl CachedPlugins {
    pub fn is_fresh(&self, ttl_hours: u64, now: DateTime<Utc>) -> bool {
        // A century is as good as forever.
        let ttl = Duration::hours(ttl_hours.min(24 * 365 * 100) as i64);
        now.signed_duration_since(self.timestamp) < ttl
    }
}

pub struct PluginCache {
    path: PathBuf,
    ttl_hours: u64,
}

impl PluginCache {
    pub fn new(path: PathBuf, ttl_hours: u64) -> Self {
        Self { path, ttl_hours }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ttl_hours(&self) -> u64 {
        self.ttl_hours
    }

    /// Reads the cache file. A missing or unreadable file is no cache.
    pub fn load(&self) -> Option<CachedPlugins> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No plugin cache at {:?}: {}", self.path, e);
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(cached) => Some(cached),
            Err(e) => {
                warn!("Ignoring corrupt plugin cache {:?}: {}", self.path, e);
                None
            }
        }
    }

    /// Writes the listing through a temporary file in the same directory so
    /// readers never see a partial file.
    pub fn save(&self, plugins: &[PluginMetadata], now: DateTime<Utc>) -> Result<()> {
        let dir = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create cache directory {:?}", dir))?;

        let cached = CachedPlugins {
            timestamp: now,
            data: plugins.to_vec(),
        };
        let json = serde_json::to_vec(&cached).context("Failed to serialize plugin cache")?;

        let mut file = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("Failed to create temporary file in {:?}", dir))?;
        file.write_all(&json)
            .context("Failed to write plugin cache")?;
        file.persist(&self.path)
            .with_context(|| format!("Failed to replace plugin cache {:?}", self.path))?;
        debug!("Saved {} plugins to {:?}", plugins.len(), self.path);
        Ok(())
    }
}
