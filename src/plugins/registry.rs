//! In-memory plugin registry backed by the ECR listing and its file cache.

use chrono::{DateTime, Utc};
use std::cmp::Reverse;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use super::cache::PluginCache;
use super::client::PluginSource;
use super::models::PluginMetadata;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum PluginError {
    #[error("plugin registry unavailable and no cached copy exists: {0}")]
    Unavailable(#[source] UpstreamError),
}

/// Query words paired with the plugin words that make a category match.
const TASK_CATEGORIES: &[(&str, &[&str])] = &[
    ("camera", &["camera", "image", "video", "ptz", "pan", "tilt", "zoom"]),
    ("audio", &["audio", "sound", "microphone", "bird", "noise"]),
    ("detection", &["detect", "yolo", "object", "recognition", "ai", "ml"]),
    ("environmental", &["temperature", "humidity", "pressure", "weather"]),
    ("movement", &["motion", "tracking", "movement"]),
];

/// Relevance of a plugin to a task description; 0 means unrelated.
pub fn score(plugin: &PluginMetadata, query: &str) -> u32 {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return 0;
    }
    let name = plugin.name.to_lowercase();
    let text = plugin.search_text();
    let mut score = 0;

    if query == name {
        score += 100;
    }
    if name.contains(&query) {
        score += 50;
    }
    if plugin.description.to_lowercase().contains(&query) {
        score += 30;
    }
    if !plugin.keywords.is_empty() && plugin.keywords.to_lowercase().contains(&query) {
        score += 40;
    }
    if !plugin.science_description_content.is_empty()
        && plugin
            .science_description_content
            .to_lowercase()
            .contains(&query)
    {
        score += 25;
    }
    score += 10 * query.split_whitespace().filter(|w| text.contains(w)).count() as u32;
    for (_, keywords) in TASK_CATEGORIES {
        if keywords.iter().any(|k| query.contains(k)) && keywords.iter().any(|k| text.contains(k)) {
            score += 20;
        }
    }
    score
}

struct Loaded {
    plugins: Arc<Vec<PluginMetadata>>,
    fetched_at: DateTime<Utc>,
}

pub struct PluginRegistry {
    source: Arc<dyn PluginSource>,
    cache: PluginCache,
    loaded: RwLock<Option<Loaded>>,
}

impl PluginRegistry {
    pub fn new(source: Arc<dyn PluginSource>, cache: PluginCache) -> Self {
        Self {
            source,
            cache,
            loaded: RwLock::new(None),
        }
    }

    /// Current plugin list, reloading once it is older than the cache TTL.
    pub async fn plugins(&self) -> Result<Arc<Vec<PluginMetadata>>, PluginError> {
        let now = Utc::now();
        {
            let loaded = self.loaded.read().await;
            if let Some(loaded) = loaded.as_ref() {
                if self.is_fresh(loaded.fetched_at, now) {
                    return Ok(loaded.plugins.clone());
                }
            }
        }

        let mut loaded = self.loaded.write().await;
        // Another request may have reloaded while we waited for the lock.
        if let Some(current) = loaded.as_ref() {
            if self.is_fresh(current.fetched_at, now) {
                return Ok(current.plugins.clone());
            }
        }
        let (plugins, fetched_at) = self.load(now).await?;
        let plugins = Arc::new(plugins);
        *loaded = Some(Loaded {
            plugins: plugins.clone(),
            fetched_at,
        });
        Ok(plugins)
    }

    fn is_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        super::cache::CachedPlugins {
            timestamp: fetched_at,
            data: Vec::new(),
        }
        .is_fresh(self.cache.ttl_hours(), now)
    }

    async fn load(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Vec<PluginMetadata>, DateTime<Utc>), PluginError> {
        let cached = self.cache.load();
        if let Some(cached) = cached.as_ref() {
            if cached.is_fresh(self.cache.ttl_hours(), now) {
                info!(
                    "Loaded {} plugins from cache {:?}",
                    cached.data.len(),
                    self.cache.path()
                );
                return Ok((cached.data.clone(), cached.timestamp));
            }
        }

        match self.source.fetch_plugins().await {
            Ok(plugins) => {
                if let Err(e) = self.cache.save(&plugins, now) {
                    warn!("Could not write plugin cache: {:#}", e);
                }
                Ok((plugins, now))
            }
            Err(e) => match cached {
                Some(stale) => {
                    warn!(
                        "Plugin fetch failed ({}), using stale cache from {}",
                        e, stale.timestamp
                    );
                    // Serve the stale copy as if just fetched so the next
                    // attempt waits a full TTL.
                    Ok((stale.data, now))
                }
                None => Err(PluginError::Unavailable(e)),
            },
        }
    }

    /// Plugins relevant to a task, best first; ties are ordered by name.
    pub async fn search(
        &self,
        task: &str,
        max_results: usize,
    ) -> Result<Vec<PluginMetadata>, PluginError> {
        let plugins = self.plugins().await?;
        Ok(rank(&plugins, task, max_results))
    }

    /// Looks a plugin up by id, then by name.
    pub async fn get(&self, id_or_name: &str) -> Result<Option<PluginMetadata>, PluginError> {
        let plugins = self.plugins().await?;
        let wanted = id_or_name.trim();
        Ok(plugins
            .iter()
            .find(|p| p.id == wanted)
            .or_else(|| plugins.iter().find(|p| p.name.eq_ignore_ascii_case(wanted)))
            .cloned())
    }

    /// Plugins whose keywords mention `category`.
    pub async fn by_keyword(&self, category: &str) -> Result<Vec<PluginMetadata>, PluginError> {
        let plugins = self.plugins().await?;
        let category = category.to_lowercase();
        Ok(plugins
            .iter()
            .filter(|p| p.keywords.to_lowercase().contains(&category))
            .cloned()
            .collect())
    }
}

pub fn rank(plugins: &[PluginMetadata], task: &str, max_results: usize) -> Vec<PluginMetadata> {
    let mut scored: Vec<(u32, &PluginMetadata)> = plugins
        .iter()
        .map(|p| (score(p, task), p))
        .filter(|(s, _)| *s > 0)
        .collect();
    scored.sort_by(|(sa, pa), (sb, pb)| {
        (Reverse(*sa), &pa.name).cmp(&(Reverse(*sb), &pb.name))
    });
    scored
        .into_iter()
        .take(max_results)
        .map(|(_, p)| p.clone())
        .collect()
}
