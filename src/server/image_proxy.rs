//! Authenticated proxy for files uploaded to platform storage.
//!
//! Fetched files are kept in a small LRU cache keyed by the fetching user
//! and the URL, so one user's protected images are never served to another.

use anyhow::Result;
use axum::body::{Body, Bytes};
use futures::{future, stream, StreamExt};
use lru::LruCache;
use reqwest::Url;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

use super::metrics::{record_image_cache_event, record_upstream_request};
use crate::auth::SageCredentials;
use crate::config::ImageProxySettings;
use crate::upstream::build_http_client;

const SERVICE: &str = "storage";
const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("host not allowed: {0}")]
    HostNotAllowed(String),
    #[error("storage denied access (HTTP {0})")]
    Denied(u16),
    #[error("storage request failed: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone)]
pub struct ProxiedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

/// What goes back to the client: small files are held in memory (and
/// cached), anything over the cache limit is streamed through untouched.
pub enum ProxiedBody {
    Buffered(Bytes),
    Streamed(Body),
}

pub struct ProxiedFile {
    pub content_type: String,
    pub body: ProxiedBody,
}

impl ProxiedFile {
    pub fn into_body(self) -> Body {
        match self.body {
            ProxiedBody::Buffered(bytes) => Body::from(bytes),
            ProxiedBody::Streamed(body) => body,
        }
    }
}

impl From<ProxiedImage> for ProxiedFile {
    fn from(image: ProxiedImage) -> Self {
        Self {
            content_type: image.content_type,
            body: ProxiedBody::Buffered(image.bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheStatus::Hit => "hit",
            CacheStatus::Miss => "miss",
            CacheStatus::Bypass => "bypass",
        }
    }
}

struct CachedImage {
    image: ProxiedImage,
    fetched_at: Instant,
}

type CacheKey = (String, String);

pub struct ImageProxy {
    client: reqwest::Client,
    settings: ImageProxySettings,
    cache: Mutex<LruCache<CacheKey, CachedImage>>,
}

impl ImageProxy {
    pub fn new(settings: ImageProxySettings, timeout_sec: u64) -> Result<Self> {
        let capacity = NonZeroUsize::new(settings.cache_entries).unwrap_or(NonZeroUsize::MIN);
        Ok(Self {
            client: build_http_client(timeout_sec)?,
            settings,
            cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.settings.cache_ttl_sec)
    }

    /// Only http(s) URLs on the configured storage hosts are fetched.
    pub fn validate_url(&self, raw: &str) -> Result<Url, ProxyError> {
        let url = Url::parse(raw.trim()).map_err(|e| ProxyError::InvalidUrl(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }
        let host = url
            .host_str()
            .ok_or_else(|| ProxyError::InvalidUrl("missing host".to_string()))?
            .to_ascii_lowercase();
        if !self
            .settings
            .storage_hosts
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(&host))
        {
            return Err(ProxyError::HostNotAllowed(host));
        }
        Ok(url)
    }

    /// Caller credentials with a username, then the storage credentials,
    /// then an anonymous fetch.
    fn effective_credentials<'a>(
        &'a self,
        caller: Option<&'a SageCredentials>,
    ) -> Option<&'a SageCredentials> {
        caller
            .filter(|c| c.has_username())
            .or(self.settings.storage_credentials.as_ref())
    }

    fn cached(&self, key: &CacheKey) -> Option<ProxiedImage> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let fresh = cache.get(key).map(|e| e.fetched_at.elapsed() < self.ttl())?;
        if fresh {
            cache.get(key).map(|e| e.image.clone())
        } else {
            cache.pop(key);
            None
        }
    }

    fn store(&self, key: CacheKey, image: &ProxiedImage) {
        if image.bytes.len() > self.settings.cache_max_bytes {
            debug!(
                "Not caching {} ({} bytes over the {} byte limit)",
                key.1,
                image.bytes.len(),
                self.settings.cache_max_bytes
            );
            return;
        }
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(
            key,
            CachedImage {
                image: image.clone(),
                fetched_at: Instant::now(),
            },
        );
    }

    pub async fn fetch(
        &self,
        caller: Option<&SageCredentials>,
        raw_url: &str,
    ) -> Result<(ProxiedFile, CacheStatus), ProxyError> {
        let url = self.validate_url(raw_url)?;
        let credentials = self.effective_credentials(caller);
        let key = (
            credentials
                .map(SageCredentials::identity)
                .unwrap_or_else(|| "anonymous".to_string()),
            url.to_string(),
        );

        if let Some(image) = self.cached(&key) {
            record_image_cache_event(CacheStatus::Hit.as_str());
            return Ok((image.into(), CacheStatus::Hit));
        }

        let mut request = self.client.get(url);
        if let Some((user, token)) = credentials.and_then(SageCredentials::basic_auth) {
            request = request.basic_auth(user, Some(token));
        }

        let start = Instant::now();
        let mut response = request.send().await.map_err(|e| {
            record_upstream_request(SERVICE, "error", start.elapsed());
            warn!("Storage request failed: {}", e);
            ProxyError::Upstream(e.to_string())
        })?;
        let status = response.status();
        record_upstream_request(SERVICE, status.as_str(), start.elapsed());

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(ProxyError::Denied(status.as_u16()));
        }
        if !status.is_success() {
            return Err(ProxyError::Upstream(format!("HTTP {}", status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        let limit = self.settings.cache_max_bytes;
        if response
            .content_length()
            .is_some_and(|len| len > limit as u64)
        {
            debug!("Streaming {} without caching (over {} bytes)", key.1, limit);
            return Ok((
                Self::streamed(content_type, Bytes::new(), response),
                self.bypass(),
            ));
        }

        // Length unknown or small: buffer up to the cache limit, then give up
        // and stream the rest.
        let mut buffered: Vec<u8> = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProxyError::Upstream(e.to_string()))?
        {
            buffered.extend_from_slice(&chunk);
            if buffered.len() > limit {
                debug!("Streaming {} without caching (over {} bytes)", key.1, limit);
                return Ok((
                    Self::streamed(content_type, Bytes::from(buffered), response),
                    self.bypass(),
                ));
            }
        }

        record_image_cache_event(CacheStatus::Miss.as_str());
        let image = ProxiedImage {
            bytes: Bytes::from(buffered),
            content_type,
        };
        self.store(key, &image);
        Ok((image.into(), CacheStatus::Miss))
    }

    fn bypass(&self) -> CacheStatus {
        record_image_cache_event(CacheStatus::Bypass.as_str());
        CacheStatus::Bypass
    }

    /// `head` was already read off `response`; it goes out first.
    fn streamed(content_type: String, head: Bytes, response: reqwest::Response) -> ProxiedFile {
        let rest = response.bytes_stream();
        let body = if head.is_empty() {
            Body::from_stream(rest)
        } else {
            Body::from_stream(stream::once(future::ready(Ok::<_, reqwest::Error>(head))).chain(rest))
        };
        ProxiedFile {
            content_type,
            body: ProxiedBody::Streamed(body),
        }
    }
}
