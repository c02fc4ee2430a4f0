//! Shared plumbing for the HTTP clients that talk to platform services.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};
use thiserror::Error;

use crate::server::metrics::record_upstream_request;

/// Longest upstream body excerpt kept in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{service} request timed out")]
    Timeout { service: &'static str },
    #[error("could not reach {service}: {source}")]
    Transport {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{service} returned HTTP {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },
    #[error("could not decode {service} response: {message}")]
    Decode {
        service: &'static str,
        message: String,
    },
}

impl UpstreamError {
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// A short remedy shown to the caller below the error.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            UpstreamError::Timeout { .. } => {
                Some("Try a shorter time range or a more specific filter.")
            }
            UpstreamError::Status { status: 401, .. } | UpstreamError::Status { status: 403, .. } => {
                Some("Check that your credentials are valid and have access to this data.")
            }
            UpstreamError::Status { status, .. } if *status >= 500 => {
                Some("The platform service is having trouble; try again in a moment.")
            }
            _ => None,
        }
    }

    fn from_reqwest(service: &'static str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            UpstreamError::Timeout { service }
        } else if source.is_decode() {
            UpstreamError::Decode {
                service,
                message: source.to_string(),
            }
        } else {
            UpstreamError::Transport { service, source }
        }
    }
}

/// Error text for a tool result, with the hint appended when there is one.
pub fn describe(context: &str, error: &UpstreamError) -> String {
    match error.hint() {
        Some(hint) => format!("{}: {}\n\n💡 {}", context, error, hint),
        None => format!("{}: {}", context, error),
    }
}

pub fn build_http_client(timeout_sec: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_sec))
        .user_agent(concat!("sage-mcp-server/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

fn clip(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(MAX_ERROR_BODY_LENGTH) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

/// Sends a request and returns the response body of a successful reply.
/// Non-success replies become [`UpstreamError::Status`] carrying the body.
pub async fn send_text(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<String, UpstreamError> {
    let start = Instant::now();
    let response = match request.send().await {
        Ok(response) => response,
        Err(e) => {
            record_upstream_request(service, "error", start.elapsed());
            return Err(UpstreamError::from_reqwest(service, e));
        }
    };

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| UpstreamError::from_reqwest(service, e));
    record_upstream_request(service, status.as_str(), start.elapsed());
    let body = body?;

    if !status.is_success() {
        return Err(UpstreamError::Status {
            service,
            status: status.as_u16(),
            body: clip(&body),
        });
    }
    Ok(body)
}

/// Like [`send_text`] but decodes the body as JSON.
pub async fn send_json<T: serde::de::DeserializeOwned>(
    service: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<T, UpstreamError> {
    let body = send_text(service, request).await?;
    serde_json::from_str(&body).map_err(|e| UpstreamError::Decode {
        service,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_long_body() {
        let long = "x".repeat(MAX_ERROR_BODY_LENGTH + 10);
        let clipped = clip(&long);
        assert_eq!(clipped.len(), MAX_ERROR_BODY_LENGTH + 3);
        assert!(clipped.ends_with("..."));
        assert_eq!(clip("  short  "), "short");
    }

    #[test]
    fn test_hints() {
        let err = UpstreamError::Status {
            service: "data",
            status: 401,
            body: "nope".to_string(),
        };
        assert!(err.is_auth_failure());
        assert!(describe("Error querying data", &err).contains("credentials"));

        let err = UpstreamError::Timeout { service: "data" };
        assert_eq!(err.to_string(), "data request timed out");
        assert!(err.hint().unwrap().contains("shorter time range"));

        let err = UpstreamError::Decode {
            service: "ecr",
            message: "bad".to_string(),
        };
        assert!(err.hint().is_none());
        assert_eq!(describe("Oops", &err), "Oops: could not decode ecr response: bad");
    }

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(5).is_ok());
    }
}
