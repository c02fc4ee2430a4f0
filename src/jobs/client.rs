//! Client for the edge scheduler's job API.

use anyhow::Result;
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info};

use super::models::JobSpec;
use super::JobError;
use crate::auth::SageCredentials;
use crate::upstream::{build_http_client, send_text, UpstreamError};

const SERVICE: &str = "scheduler";
const INVALID_TOKEN_MARKER: &str = "must provide a valid token";

lazy_static! {
    static ref JOB_ID_RE: Regex = Regex::new(r#""?job_id"?\s*:\s*"?(\d+)"?"#).unwrap();
    static ref JOB_ID_FORMAT_RE: Regex = Regex::new(r"^[A-Za-z0-9_-]{1,64}$").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveMode {
    Force,
    Suspend,
}

impl RemoveMode {
    fn query(&self) -> (&'static str, &'static str) {
        match self {
            RemoveMode::Force => ("force", "true"),
            RemoveMode::Suspend => ("suspend", "true"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOutcome {
    pub job_id: Option<String>,
    pub raw: String,
}

#[async_trait]
pub trait JobScheduler: Send + Sync {
    async fn submit(
        &self,
        credentials: &SageCredentials,
        job: &JobSpec,
        dry_run: bool,
    ) -> Result<SubmitOutcome, JobError>;

    /// Raw status document for a job.
    async fn status(&self, credentials: &SageCredentials, job_id: &str)
        -> Result<String, JobError>;

    async fn remove(
        &self,
        credentials: &SageCredentials,
        job_id: &str,
        mode: RemoveMode,
    ) -> Result<String, JobError>;
}

/// Checks a job id before it is put in a URL path.
pub fn validate_job_id(raw: &str) -> Result<&str, JobError> {
    let id = raw.trim();
    if JOB_ID_FORMAT_RE.is_match(id) {
        Ok(id)
    } else {
        Err(JobError::InvalidJobId(id.to_string()))
    }
}

/// Job id from a submission reply, read as JSON first and then scanned for.
pub fn extract_job_id(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        match value.get("job_id") {
            Some(Value::String(id)) if !id.is_empty() => return Some(id.clone()),
            Some(Value::Number(id)) => return Some(id.to_string()),
            _ => {}
        }
    }
    JOB_ID_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn map_error(error: UpstreamError) -> JobError {
    match &error {
        UpstreamError::Status { body, .. } if body.contains(INVALID_TOKEN_MARKER) => {
            JobError::Unauthenticated(body.clone())
        }
        _ if error.is_auth_failure() => JobError::Unauthenticated(error.to_string()),
        _ => JobError::Upstream(error),
    }
}

pub struct HttpJobClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpJobClient {
    pub fn new(base_url: String, timeout_sec: u64) -> Result<Self> {
        Ok(Self {
            client: build_http_client(timeout_sec)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn authorized(
        &self,
        request: reqwest::RequestBuilder,
        credentials: &SageCredentials,
    ) -> reqwest::RequestBuilder {
        request.header(
            reqwest::header::AUTHORIZATION,
            format!("Sage {}", credentials.token()),
        )
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        credentials: &SageCredentials,
    ) -> Result<String, JobError> {
        let body = send_text(SERVICE, self.authorized(request, credentials))
            .await
            .map_err(map_error)?;
        if body.contains(INVALID_TOKEN_MARKER) {
            return Err(JobError::Unauthenticated(body.trim().to_string()));
        }
        Ok(body)
    }
}

#[async_trait]
impl JobScheduler for HttpJobClient {
    async fn submit(
        &self,
        credentials: &SageCredentials,
        job: &JobSpec,
        dry_run: bool,
    ) -> Result<SubmitOutcome, JobError> {
        let yaml = job.to_yaml()?;
        debug!("Submitting job '{}' (dry run: {}):\n{}", job.name, dry_run, yaml);

        let mut request = self
            .client
            .post(format!("{}/api/v1/submit", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/yaml")
            .body(yaml);
        if dry_run {
            request = request.query(&[("dryrun", "true")]);
        }

        let raw = self.send(request, credentials).await?;
        let job_id = extract_job_id(&raw);
        info!(
            "Job '{}' accepted by scheduler (id: {:?}, dry run: {})",
            job.name, job_id, dry_run
        );
        Ok(SubmitOutcome {
            job_id,
            raw: raw.trim().to_string(),
        })
    }

    async fn status(
        &self,
        credentials: &SageCredentials,
        job_id: &str,
    ) -> Result<String, JobError> {
        let job_id = validate_job_id(job_id)?;
        let request = self
            .client
            .get(format!("{}/api/v1/jobs/{}/status", self.base_url, job_id));
        self.send(request, credentials).await
    }

    async fn remove(
        &self,
        credentials: &SageCredentials,
        job_id: &str,
        mode: RemoveMode,
    ) -> Result<String, JobError> {
        let job_id = validate_job_id(job_id)?;
        let request = self
            .client
            .get(format!("{}/api/v1/jobs/{}/rm", self.base_url, job_id))
            .query(&[mode.query()]);
        let output = self.send(request, credentials).await?;
        info!("Job {} removed from scheduler ({:?})", job_id, mode);
        Ok(output.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_job_id_json() {
        assert_eq!(
            extract_job_id(r#"{"job_id": "42", "state": "Submitted"}"#),
            Some("42".to_string())
        );
        assert_eq!(extract_job_id(r#"{"job_id": 7}"#), Some("7".to_string()));
    }

    #[test]
    fn test_extract_job_id_text() {
        assert_eq!(
            extract_job_id("submitted: job_id: 1234 ok"),
            Some("1234".to_string())
        );
        assert_eq!(extract_job_id("nothing here"), None);
    }

    #[test]
    fn test_validate_job_id() {
        assert_eq!(validate_job_id(" 42 ").unwrap(), "42");
        assert!(matches!(
            validate_job_id("../etc"),
            Err(JobError::InvalidJobId(_))
        ));
        assert!(validate_job_id("").is_err());
    }

    #[test]
    fn test_map_error_invalid_token() {
        let err = map_error(UpstreamError::Status {
            service: SERVICE,
            status: 400,
            body: "error: must provide a valid token".to_string(),
        });
        assert!(matches!(err, JobError::Unauthenticated(_)));

        let err = map_error(UpstreamError::Status {
            service: SERVICE,
            status: 401,
            body: "denied".to_string(),
        });
        assert!(matches!(err, JobError::Unauthenticated(_)));

        let err = map_error(UpstreamError::Status {
            service: SERVICE,
            status: 500,
            body: "boom".to_string(),
        });
        assert!(matches!(err, JobError::Upstream(_)));
    }

    #[test]
    fn test_remove_mode_query() {
        assert_eq!(RemoveMode::Force.query(), ("force", "true"));
        assert_eq!(RemoveMode::Suspend.query(), ("suspend", "true"));
    }
}
