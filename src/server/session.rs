use super::state::ServerState;
use crate::auth::{extract_credentials, CredentialSource, CredentialsError, SageCredentials};

use axum::{
    extract::{FromRequestParts, Query},
    http::{header::WWW_AUTHENTICATE, request::Parts, StatusCode},
    response::IntoResponse,
};
use std::collections::HashMap;
use tracing::debug;

/// Whoever is making the request. Anonymous callers carry no credentials
/// and only see public tools.
#[derive(Debug, Clone, Default)]
pub struct Caller {
    pub credentials: Option<SageCredentials>,
    pub source: Option<CredentialSource>,
}

impl Caller {
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }
}

/// Credentials were sent but could not be understood.
pub struct CallerExtractionError(CredentialsError);

impl IntoResponse for CallerExtractionError {
    fn into_response(self) -> axum::response::Response {
        (
            StatusCode::UNAUTHORIZED,
            [(WWW_AUTHENTICATE, "Basic realm=\"sage\"")],
            format!("Invalid credentials: {}", self.0),
        )
            .into_response()
    }
}

fn query_params(parts: &Parts) -> HashMap<String, String> {
    Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
        .map(|Query(q)| q)
        .unwrap_or_default()
}

fn extract_caller(parts: &Parts, ctx: &ServerState) -> Result<Caller, CallerExtractionError> {
    match extract_credentials(&parts.headers, &query_params(parts)) {
        Ok(Some((credentials, source))) => {
            debug!("Caller {} authenticated via {}", credentials.identity(), source);
            Ok(Caller {
                credentials: Some(credentials),
                source: Some(source),
            })
        }
        Ok(None) => match &ctx.config.default_credentials {
            Some(credentials) => Ok(Caller {
                credentials: Some(credentials.clone()),
                source: Some(CredentialSource::ServerDefault),
            }),
            None => Ok(Caller::default()),
        },
        Err(e) => {
            debug!("Rejecting malformed credentials: {}", e);
            Err(CallerExtractionError(e))
        }
    }
}

impl FromRequestParts<ServerState> for Caller {
    type Rejection = CallerExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_caller(parts, ctx)
    }
}
