use axum::http::{header::AUTHORIZATION, HeaderMap};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use thiserror::Error;

pub const HEADER_SAGE_TOKEN: &str = "x-sage-token";
pub const HEADER_SAGE_USERNAME: &str = "x-sage-username";
pub const QUERY_TOKEN_KEY: &str = "token";
pub const QUERY_USERNAME_KEY: &str = "username";

/// A caller's platform credentials: `username:access_token`.
///
/// A bare access token (no username) is accepted: the job scheduler only
/// needs the token, while data and storage requests need both halves for
/// basic auth.
#[derive(Clone, PartialEq, Eq)]
pub struct SageCredentials {
    username: String,
    token: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("credentials are empty")]
    Empty,
    #[error("username is empty")]
    MissingUsername,
    #[error("access token is empty")]
    MissingToken,
    #[error("Basic credentials are not valid base64")]
    InvalidBase64,
    #[error("credentials are not valid UTF-8")]
    InvalidEncoding,
    #[error("unsupported Authorization scheme: {0}")]
    UnsupportedScheme(String),
}

/// Where the credentials of a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    BasicAuth,
    BearerToken,
    SageHeader,
    QueryParameter,
    ServerDefault,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CredentialSource::BasicAuth => "basic-auth",
            CredentialSource::BearerToken => "bearer",
            CredentialSource::SageHeader => "x-sage-token",
            CredentialSource::QueryParameter => "query",
            CredentialSource::ServerDefault => "server-default",
        };
        write!(f, "{}", s)
    }
}

impl SageCredentials {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Result<Self, CredentialsError> {
        let username = username.into().trim().to_string();
        let token = token.into().trim().to_string();
        if token.is_empty() {
            return Err(CredentialsError::MissingToken);
        }
        Ok(Self { username, token })
    }

    /// Parses `user:token` (split on the first `:`) or a bare token.
    pub fn parse(raw: &str) -> Result<Self, CredentialsError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CredentialsError::Empty);
        }
        match raw.split_once(':') {
            Some((username, token)) => {
                if username.trim().is_empty() {
                    return Err(CredentialsError::MissingUsername);
                }
                Self::new(username, token)
            }
            None => Self::new("", raw),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn has_username(&self) -> bool {
        !self.username.is_empty()
    }

    /// `(username, token)` for HTTP basic auth, when a username is known.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        self.has_username()
            .then_some((self.username.as_str(), self.token.as_str()))
    }

    /// Stable key used for rate limiting and logs. Never contains the token.
    pub fn identity(&self) -> String {
        if self.has_username() {
            self.username.clone()
        } else {
            let mut hasher = DefaultHasher::new();
            self.token.hash(&mut hasher);
            format!("token-{:08x}", hasher.finish() as u32)
        }
    }
}

impl fmt::Debug for SageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SageCredentials({})", self)
    }
}

impl fmt::Display for SageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_username() {
            write!(f, "{}:****", self.username)
        } else {
            write!(f, "****")
        }
    }
}

fn parse_authorization(value: &str) -> Result<(SageCredentials, CredentialSource), CredentialsError> {
    let value = value.trim();
    let (scheme, rest) = value.split_once(' ').unwrap_or((value, ""));
    let rest = rest.trim();
    match scheme.to_ascii_lowercase().as_str() {
        "basic" => {
            let decoded = STANDARD
                .decode(rest)
                .map_err(|_| CredentialsError::InvalidBase64)?;
            let decoded = String::from_utf8(decoded).map_err(|_| CredentialsError::InvalidEncoding)?;
            let (username, token) = decoded
                .split_once(':')
                .ok_or(CredentialsError::MissingToken)?;
            if username.trim().is_empty() {
                return Err(CredentialsError::MissingUsername);
            }
            Ok((
                SageCredentials::new(username, token)?,
                CredentialSource::BasicAuth,
            ))
        }
        "bearer" | "sage" => Ok((SageCredentials::parse(rest)?, CredentialSource::BearerToken)),
        other => Err(CredentialsError::UnsupportedScheme(other.to_string())),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<Option<&'a str>, CredentialsError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(Some)
            .map_err(|_| CredentialsError::InvalidEncoding),
    }
}

fn with_optional_username(
    raw: &str,
    username: Option<&str>,
) -> Result<SageCredentials, CredentialsError> {
    match username.map(str::trim).filter(|u| !u.is_empty()) {
        Some(username) if !raw.contains(':') => SageCredentials::new(username, raw),
        _ => SageCredentials::parse(raw),
    }
}

/// Extracts request credentials in order: `Authorization` header (Basic,
/// Bearer or Sage scheme), `X-Sage-Token` (+ `X-Sage-Username`), then the
/// `token` (+ `username`) query parameters.
///
/// Returns `Ok(None)` when the request carries no credentials at all and an
/// error when it carries malformed ones.
pub fn extract_credentials(
    headers: &HeaderMap,
    query: &HashMap<String, String>,
) -> Result<Option<(SageCredentials, CredentialSource)>, CredentialsError> {
    if let Some(value) = header_str(headers, AUTHORIZATION.as_str())? {
        return parse_authorization(value).map(Some);
    }

    if let Some(raw) = header_str(headers, HEADER_SAGE_TOKEN)? {
        let username = header_str(headers, HEADER_SAGE_USERNAME)?;
        return with_optional_username(raw, username)
            .map(|creds| Some((creds, CredentialSource::SageHeader)));
    }

    if let Some(raw) = query.get(QUERY_TOKEN_KEY) {
        let username = query.get(QUERY_USERNAME_KEY).map(String::as_str);
        return with_optional_username(raw, username)
            .map(|creds| Some((creds, CredentialSource::QueryParameter)));
    }

    Ok(None)
}
