//! Per-request platform credentials.

mod credentials;

pub use credentials::{
    extract_credentials, CredentialSource, CredentialsError, SageCredentials, HEADER_SAGE_TOKEN,
    HEADER_SAGE_USERNAME,
};
