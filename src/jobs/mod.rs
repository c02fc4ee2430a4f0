//! Job definitions, ready-made templates and the edge scheduler client.

pub mod client;
pub mod models;
pub mod templates;

pub use client::{validate_job_id, HttpJobClient, JobScheduler, RemoveMode, SubmitOutcome};
pub use models::{JobSpec, PluginArguments, PluginSpec, SelectorRequirements};
pub use templates::TemplateKind;

use thiserror::Error;

use crate::data::NodeIdError;
use crate::upstream::UpstreamError;

#[derive(Debug, Error)]
pub enum JobError {
    #[error(transparent)]
    Nodes(#[from] NodeIdError),
    #[error("Invalid plugin arguments: {0}")]
    InvalidArguments(String),
    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
    #[error("Invalid job configuration: {0}")]
    InvalidTemplate(String),
    #[error("Could not render job YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{0}")]
    Unauthenticated(String),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Invalid job id '{0}'")]
    InvalidJobId(String),
}
