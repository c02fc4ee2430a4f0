//! Plugin metadata from the edge code repository: fetching, caching,
//! search and natural-language query parsing. Also scaffolds new plugins.

pub mod cache;
pub mod client;
pub mod generator;
pub mod models;
pub mod nl_query;
pub mod registry;

pub use cache::PluginCache;
pub use client::{HttpPluginClient, PluginSource};
pub use generator::{PluginGenerator, PluginRequirements, PluginTemplate};
pub use models::PluginMetadata;
pub use registry::{PluginError, PluginRegistry};
