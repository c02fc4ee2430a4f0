//! Node and sensor manifests from the node registry.

pub mod client;
pub mod format;
pub mod location;
pub mod models;

pub use client::{HttpManifestClient, ManifestSource};
pub use location::{nodes_in_location, StatKind, ValueFilter};
pub use models::{Hardware, NodeDetail, NodeManifest, SensorHardware};
