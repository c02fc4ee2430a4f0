mod http_layers;
pub mod image_proxy;
pub mod metrics;
pub mod server;
pub mod session;
pub mod state;

pub use http_layers::*;
pub use image_proxy::ImageProxy;
pub use server::run_server;
