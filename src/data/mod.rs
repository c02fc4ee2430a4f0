//! Time-series data access: query windows, filters, the data API client
//! and helpers to summarize and export the returned records.

pub mod client;
pub mod csv;
pub mod filter;
pub mod node;
pub mod record;
pub mod time_range;

pub use client::{DataSource, HttpDataClient};
pub use filter::{wildcard, QueryFilter};
pub use node::{normalize_node_id, parse_node_list, NodeIdError};
pub use record::{Record, RecordValue, Stats};
pub use time_range::{TimeRangeError, TimeWindow};
