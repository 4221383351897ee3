//! Client and types for the open-data `datastore_search` API.

pub mod api_types;
pub mod client;
pub mod error;
pub mod types;

pub use api_types::DatastoreResponse;
pub use client::{clear_disk_cache, DatastoreClient};
pub use error::{ErrorCategory, FetchError};
pub use types::{QuarterUsage, YearUsage, YearlyUsage};
