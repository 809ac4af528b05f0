//! # tsrelay
//!
//! A remote-storage adapter that lets a Prometheus-compatible monitoring
//! system persist and query time series through an embedded SQL engine whose
//! connections are not thread-safe.
//!
//! ## Architecture
//!
//! - **ResourcePool**: two fixed-capacity pools (read, write) of exclusive
//!   engine connections with blocking-with-timeout acquisition
//! - **Schema Registry**: accepted metrics and provisioned tables, with
//!   single-flight table creation so racing writers issue one `CREATE TABLE`
//! - **Write Path**: samples become per-metric INSERTs, lazily provisioning
//!   range-partitioned tables, with per-item failure isolation
//! - **Read Path**: label matchers become SELECTs bounded by window and row
//!   ceilings; rows fold back into ordered per-series sample sequences
//! - **Transport**: snappy + protobuf remote-write/remote-read endpoints
//!   over axum, plus `/metrics` self-observability

pub mod api;
pub mod config;
pub mod engine;
pub mod pool;
pub mod prompb;
pub mod read;
pub mod schema;
pub mod singleflight;
pub mod write;

mod error;

pub use error::{Error, Result};

/// Re-exports for convenience
pub mod prelude {
    pub use crate::api::metrics::Metrics;
    pub use crate::api::{build_router, AppState};
    pub use crate::config::Config;
    pub use crate::engine::{MemoryEngine, StorageEngine};
    pub use crate::pool::{OperationClass, ResourcePool};
    pub use crate::read::{ReadLimits, Reader};
    pub use crate::schema::SchemaRegistry;
    pub use crate::write::{Sample, Writer};
    pub use crate::{Error, Result};
}
