//! Trend Band Service
//!
//! Boundary around the `trend-bands` core: reads game and season rows,
//! runs snapshots and historical rebuilds, and upserts the resulting
//! records in batches.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod pipeline;
pub mod postgres;
pub mod store;

pub use config::{load_config, DatabaseConfig, LoggingConfig, PipelineConfig, ServiceConfig};
pub use error::{PipelineError, Result, StoreError, StoreResult};
pub use logging::initialize_logging;
pub use memory::MemoryStore;
pub use pipeline::{BandPipeline, BatchSummary, RebuildSummary, SnapshotSummary};
pub use postgres::PgBandStore;
pub use store::{BandSink, GameHistoryStore};
