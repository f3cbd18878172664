//! `t4mon` Core Library
//!
//! Collects T4-format performance exports from a fleet of remote systems
//! reachable only through one ssh gateway, and merges them into a single
//! time-indexed dataset with per-system logs.
//!
//! # Crate Structure
//!
//! - [`config`] - Settings file loading and validation
//! - [`models`] - Monitored systems, gateway, per-system results
//! - [`ssh`] / [`tunnel`] - Gateway control master and the tunnel pool
//! - [`session`] - sftp sessions over a tunnel
//! - [`ingest`] - Exporter CSV and zip archive parsing
//! - [`dataset`] - Column-oriented time-indexed tables
//! - [`collector`] / [`orchestrator`] - Per-system collection and the run
//! - [`calculations`] - Derived metrics
//! - [`checkpoint`] / [`report`] - Persistence and report hand-off

// Enable missing_docs warning for public API documentation
#![warn(missing_docs)]

pub mod calculations;
pub mod checkpoint;
pub mod collector;
pub mod config;
pub mod dataset;
pub mod error;
pub mod ingest;
pub mod models;
pub mod orchestrator;
pub mod report;
pub mod session;
pub mod ssh;
pub mod tracing;
pub mod tunnel;

// =============================================================================
// Convenience re-exports
//
// Flat names used by the CLI and the integration tests.
// =============================================================================

pub use calculations::{CalculationError, Calculations};
pub use checkpoint::{
    CheckpointError, CheckpointFiles, Snapshot, fill_local_logs, load_csv, read_snapshot,
    run_tag, write_checkpoint,
};
pub use collector::{CollectOptions, Collector};
pub use config::{ConfigError, Settings};
pub use dataset::{Column, ColumnValues, Dataset, DatasetError, Metadata};
pub use error::{T4monError, T4monResult};
pub use ingest::{IngestError, T4CsvParser};
pub use models::{CollectionResult, GatewayEndpoint, MonitoredSystem};
pub use orchestrator::{
    ConsolidatedDataset, ExecutionStrategy, Orchestrator, RunOptions, RunOutcome, consolidate,
};
pub use report::{ReportContext, ReportRenderer, SummaryRenderer, render_all};
pub use session::{RemoteSession, SessionConnector, SftpConnector};
pub use tracing::{TracingConfig, TracingLevel, init_tracing, span_names};
pub use tunnel::{SshTunnelPool, TunnelPool, TunnelStatus};
