//! Core data structures shared by every collection stage
//!
//! [`MonitoredSystem`] and [`GatewayEndpoint`] are resolved from the settings
//! file once per run and stay immutable afterwards. [`CollectionResult`] is
//! the per-system unit handed from the collector to consolidation.

mod result;
mod system;

pub use result::{CollectionResult, LOG_OMITTED_PREFIX, MISSING_LOGS, omitted_log};
pub use system::{Credentials, DEFAULT_EXTENSION, DEFAULT_SSH_PORT, GatewayEndpoint, MonitoredSystem};
