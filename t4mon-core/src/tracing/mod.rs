//! Structured logging setup
//!
//! Every collection stage logs through `tracing`. Per-system events carry a
//! `system` field and tunnel events add `port`, so one run's output can be
//! grepped per host even when workers interleave.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static TRACING_INITIALIZED: AtomicBool = AtomicBool::new(false);

static TRACING_CONFIG: OnceLock<TracingConfig> = OnceLock::new();

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to initialize tracing subscriber
    #[error("Failed to initialize tracing: {0}")]
    InitializationFailed(String),

    /// Tracing already initialized
    #[error("Tracing has already been initialized")]
    AlreadyInitialized,

    /// Failed to create log file
    #[error("Failed to create log file {path}: {reason}")]
    FileCreationFailed {
        /// Requested log file
        path: PathBuf,
        /// Underlying I/O failure
        reason: String,
    },
}

/// Result type for tracing operations
pub type TracingResult<T> = Result<T, TracingError>;

/// Log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum TracingLevel {
    /// Only errors
    Error,
    /// Errors and warnings
    Warn,
    /// Errors, warnings and progress messages (default)
    #[default]
    Info,
    /// Adds per-file and per-row diagnostics
    Debug,
    /// Everything, including ssh argument vectors
    Trace,
}

impl TracingLevel {
    /// Converts to tracing crate's Level
    #[must_use]
    pub const fn to_tracing_level(self) -> Level {
        match self {
            Self::Error => Level::ERROR,
            Self::Warn => Level::WARN,
            Self::Info => Level::INFO,
            Self::Debug => Level::DEBUG,
            Self::Trace => Level::TRACE,
        }
    }

    /// Shifts the level by a `-v`/`-q` delta, saturating at both ends
    #[must_use]
    pub const fn adjusted(self, delta: i8) -> Self {
        match (self as i8).saturating_add(delta) {
            i8::MIN..=0 => Self::Error,
            1 => Self::Warn,
            2 => Self::Info,
            3 => Self::Debug,
            _ => Self::Trace,
        }
    }
}

impl std::str::FromStr for TracingLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            other => Err(format!("unknown log level '{other}'")),
        }
    }
}

impl std::fmt::Display for TracingLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        };
        f.write_str(name)
    }
}

/// Output destination for log lines
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TracingOutput {
    /// Output to stdout
    Stdout,
    /// Output to stderr
    #[default]
    Stderr,
    /// Log file, truncated when tracing starts
    File(PathBuf),
}

/// Configuration for tracing initialization
#[derive(Debug, Clone, Default)]
pub struct TracingConfig {
    /// Log level
    pub level: TracingLevel,
    /// Output destination
    pub output: TracingOutput,
    /// Include worker thread names in every line
    pub thread_names: bool,
    /// Custom filter string (overrides level if set)
    pub filter: Option<String>,
}

impl TracingConfig {
    /// Creates a new tracing configuration with default values
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the log level
    #[must_use]
    pub const fn with_level(mut self, level: TracingLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the output destination
    #[must_use]
    pub fn with_output(mut self, output: TracingOutput) -> Self {
        self.output = output;
        self
    }

    /// Shows the emitting thread name on each line
    #[must_use]
    pub const fn with_thread_names(mut self, enabled: bool) -> Self {
        self.thread_names = enabled;
        self
    }

    /// Sets a custom filter string
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Filter directive derived from the level
    ///
    /// Only the t4mon crates log at the requested level; dependencies stay
    /// at `warn` so tokio internals do not flood debug output.
    #[must_use]
    pub fn filter_directive(&self) -> String {
        self.filter.clone().unwrap_or_else(|| {
            format!("warn,t4mon_core={0},t4mon={0}", self.level)
        })
    }
}

/// Initializes the global subscriber
///
/// # Errors
///
/// Returns an error if:
/// - Tracing has already been initialized
/// - The filter directive cannot be parsed
/// - File output is configured but the file cannot be created
pub fn init_tracing(config: &TracingConfig) -> TracingResult<()> {
    if TRACING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return Err(TracingError::AlreadyInitialized);
    }
    let _ = TRACING_CONFIG.set(config.clone());

    let filter = EnvFilter::try_new(config.filter_directive())
        .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;

    let (writer, ansi) = match &config.output {
        TracingOutput::Stdout => (BoxMakeWriter::new(std::io::stdout), true),
        TracingOutput::Stderr => (BoxMakeWriter::new(std::io::stderr), true),
        TracingOutput::File(path) => {
            let file =
                std::fs::File::create(path).map_err(|e| TracingError::FileCreationFailed {
                    path: path.clone(),
                    reason: e.to_string(),
                })?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_level(true)
                .with_thread_names(config.thread_names)
                .with_ansi(ansi)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| TracingError::InitializationFailed(e.to_string()))?;

    tracing::debug!(level = %config.level, "Tracing initialized");
    Ok(())
}

/// Checks if tracing has been initialized
#[must_use]
pub fn is_tracing_initialized() -> bool {
    TRACING_INITIALIZED.load(Ordering::SeqCst)
}

/// Gets the active tracing configuration (if initialized)
#[must_use]
pub fn get_tracing_config() -> Option<&'static TracingConfig> {
    TRACING_CONFIG.get()
}

/// Standard span names for collection operations
pub mod span_names {
    /// Settings file load
    pub const CONFIG_LOAD: &str = "config.load";
    /// Gateway master plus all tunnels coming up
    pub const POOL_START: &str = "pool.start";
    /// Tunnel and gateway teardown
    pub const POOL_STOP: &str = "pool.stop";
    /// One full orchestrated run
    pub const RUN: &str = "run";
    /// Collection for one system
    pub const COLLECT_SYSTEM: &str = "collect.system";
    /// Parsing of one exporter file
    pub const INGEST_FILE: &str = "ingest.file";
    /// Merge of all per-system results
    pub const CONSOLIDATE: &str = "consolidate";
    /// Checkpoint write
    pub const CHECKPOINT_WRITE: &str = "checkpoint.write";
    /// Checkpoint reload
    pub const CHECKPOINT_LOAD: &str = "checkpoint.load";
    /// Report rendering
    pub const REPORT_RENDER: &str = "report.render";
}
