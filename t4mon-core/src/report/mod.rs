//! Hand-off to report generation
//!
//! A [`ReportRenderer`] turns one system's share of a run into a file in
//! the reports folder. The bundled [`SummaryRenderer`] writes a plain-text
//! summary; graphical renderers plug in through the same trait.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::checkpoint::run_tag;
use crate::orchestrator::ConsolidatedDataset;
use crate::tracing::span_names;

/// Errors raised while rendering a report
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report could not be written
    #[error("Cannot write report {path}: {source}")]
    Io {
        /// Report file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The system is not part of the run
    #[error("No data or logs for system {0}")]
    UnknownSystem(String),
}

/// Result type for report rendering
pub type ReportResult<T> = Result<T, ReportError>;

/// Everything a renderer may use
#[derive(Debug, Clone, Copy)]
pub struct ReportContext<'a> {
    /// Consolidated data and logs
    pub consolidated: &'a ConsolidatedDataset,
    /// When the run started
    pub run_date: NaiveDateTime,
    /// Folder receiving the reports
    pub output_dir: &'a Path,
}

impl<'a> ReportContext<'a> {
    /// Creates a context
    #[must_use]
    pub fn new(consolidated: &'a ConsolidatedDataset, run_date: NaiveDateTime, output_dir: &'a Path) -> Self {
        Self {
            consolidated,
            run_date,
            output_dir,
        }
    }

    /// `YYYYMMDD_HHMM` tag of the run
    #[must_use]
    pub fn run_tag(&self) -> String {
        run_tag(self.run_date)
    }

    /// `Report_<tag>_<system>.<extension>` in the output folder
    #[must_use]
    pub fn report_path(&self, system: &str, extension: &str) -> PathBuf {
        self.output_dir
            .join(format!("Report_{}_{system}.{extension}", self.run_tag()))
    }
}

/// Produces one report per system
pub trait ReportRenderer {
    /// Renders the report of `system`, returning the written file
    ///
    /// # Errors
    ///
    /// Returns a [`ReportError`] if the report cannot be produced.
    fn render(&self, ctx: &ReportContext<'_>, system: &str) -> ReportResult<PathBuf>;
}

/// Renders every system of the run; failures are logged and skipped
///
/// # Errors
///
/// Returns [`ReportError::Io`] if the output folder cannot be created.
pub fn render_all<R: ReportRenderer + ?Sized>(
    renderer: &R,
    ctx: &ReportContext<'_>,
) -> ReportResult<Vec<PathBuf>> {
    let _span = tracing::info_span!(span_names::REPORT_RENDER, folder = %ctx.output_dir.display()).entered();
    std::fs::create_dir_all(ctx.output_dir).map_err(|source| ReportError::Io {
        path: ctx.output_dir.to_path_buf(),
        source,
    })?;
    let mut written = Vec::new();
    for system in ctx.consolidated.system_ids() {
        match renderer.render(ctx, system) {
            Ok(path) => {
                tracing::info!(system, file = %path.display(), "Report written");
                written.push(path);
            }
            Err(e) => tracing::error!(system, error = %e, "Report failed"),
        }
    }
    Ok(written)
}

/// Plain-text summary: shape, time span, sources and logs
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryRenderer;

impl SummaryRenderer {
    /// Summary text for one system
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::UnknownSystem`] if the run has neither rows
    /// nor a log for `system`.
    pub fn summary(&self, ctx: &ReportContext<'_>, system: &str) -> ReportResult<String> {
        if !ctx.consolidated.system_ids().any(|s| s == system) {
            return Err(ReportError::UnknownSystem(system.to_string()));
        }
        let data = ctx.consolidated.for_system(system);
        let filled = data.columns().iter().filter(|c| !c.values.is_all_missing()).count();

        let mut out = String::new();
        let _ = writeln!(out, "System:   {system}");
        let _ = writeln!(out, "Run:      {}", ctx.run_tag());
        let _ = writeln!(out, "Rows:     {}", data.len());
        let _ = writeln!(out, "Columns:  {filled}");
        match data.time_span() {
            Some((first, last)) => {
                let _ = writeln!(out, "From:     {first}");
                let _ = writeln!(out, "To:       {last}");
            }
            None => {
                let _ = writeln!(out, "No data collected");
            }
        }
        let meta = data.metadata();
        if let Some(revision) = &meta.revision {
            let _ = writeln!(out, "Revision: {revision}");
        }
        if !meta.source_files.is_empty() {
            let _ = writeln!(out, "Sources:  {}", meta.source_files.join(", "));
        }
        let _ = writeln!(out, "\n--- Logs ---");
        let _ = writeln!(out, "{}", ctx.consolidated.log(system).unwrap_or_default().trim_end());
        Ok(out)
    }
}

impl ReportRenderer for SummaryRenderer {
    fn render(&self, ctx: &ReportContext<'_>, system: &str) -> ReportResult<PathBuf> {
        let text = self.summary(ctx, system)?;
        let path = ctx.report_path(system, "txt");
        std::fs::write(&path, text).map_err(|source| ReportError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}
