//! One collection run, end to end
//!
//! Validation happens before any network activity. The tunnel pool is
//! started once and stopped on every exit path, including panics and early
//! returns. Per-system failures never leave the worker: they become an
//! empty dataset and an omission sentinel for that system. The merge runs
//! after all workers are done, in system id order, so serial and parallel
//! runs produce the same result.

mod consolidate;
mod dispatch;

use std::path::PathBuf;

use chrono::NaiveDateTime;
use tracing::Span;

use crate::calculations::Calculations;
use crate::checkpoint::{CheckpointFiles, Snapshot, run_tag, write_checkpoint};
use crate::collector::{CollectOptions, Collector, empty_for};
use crate::config::Settings;
use crate::error::T4monResult;
use crate::models::{CollectionResult, MonitoredSystem, omitted_log};
use crate::session::SessionConnector;
use crate::tracing::span_names;
use crate::tunnel::TunnelPool;

pub use consolidate::{ConsolidatedDataset, ConsolidationError, consolidate};
pub use dispatch::{Dispatcher, ExecutionStrategy, ParallelDispatcher, SerialDispatcher};

/// Switches for one run
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Start of the run; its date selects the files to collect
    pub run_at: NaiveDateTime,
    /// Collect every file instead of the run date's only
    pub all_history: bool,
    /// Run the log command on each system
    pub collect_logs: bool,
    /// Serial or parallel collection
    pub strategy: ExecutionStrategy,
    /// Persist the consolidated data to the store folder
    pub write_checkpoint: bool,
}

impl RunOptions {
    /// Defaults: today's files, logs, parallel, checkpoint written
    #[must_use]
    pub fn new(run_at: NaiveDateTime) -> Self {
        Self {
            run_at,
            all_history: false,
            collect_logs: true,
            strategy: ExecutionStrategy::Parallel,
            write_checkpoint: true,
        }
    }
}

/// What a run produced
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Merged data and logs of every configured system
    pub consolidated: ConsolidatedDataset,
    /// Start of the run
    pub run_at: NaiveDateTime,
    /// Checkpoint files, unless skipped
    pub checkpoint: Option<CheckpointFiles>,
}

impl RunOutcome {
    /// `YYYYMMDD_HHMM` tag of the run
    #[must_use]
    pub fn run_tag(&self) -> String {
        run_tag(self.run_at)
    }
}

/// Stops the pool when dropped
struct PoolGuard<'p, P: TunnelPool + ?Sized> {
    pool: &'p mut P,
}

impl<P: TunnelPool + ?Sized> Drop for PoolGuard<'_, P> {
    fn drop(&mut self) {
        self.pool.stop();
    }
}

/// Drives collection runs for one set of settings
#[derive(Debug)]
pub struct Orchestrator<'a> {
    settings: &'a Settings,
    options: RunOptions,
}

impl<'a> Orchestrator<'a> {
    /// Creates an orchestrator
    #[must_use]
    pub fn new(settings: &'a Settings, options: RunOptions) -> Self {
        Self { settings, options }
    }

    /// Run options
    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn collect_options(&self) -> CollectOptions {
        CollectOptions {
            date: self.options.run_at.date(),
            all_history: self.options.all_history,
            collect_logs: self.options.collect_logs,
            generated_at: self.options.run_at,
            settings_path: self.settings.source().map(PathBuf::from),
        }
    }

    /// Settings and calculations checks done before touching the network
    fn prepare(&self) -> T4monResult<Option<Calculations>> {
        self.settings.validate()?;
        Ok(self
            .settings
            .misc
            .calculations_file
            .as_deref()
            .map(Calculations::load)
            .transpose()?)
    }

    /// Collects every system and merges the results, without persisting
    ///
    /// # Errors
    ///
    /// Returns a configuration or calculations error before the pool is
    /// started, a gateway error from [`TunnelPool::start`], or a
    /// consolidation error.
    pub fn collect<P, C>(&self, pool: &mut P, connector: &C) -> T4monResult<ConsolidatedDataset>
    where
        P: TunnelPool + ?Sized,
        C: SessionConnector,
    {
        let calculations = self.prepare()?;
        let run_span = tracing::info_span!(
            span_names::RUN,
            systems = self.settings.systems.len(),
            strategy = %self.options.strategy
        );
        let _entered = run_span.enter();

        let guard = PoolGuard { pool };
        guard.pool.start()?;
        let pool: &P = &*guard.pool;
        let options = self.collect_options();
        let collector = Collector::new(&options, &self.settings.misc.remote_log_cmd)
            .with_calculations(calculations.as_ref());
        tracing::info!("Collecting data");
        let results = self.options.strategy.dispatch(&self.settings.systems, |system| {
            collect_system(&run_span, system, pool, connector, &collector, &options)
        });
        drop(guard);
        Ok(consolidate(results)?)
    }

    /// Full run: collect, merge and checkpoint
    ///
    /// The checkpoint is skipped, with an error logged, when no system
    /// produced any rows.
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::collect`], plus checkpoint write failures.
    pub fn run<P, C>(&self, pool: &mut P, connector: &C) -> T4monResult<RunOutcome>
    where
        P: TunnelPool + ?Sized,
        C: SessionConnector,
    {
        let consolidated = self.collect(pool, connector)?;
        let run_at = self.options.run_at;
        if !self.options.write_checkpoint {
            return Ok(RunOutcome {
                consolidated,
                run_at,
                checkpoint: None,
            });
        }
        if consolidated.is_empty() {
            tracing::error!("Could not retrieve data from any system, checkpoint skipped");
            return Ok(RunOutcome {
                consolidated,
                run_at,
                checkpoint: None,
            });
        }

        let snapshot = Snapshot::new(run_at, consolidated);
        let files = write_checkpoint(
            &self.settings.misc.store_folder,
            &snapshot,
            self.options.collect_logs,
        )?;
        Ok(RunOutcome {
            consolidated: snapshot.consolidated,
            run_at,
            checkpoint: Some(files),
        })
    }
}

/// Worker body: one system, failures turned into an omitted result
fn collect_system<P, C>(
    run_span: &Span,
    system: &MonitoredSystem,
    pool: &P,
    connector: &C,
    collector: &Collector<'_>,
    options: &CollectOptions,
) -> CollectionResult
where
    P: TunnelPool + ?Sized,
    C: SessionConnector,
{
    let _span = tracing::info_span!(parent: run_span, span_names::COLLECT_SYSTEM, system = %system.id).entered();
    let omitted = |reason: String| {
        tracing::warn!(system = %system.id, reason = %reason, "System skipped");
        CollectionResult::new(
            system.id.clone(),
            empty_for(&system.id, options),
            omitted_log(reason),
        )
    };

    let status = pool.status().remove(&system.id).unwrap_or_default();
    if !status.is_up {
        let reason = status
            .error
            .unwrap_or_else(|| "tunnel is not up".to_string());
        return omitted(format!("system not reachable: {reason}"));
    }

    let session = match connector.connect(system, status.local_port) {
        Ok(session) => session,
        Err(e) => return omitted(e.to_string()),
    };
    let result = collector.collect(system, &session);
    drop(session);
    tracing::info!(system = %system.id, rows = result.dataset.len(), "Done collecting");
    result
}
