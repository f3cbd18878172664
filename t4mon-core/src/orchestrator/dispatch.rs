//! Serial and parallel execution of per-system jobs

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc;

use serde::{Deserialize, Serialize};

use crate::models::{CollectionResult, MonitoredSystem};

/// How per-system collection is scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStrategy {
    /// One worker thread per system
    #[default]
    Parallel,
    /// One system after the other on the calling thread
    Serial,
}

impl ExecutionStrategy {
    /// Runs `job` once per system with the selected dispatcher
    ///
    /// Results come back in no particular order; a job that panics yields
    /// an omitted result for its system.
    pub fn dispatch<F>(self, systems: &[MonitoredSystem], job: F) -> Vec<CollectionResult>
    where
        F: Fn(&MonitoredSystem) -> CollectionResult + Sync,
    {
        match self {
            Self::Parallel => ParallelDispatcher.dispatch(systems, job),
            Self::Serial => SerialDispatcher.dispatch(systems, job),
        }
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parallel => f.write_str("parallel"),
            Self::Serial => f.write_str("serial"),
        }
    }
}

/// Runs one job per system
pub trait Dispatcher {
    /// Runs `job` for every system and gathers the results
    fn dispatch<F>(&self, systems: &[MonitoredSystem], job: F) -> Vec<CollectionResult>
    where
        F: Fn(&MonitoredSystem) -> CollectionResult + Sync;
}

/// Strictly sequential dispatch
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialDispatcher;

impl Dispatcher for SerialDispatcher {
    fn dispatch<F>(&self, systems: &[MonitoredSystem], job: F) -> Vec<CollectionResult>
    where
        F: Fn(&MonitoredSystem) -> CollectionResult + Sync,
    {
        systems.iter().map(|s| guarded(s, &job)).collect()
    }
}

/// Thread-per-system dispatch
///
/// Workers are named after their system and push results onto a channel;
/// the call returns once every worker has finished.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelDispatcher;

impl Dispatcher for ParallelDispatcher {
    fn dispatch<F>(&self, systems: &[MonitoredSystem], job: F) -> Vec<CollectionResult>
    where
        F: Fn(&MonitoredSystem) -> CollectionResult + Sync,
    {
        let (tx, rx) = mpsc::channel();
        let job = &job;
        std::thread::scope(|scope| {
            for system in systems {
                let worker_tx = tx.clone();
                let spawned = std::thread::Builder::new()
                    .name(system.id.clone())
                    .spawn_scoped(scope, move || {
                        // The receiver outlives the scope
                        let _ = worker_tx.send(guarded(system, job));
                    });
                if let Err(e) = spawned {
                    tracing::warn!(system = %system.id, error = %e, "Cannot spawn worker, running inline");
                    let _ = tx.send(guarded(system, job));
                }
            }
        });
        drop(tx);
        rx.into_iter().collect()
    }
}

/// Runs one job, turning a panic into an omitted result
fn guarded<F>(system: &MonitoredSystem, job: &F) -> CollectionResult
where
    F: Fn(&MonitoredSystem) -> CollectionResult,
{
    catch_unwind(AssertUnwindSafe(|| job(system))).unwrap_or_else(|_| {
        tracing::error!(system = %system.id, "Collection aborted unexpectedly");
        CollectionResult::omitted(system.id.clone(), "collection aborted unexpectedly")
    })
}
