//! Span names emitted along a run

use std::sync::{Arc, Mutex};

use tracing::span::{Attributes, Id};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use t4mon_core::checkpoint::read_snapshot;
use t4mon_core::report::{ReportContext, SummaryRenderer, render_all};
use t4mon_core::{ExecutionStrategy, Orchestrator, RunOptions, Settings, span_names};

use super::common::{FakeConnector, FakePool, FakeSystem, run_at, settings_toml, small_export};

/// Records the name of every span created
#[derive(Clone, Default)]
struct SpanRecorder(Arc<Mutex<Vec<&'static str>>>);

impl<S: tracing::Subscriber> Layer<S> for SpanRecorder {
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, _ctx: Context<'_, S>) {
        self.0.lock().expect("recorder lock").push(attrs.metadata().name());
    }
}

#[test]
fn run_emits_the_standard_spans() {
    let recorder = SpanRecorder::default();
    let subscriber = tracing_subscriber::registry().with(recorder.clone());

    tracing::subscriber::with_default(subscriber, || {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, settings_toml(&["SYS1"])).expect("write");
        let mut settings = Settings::load(&path).expect("loads");
        settings.misc.store_folder = dir.path().join("store");

        let connector = FakeConnector::default().with(
            "SYS1",
            FakeSystem::with_files(vec![("a_05jun2015.csv".into(), small_export("SYS1", 0, 3))]),
        );
        let mut pool = FakePool::new(&["SYS1"], &[]);
        let options = RunOptions {
            strategy: ExecutionStrategy::Serial,
            ..RunOptions::new(run_at())
        };
        let outcome = Orchestrator::new(&settings, options)
            .run(&mut pool, &connector)
            .expect("run");
        let files = outcome.checkpoint.as_ref().expect("checkpoint written");
        read_snapshot(&files.snapshot).expect("reloads");

        let out = dir.path().join("reports");
        render_all(&SummaryRenderer, &ReportContext::new(&outcome.consolidated, outcome.run_at, &out))
            .expect("renders");
    });

    let names = recorder.0.lock().expect("recorder lock").clone();
    for expected in [
        span_names::CONFIG_LOAD,
        span_names::RUN,
        span_names::COLLECT_SYSTEM,
        span_names::INGEST_FILE,
        span_names::CONSOLIDATE,
        span_names::CHECKPOINT_WRITE,
        span_names::CHECKPOINT_LOAD,
        span_names::REPORT_RENDER,
    ] {
        assert!(names.contains(&expected), "missing span {expected}: {names:?}");
    }
}
