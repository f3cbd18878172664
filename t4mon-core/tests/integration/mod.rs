#![allow(dead_code)]

mod common;

mod checkpoint_tests;
mod ingest_tests;
mod orchestration_tests;
mod selection_tests;
mod settings_tests;
mod tracing_tests;
