// Shared helpers for the preview server integration tests

pub mod harness;
pub mod tracing;
