//! Integration test harness.
//!
//! Drives the full prompt → model → parse → validate → correct pipeline
//! against a scripted in-memory provider, plus the HTTP layer end to end.

mod api;
mod mock_provider;
mod pipeline;
