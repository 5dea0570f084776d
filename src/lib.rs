//! AUGUR: schema-enforced LLM price predictions
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod llm;
pub mod prompt;
pub mod pipeline;
pub mod engine;
pub mod store;
pub mod storage;
pub mod dashboard;
