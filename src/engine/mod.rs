//! Core engine: batch scheduling, multi-provider orchestration and the
//! console/JSON rendering of results.

pub mod orchestrator;
pub mod report;
pub mod scheduler;

pub use orchestrator::{Orchestrator, PredictionPayload, ProviderFailure, ProviderResult};
pub use scheduler::{partition, run_prediction_cycle, BatchScheduler, SchedulerReport};
