//! Contract-enforcement pipeline: parse, validate, correct.

pub mod contract;
pub mod correction;
pub mod parser;
pub mod validator;

pub use contract::{LineBatch, OutputContract, SingleJson};
pub use correction::{CorrectionController, CorrectionPolicy, PipelineOutcome};
pub use validator::{Defect, ValidationReport};
