//! OSSE runner
//!
//! Renders stage configurations to disk, launches the model executables
//! in order and records each experiment run:
//! - truth forecast and synthetic observations
//! - per-cycle assimilation and "on"/"off" forecasts
//! - verification table and `run.json` report

pub mod error;
pub mod fakes;
pub mod manifest;
pub mod pipeline;
pub mod runner;
pub mod stage;

// Re-export key types
pub use error::{Result, RunError};
pub use manifest::{config_digest, RunReport};
pub use pipeline::ExperimentPipeline;
pub use runner::{ProcessRunner, StageResult, StageRunner};
pub use stage::Invocation;
