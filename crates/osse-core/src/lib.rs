//! OSSE core library
//!
//! Lead-time codec, cycle schedule, experiment layout, per-stage
//! configuration derivation and verification for cycling data
//! assimilation experiments on a toy model.

pub mod config;
pub mod error;
pub mod layout;
pub mod leadtime;
pub mod schedule;
pub mod stages;
pub mod telemetry;
pub mod template;
pub mod verify;

pub use config::{AssimilationType, ExperimentConfig};
pub use error::{OsseError, Result};
pub use layout::{Arm, ExperimentLayout, Workspace};
pub use leadtime::{decode, encode, LeadTime};
pub use schedule::{enumerate, previous, Cycle, Schedule};
pub use stages::{
    background_offset, AssimilationConfig, AssimilationWindow, Background, ForecastConfig,
    ObsConfig, StageConfig, StageDeriver, StageId, StagedCopy, TruthConfig,
};
pub use telemetry::{default_level, init_tracing};
pub use template::{write_yaml, Overlay, Template};
pub use verify::{
    mean_squared_error, FileRecords, RecordSource, VerificationRow, VerificationTable, Verifier,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
