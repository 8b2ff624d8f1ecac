//! Per-cycle stage configuration.
//!
//! Each stage has an immutable config struct built by a pure derivation
//! from the [`ExperimentConfig`], the [`ExperimentLayout`] and the cycle.
//! [`StageConfig`] is the seam the runner consumes: where the template
//! lives, what to overlay onto it, where to write the result, which
//! executable to call and where its stdout goes.

pub mod assimilation;
pub mod forecast;
pub mod obs;
pub mod truth;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::layout::{Arm, ExperimentLayout};
use crate::leadtime::LeadTime;
use crate::schedule::{Cycle, Schedule};
use crate::template::Overlay;

pub use assimilation::{background_offset, AssimilationConfig, Background};
pub use forecast::ForecastConfig;
pub use obs::ObsConfig;
pub use truth::TruthConfig;

pub const FORECAST_EXECUTABLE: &str = "l95_forecast.x";
pub const MAKEOBS_EXECUTABLE: &str = "l95_makeobs.x";
pub const VARIATIONAL_EXECUTABLE: &str = "l95_4dvar.x";

/// Identity of one external invocation within an experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageId {
    Truth,
    Observations { cycle: Cycle },
    Assimilation { cycle: Cycle },
    Forecast { cycle: Cycle, arm: Arm },
}

impl StageId {
    pub fn name(&self) -> &'static str {
        match self {
            StageId::Truth => "makeTruth",
            StageId::Observations { .. } => "makeObs",
            StageId::Assimilation { .. } => "runAssimilation",
            StageId::Forecast { .. } => "runForecast",
        }
    }

    pub fn cycle(&self) -> Option<Cycle> {
        match self {
            StageId::Truth => None,
            StageId::Observations { cycle }
            | StageId::Assimilation { cycle }
            | StageId::Forecast { cycle, .. } => Some(*cycle),
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageId::Truth => f.write_str(self.name()),
            StageId::Observations { cycle } | StageId::Assimilation { cycle } => {
                write!(f, "{} {}", self.name(), cycle)
            }
            StageId::Forecast { cycle, arm } => {
                write!(f, "{} {} assimilation_{}", self.name(), cycle, arm)
            }
        }
    }
}

/// Assimilation window: an absolute begin and a length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssimilationWindow {
    pub begin: Cycle,
    pub length: LeadTime,
}

impl AssimilationWindow {
    /// Window of the analysis at `cycle`.
    pub fn for_cycle(config: &ExperimentConfig, cycle: &Cycle) -> Self {
        Self {
            begin: cycle.offset(config.assimilation.window_begin),
            length: config.assimilation.window_length,
        }
    }

    pub fn end(&self) -> Cycle {
        self.begin.offset(self.length)
    }
}

/// A file copied into place before a stage runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedCopy {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// What the runner needs to know about a derived stage.
pub trait StageConfig {
    fn stage(&self) -> StageId;

    /// Executable file name under `<install>/bin`.
    fn executable(&self) -> &'static str;

    fn template_path(&self) -> &Path;

    /// Where the rendered configuration is written.
    fn config_path(&self) -> &Path;

    /// Captured stdout of the external process.
    fn log_path(&self) -> &Path;

    /// Directory the stage writes its products into.
    fn output_dir(&self) -> &Path;

    fn overlay(&self) -> Overlay;

    fn staged_copy(&self) -> Option<&StagedCopy> {
        None
    }
}

/// Derives stage configs for one experiment.
#[derive(Debug, Clone)]
pub struct StageDeriver<'a> {
    config: &'a ExperimentConfig,
    layout: &'a ExperimentLayout,
    schedule: Schedule,
}

impl<'a> StageDeriver<'a> {
    pub fn new(config: &'a ExperimentConfig, layout: &'a ExperimentLayout) -> Self {
        Self {
            config,
            layout,
            schedule: config.schedule(),
        }
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn truth(&self) -> TruthConfig {
        TruthConfig::derive(self.config, self.layout)
    }

    pub fn observations(&self, cycle: &Cycle) -> ObsConfig {
        ObsConfig::derive(self.config, self.layout, cycle)
    }

    pub fn assimilation(&self, cycle: &Cycle) -> Result<AssimilationConfig> {
        AssimilationConfig::derive(self.config, self.layout, &self.schedule, cycle)
    }

    pub fn forecast(&self, cycle: &Cycle, arm: Arm) -> ForecastConfig {
        ForecastConfig::derive(self.config, self.layout, &self.schedule, cycle, arm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::experiment;

    #[test]
    fn test_window_for_cycle() {
        let config = experiment();
        let cycle = Cycle::parse("2020-01-01T12:00:00Z").unwrap();
        let window = AssimilationWindow::for_cycle(&config, &cycle);
        assert_eq!(window.begin.to_string(), "2020-01-01T09:00:00Z");
        assert_eq!(window.end().to_string(), "2020-01-01T15:00:00Z");
    }

    #[test]
    fn test_stage_id_display() {
        let cycle = Cycle::parse("2020-01-01T12:00:00Z").unwrap();
        assert_eq!(StageId::Truth.to_string(), "makeTruth");
        assert_eq!(
            StageId::Forecast { cycle, arm: Arm::Off }.to_string(),
            "runForecast 2020-01-01T12:00:00Z assimilation_off"
        );
        assert_eq!(StageId::Assimilation { cycle }.cycle(), Some(cycle));
        assert_eq!(StageId::Truth.cycle(), None);
    }
}
