//! Truth trajectory stage.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ExperimentConfig;
use crate::layout::ExperimentLayout;
use crate::leadtime::LeadTime;
use crate::schedule::Cycle;
use crate::stages::{StageConfig, StageId, FORECAST_EXECUTABLE};
use crate::template::Overlay;

/// One long model run from the experiment start, long enough for the
/// last cycle's forecasts to be verified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TruthConfig {
    pub initial_filename: PathBuf,
    pub initial_date: Cycle,
    pub forecast_length: LeadTime,
    pub output_dir: PathBuf,
    pub output_date: Cycle,
    pub output_frequency: LeadTime,
    pub template_path: PathBuf,
    pub config_path: PathBuf,
    pub log_path: PathBuf,
}

impl TruthConfig {
    pub fn derive(config: &ExperimentConfig, layout: &ExperimentLayout) -> Self {
        Self {
            initial_filename: layout.truth_initial(),
            initial_date: config.begin(),
            forecast_length: config.experiment.length + config.forecast.length,
            output_dir: layout.truth_dir(),
            output_date: config.begin(),
            output_frequency: config.forecast.frequency,
            template_path: layout.truth_template(),
            config_path: layout.truth_config(),
            log_path: layout.truth_log(),
        }
    }
}

impl StageConfig for TruthConfig {
    fn stage(&self) -> StageId {
        StageId::Truth
    }

    fn executable(&self) -> &'static str {
        FORECAST_EXECUTABLE
    }

    fn template_path(&self) -> &Path {
        &self.template_path
    }

    fn config_path(&self) -> &Path {
        &self.config_path
    }

    fn log_path(&self) -> &Path {
        &self.log_path
    }

    fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn overlay(&self) -> Overlay {
        Overlay::new()
            .set_path("initial.filename", &self.initial_filename)
            .set_display("initial.date", self.initial_date)
            .set_display("forecast_length", self.forecast_length)
            .set_path("output.datadir", &self.output_dir)
            .set_display("output.frequency", self.output_frequency)
            .set_display("output.date", self.output_date)
    }
}
