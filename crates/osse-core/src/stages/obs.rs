//! Synthetic observation generation from the truth run.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ExperimentConfig;
use crate::layout::ExperimentLayout;
use crate::leadtime::LeadTime;
use crate::schedule::Cycle;
use crate::stages::{StageConfig, StageId, AssimilationWindow, MAKEOBS_EXECUTABLE};
use crate::template::Overlay;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObsConfig {
    pub cycle: Cycle,
    pub window: AssimilationWindow,
    /// Truth lead time at the window start, counted from the experiment start.
    pub truth_lead: LeadTime,
    pub initial_filename: PathBuf,
    pub initial_date: Cycle,
    pub obs_file: PathBuf,
    pub obs_filter_file: PathBuf,
    pub output_dir: PathBuf,
    pub template_path: PathBuf,
    pub config_path: PathBuf,
    pub log_path: PathBuf,
}

impl ObsConfig {
    pub fn derive(config: &ExperimentConfig, layout: &ExperimentLayout, cycle: &Cycle) -> Self {
        let window = AssimilationWindow::for_cycle(config, cycle);
        let truth_lead = window.begin.since(&config.begin());
        Self {
            cycle: *cycle,
            window,
            truth_lead,
            initial_filename: layout.truth_record(truth_lead),
            initial_date: window.begin,
            obs_file: layout.obs_file(cycle),
            obs_filter_file: layout.obs_filter_file(cycle),
            output_dir: layout.obs_dir(),
            template_path: layout.obs_template(),
            config_path: layout.obs_config(cycle),
            log_path: layout.obs_log(cycle),
        }
    }
}

impl StageConfig for ObsConfig {
    fn stage(&self) -> StageId {
        StageId::Observations { cycle: self.cycle }
    }

    fn executable(&self) -> &'static str {
        MAKEOBS_EXECUTABLE
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
            .set_path(
                "Observations.ObsTypes[*].ObsData.ObsDataOut.filename",
                &self.obs_file,
            )
            .set_display("Assimilation Window.Begin", self.window.begin)
            .set_display("Assimilation Window.End", self.window.end())
            .set_path("Initial Condition.filename", &self.initial_filename)
            .set_display("Initial Condition.date", self.initial_date)
            .set_path("Observations.ObsFilters[*].filename", &self.obs_filter_file)
    }
}
