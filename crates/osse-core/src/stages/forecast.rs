//! Forecast stage, run once per arm per cycle.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::ExperimentConfig;
use crate::layout::{Arm, ExperimentLayout};
use crate::leadtime::LeadTime;
use crate::schedule::{Cycle, Schedule};
use crate::stages::{StageConfig, StageId, StagedCopy, FORECAST_EXECUTABLE};
use crate::template::Overlay;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastConfig {
    pub cycle: Cycle,
    pub arm: Arm,
    pub initial_filename: PathBuf,
    pub initial_date: Cycle,
    /// Copy made before the run so the arm directory holds its own start state.
    pub staged: Option<StagedCopy>,
    pub forecast_length: LeadTime,
    pub output_dir: PathBuf,
    pub output_date: Cycle,
    pub output_frequency: LeadTime,
    pub template_path: PathBuf,
    pub config_path: PathBuf,
    pub log_path: PathBuf,
}

impl ForecastConfig {
    /// Both arms start from the experiment input at the first cycle. Later,
    /// "on" starts from this cycle's analysis and "off" from the previous
    /// "on" forecast at lead = cycle frequency.
    pub fn derive(
        config: &ExperimentConfig,
        layout: &ExperimentLayout,
        schedule: &Schedule,
        cycle: &Cycle,
        arm: Arm,
    ) -> Self {
        let (initial_filename, staged) = match (schedule.previous(cycle), arm) {
            (None, _) => (layout.forecast_initial(), None),
            (Some(_), Arm::On) => (layout.analysis_file(cycle, Arm::On), None),
            (Some(previous), Arm::Off) => {
                let to = layout.analysis_file(cycle, Arm::Off);
                let from =
                    layout.forecast_record(&previous, Arm::On, config.experiment.cycle_frequency);
                (to.clone(), Some(StagedCopy { from, to }))
            }
        };
        Self {
            cycle: *cycle,
            arm,
            initial_filename,
            initial_date: *cycle,
            staged,
            forecast_length: config.forecast.length,
            output_dir: layout.forecast_dir(cycle, arm),
            output_date: *cycle,
            output_frequency: config.forecast.frequency,
            template_path: layout.forecast_template(),
            config_path: layout.forecast_config(cycle, arm),
            log_path: layout.forecast_log(cycle, arm),
        }
    }
}

impl StageConfig for ForecastConfig {
    fn stage(&self) -> StageId {
        StageId::Forecast {
            cycle: self.cycle,
            arm: self.arm,
        }
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
            .set_display("output.date", self.output_date)
            .set_display("output.frequency", self.output_frequency)
    }

    fn staged_copy(&self) -> Option<&StagedCopy> {
        self.staged.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::experiment;
    use crate::layout::Workspace;
    use crate::stages::AssimilationConfig;

    #[test]
    fn test_first_cycle_arms_share_initial_file() {
        let config = experiment();
        let layout = ExperimentLayout::new(&Workspace::new("/work"), &config);
        let schedule = config.schedule();
        let on = ForecastConfig::derive(&config, &layout, &schedule, &config.begin(), Arm::On);
        let off = ForecastConfig::derive(&config, &layout, &schedule, &config.begin(), Arm::Off);

        assert_eq!(on.initial_filename, off.initial_filename);
        assert_eq!(on.initial_filename, layout.forecast_initial());
        assert!(on.staged.is_none() && off.staged.is_none());
        assert_ne!(on.output_dir, off.output_dir);
    }

    #[test]
    fn test_on_arm_reads_the_analysis() {
        let config = experiment();
        let layout = ExperimentLayout::new(&Workspace::new("/work"), &config);
        let schedule = config.schedule();
        let cycle = schedule.end;
        let on = ForecastConfig::derive(&config, &layout, &schedule, &cycle, Arm::On);
        let assim = AssimilationConfig::derive(&config, &layout, &schedule, &cycle).unwrap();
        assert_eq!(on.initial_filename, assim.analysis);
        assert!(on.staged.is_none());
    }

    #[test]
    fn test_off_arm_continues_previous_on_forecast() {
        let config = experiment();
        let layout = ExperimentLayout::new(&Workspace::new("/work"), &config);
        let schedule = config.schedule();
        let cycle = schedule.end;
        let off = ForecastConfig::derive(&config, &layout, &schedule, &cycle, Arm::Off);

        let staged = off.staged.clone().unwrap();
        assert_eq!(
            staged.from,
            layout.forecast_record(&config.begin(), Arm::On, config.experiment.cycle_frequency)
        );
        assert_eq!(staged.to, off.initial_filename);
        assert!(off.initial_filename.starts_with(&off.output_dir));
    }

    #[test]
    fn test_forecast_overlay() {
        let config = experiment();
        let layout = ExperimentLayout::new(&Workspace::new("/work"), &config);
        let overlay = ForecastConfig::derive(
            &config,
            &layout,
            &config.schedule(),
            &config.begin(),
            Arm::On,
        )
        .overlay();
        assert_eq!(
            overlay.get("forecast_length").and_then(|v| v.as_str()),
            Some("PT12H")
        );
        assert_eq!(
            overlay.get("output.frequency").and_then(|v| v.as_str()),
            Some("PT6H")
        );
    }
}
