//! Variational assimilation stage.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::{AssimilationType, ExperimentConfig};
use crate::error::{OsseError, Result};
use crate::layout::{Arm, ExperimentLayout};
use crate::leadtime::LeadTime;
use crate::schedule::{Cycle, Schedule};
use crate::stages::{StageConfig, StageId, AssimilationWindow, VARIATIONAL_EXECUTABLE};
use crate::template::Overlay;

const COVARIANCE_MODEL: &str = "L95Error";

/// Lead time, from the previous cycle, at which the background is valid.
///
/// 4D-Var wants the background at the window start; 3D-Var at the window
/// centre. `window_length / 2` truncates toward zero.
pub fn background_offset(
    kind: AssimilationType,
    window_begin: LeadTime,
    cycle_frequency: LeadTime,
    window_length: LeadTime,
) -> LeadTime {
    match kind {
        AssimilationType::FourDVar => window_begin + cycle_frequency,
        AssimilationType::ThreeDVar => window_begin + cycle_frequency + window_length / 2,
    }
}

/// The previous cycle's forecast used as the first guess.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Background {
    pub source_cycle: Cycle,
    pub offset: LeadTime,
    pub filename: PathBuf,
    pub date: Cycle,
}

impl Background {
    pub fn derive(
        config: &ExperimentConfig,
        layout: &ExperimentLayout,
        previous: Cycle,
    ) -> Self {
        let offset = background_offset(
            config.assimilation.kind,
            config.assimilation.window_begin,
            config.experiment.cycle_frequency,
            config.assimilation.window_length,
        );
        Self {
            source_cycle: previous,
            offset,
            filename: layout.forecast_record(&previous, Arm::On, offset),
            date: previous.offset(offset),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssimilationConfig {
    pub cycle: Cycle,
    pub window: AssimilationWindow,
    pub background: Background,
    pub covariance_date: Cycle,
    pub obs_in: PathBuf,
    pub obs_out: PathBuf,
    /// Analysis written by the external program, read by the "on" forecast.
    pub analysis: PathBuf,
    pub output_dir: PathBuf,
    pub template_path: PathBuf,
    pub config_path: PathBuf,
    pub log_path: PathBuf,
}

impl AssimilationConfig {
    /// Fails for the first cycle, which has no previous forecast.
    pub fn derive(
        config: &ExperimentConfig,
        layout: &ExperimentLayout,
        schedule: &Schedule,
        cycle: &Cycle,
    ) -> Result<Self> {
        let previous = schedule
            .previous(cycle)
            .ok_or_else(|| OsseError::NoPreviousCycle(cycle.to_string()))?;
        Ok(Self {
            cycle: *cycle,
            window: AssimilationWindow::for_cycle(config, cycle),
            background: Background::derive(config, layout, previous),
            covariance_date: *cycle,
            obs_in: layout.obs_file(cycle),
            obs_out: layout.assimilated_obs_file(cycle),
            analysis: layout.analysis_file(cycle, Arm::On),
            output_dir: layout.forecast_dir(cycle, Arm::On),
            template_path: layout.assimilation_template(),
            config_path: layout.assimilation_config(cycle),
            log_path: layout.assimilation_log(cycle),
        })
    }
}

impl StageConfig for AssimilationConfig {
    fn stage(&self) -> StageId {
        StageId::Assimilation { cycle: self.cycle }
    }

    fn executable(&self) -> &'static str {
        VARIATIONAL_EXECUTABLE
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
            .set_display("cost_function.window_begin", self.window.begin)
            .set_display("cost_function.window_length", self.window.length)
            .set_path(
                "cost_function.Jb.Background.state[*].filename",
                &self.background.filename,
            )
            .set_display("cost_function.Jb.Background.state[*].date", self.background.date)
            .set_display("cost_function.Jb.Covariance.date", self.covariance_date)
            .set("cost_function.Jb.Covariance.covariance", COVARIANCE_MODEL)
            .set_path("cost_function.Jo.ObsTypes[*].ObsData.ObsDataIn.filename", &self.obs_in)
            .set_path("cost_function.Jo.ObsTypes[*].ObsData.ObsDataOut.filename", &self.obs_out)
            .set_path("output.datadir", &self.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::experiment;
    use crate::layout::Workspace;
    use crate::stages::ObsConfig;
    use std::str::FromStr;

    fn lead(text: &str) -> LeadTime {
        LeadTime::from_str(text).unwrap()
    }

    #[test]
    fn test_centered_offset_example() {
        let offset = background_offset(
            AssimilationType::ThreeDVar,
            lead("PT-3H"),
            lead("PT6H"),
            lead("PT6H"),
        );
        assert_eq!(offset.seconds(), 21_600);
        assert_eq!(offset.to_string(), "PT6H");
    }

    #[test]
    fn test_leading_offset_skips_half_window() {
        let offset = background_offset(
            AssimilationType::FourDVar,
            lead("MT3H"),
            lead("PT6H"),
            lead("PT6H"),
        );
        assert_eq!(offset.to_string(), "PT3H");
    }

    #[test]
    fn test_half_window_truncates() {
        let offset = background_offset(
            AssimilationType::ThreeDVar,
            LeadTime::ZERO,
            LeadTime::ZERO,
            LeadTime::from_seconds(7),
        );
        assert_eq!(offset.seconds(), 3);
    }

    #[test]
    fn test_first_cycle_has_no_assimilation() {
        let config = experiment();
        let layout = ExperimentLayout::new(&Workspace::new("/work"), &config);
        let result = AssimilationConfig::derive(&config, &layout, &config.schedule(), &config.begin());
        assert!(matches!(result, Err(OsseError::NoPreviousCycle(_))));
    }

    #[test]
    fn test_background_comes_from_previous_on_forecast() {
        let config = experiment();
        let layout = ExperimentLayout::new(&Workspace::new("/work"), &config);
        let cycle = Cycle::parse("2020-01-01T12:00:00Z").unwrap();
        let assim =
            AssimilationConfig::derive(&config, &layout, &config.schedule(), &cycle).unwrap();

        // MT3H + PT12H + PT6H/2 = PT12H into the previous cycle's forecast
        assert_eq!(assim.background.offset.to_string(), "PT12H");
        assert_eq!(assim.background.date, cycle);
        assert_eq!(
            assim.background.filename,
            layout.forecast_record(&config.begin(), Arm::On, lead("PT12H"))
        );
        assert_eq!(assim.window.begin.to_string(), "2020-01-01T09:00:00Z");
    }

    #[test]
    fn test_obs_input_is_obs_stage_output() {
        let config = experiment();
        let layout = ExperimentLayout::new(&Workspace::new("/work"), &config);
        let cycle = Cycle::parse("2020-01-01T12:00:00Z").unwrap();
        let assim =
            AssimilationConfig::derive(&config, &layout, &config.schedule(), &cycle).unwrap();
        let obs = ObsConfig::derive(&config, &layout, &cycle);
        assert_eq!(assim.obs_in, obs.obs_file);
        assert!(assim.obs_out.starts_with(&assim.output_dir));
        assert!(assim.analysis.starts_with(&assim.output_dir));
    }

    #[test]
    fn test_overlay_sets_background_and_covariance() {
        let config = experiment();
        let layout = ExperimentLayout::new(&Workspace::new("/work"), &config);
        let cycle = Cycle::parse("2020-01-01T12:00:00Z").unwrap();
        let overlay = AssimilationConfig::derive(&config, &layout, &config.schedule(), &cycle)
            .unwrap()
            .overlay();
        assert_eq!(
            overlay
                .get("cost_function.Jb.Covariance.covariance")
                .and_then(|v| v.as_str()),
            Some("L95Error")
        );
        assert_eq!(
            overlay.get("cost_function.window_length").and_then(|v| v.as_str()),
            Some("PT6H")
        );
        let bkg = overlay
            .get("cost_function.Jb.Background.state[*].filename")
            .and_then(|v| v.as_str())
            .unwrap();
        assert!(bkg.ends_with(
            "forecasts/2020-01-01T00:00:00Z/assimilation_on/test.fc.2020-01-01T00:00:00Z.PT12H"
        ));
    }
}
