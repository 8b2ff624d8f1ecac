//! Filesystem layout of one experiment.
//!
//! Every artifact a stage reads or writes is resolved here, keyed by
//! cycle, arm and lead time, so that the producer of a file and its
//! consumers in later cycles agree on its location.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::{AssimilationType, ExperimentConfig};
use crate::leadtime::LeadTime;
use crate::schedule::Cycle;

/// One of the two parallel experiment variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arm {
    /// Forecasts started from the analysis.
    On,
    /// Forecasts started from the previous un-assimilated forecast.
    Off,
}

impl Arm {
    pub const BOTH: [Arm; 2] = [Arm::On, Arm::Off];

    pub fn name(&self) -> &'static str {
        match self {
            Arm::On => "on",
            Arm::Off => "off",
        }
    }
}

impl fmt::Display for Arm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Base directory holding stage templates, input data and experiments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn template_dir(&self) -> PathBuf {
        self.root.join("yaml")
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join("input_data")
    }

    pub fn experiment_dir(&self, name: &str) -> PathBuf {
        self.root.join("experiments").join(name)
    }
}

/// Resolved paths for a single experiment.
#[derive(Debug, Clone)]
pub struct ExperimentLayout {
    name: String,
    begin: Cycle,
    kind: AssimilationType,
    algorithm: String,
    input_dir: PathBuf,
    template_dir: PathBuf,
    root: PathBuf,
    bin_dir: PathBuf,
}

impl ExperimentLayout {
    pub fn new(workspace: &Workspace, config: &ExperimentConfig) -> Self {
        Self {
            name: config.name().to_string(),
            begin: config.begin(),
            kind: config.assimilation.kind,
            algorithm: config.assimilation.algorithm.clone(),
            input_dir: workspace.input_dir(),
            template_dir: workspace.template_dir(),
            root: workspace.experiment_dir(config.name()),
            bin_dir: config.jedi_path.join("bin"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn executable(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }

    // -- templates ---------------------------------------------------------

    pub fn truth_template(&self) -> PathBuf {
        self.template_dir.join("truth.yaml")
    }

    pub fn obs_template(&self) -> PathBuf {
        self.template_dir.join(format!("makeobs.{}.yaml", self.kind))
    }

    pub fn assimilation_template(&self) -> PathBuf {
        self.template_dir
            .join(format!("{}.{}.yaml", self.kind, self.algorithm))
    }

    pub fn forecast_template(&self) -> PathBuf {
        self.template_dir.join("forecast.yaml")
    }

    // -- derived configuration ---------------------------------------------

    pub fn yaml_dir(&self) -> PathBuf {
        self.root.join("yaml")
    }

    pub fn experiment_copy(&self) -> PathBuf {
        self.yaml_dir().join(format!("{}.yaml", self.name))
    }

    pub fn truth_config(&self) -> PathBuf {
        self.yaml_dir().join("truth.yaml")
    }

    pub fn obs_config(&self, cycle: &Cycle) -> PathBuf {
        self.yaml_dir()
            .join(format!("makeobs.{}.{}.yaml", self.kind, cycle))
    }

    pub fn assimilation_config(&self, cycle: &Cycle) -> PathBuf {
        self.yaml_dir()
            .join(format!("{}.{}.{}.yaml", self.kind, self.algorithm, cycle))
    }

    pub fn forecast_config(&self, cycle: &Cycle, arm: Arm) -> PathBuf {
        self.yaml_dir()
            .join(format!("forecast.{}.{}.yaml", arm, cycle))
    }

    // -- inputs ------------------------------------------------------------

    pub fn truth_initial(&self) -> PathBuf {
        self.input_dir
            .join(format!("truth.an.{}.l95", self.begin))
    }

    pub fn forecast_initial(&self) -> PathBuf {
        self.input_dir.join(format!("test.an.{}.l95", self.begin))
    }

    // -- truth -------------------------------------------------------------

    pub fn truth_dir(&self) -> PathBuf {
        self.root.join("truth")
    }

    /// Truth record valid at `begin + lead`.
    pub fn truth_record(&self, lead: LeadTime) -> PathBuf {
        self.truth_dir()
            .join(format!("truth.fc.{}.{}", self.begin, lead))
    }

    pub fn truth_log(&self) -> PathBuf {
        self.truth_dir().join("makeTruth.stdout")
    }

    // -- observations ------------------------------------------------------

    pub fn obs_dir(&self) -> PathBuf {
        self.root.join("obs")
    }

    pub fn obs_file(&self, cycle: &Cycle) -> PathBuf {
        self.obs_dir()
            .join(format!("l95.truth.{}.{}.obt", self.kind, cycle))
    }

    pub fn obs_filter_file(&self, cycle: &Cycle) -> PathBuf {
        self.obs_dir()
            .join(format!("l95.{}.{}.gom", self.kind, cycle))
    }

    pub fn obs_log(&self, cycle: &Cycle) -> PathBuf {
        self.obs_dir()
            .join(format!("makeObs.{}.{}.stdout", self.kind, cycle))
    }

    // -- forecasts and analyses ----------------------------------------------

    pub fn forecast_dir(&self, cycle: &Cycle, arm: Arm) -> PathBuf {
        self.root
            .join("forecasts")
            .join(cycle.to_string())
            .join(format!("assimilation_{}", arm))
    }

    /// Forecast record started at `cycle` and valid at `cycle + lead`.
    pub fn forecast_record(&self, cycle: &Cycle, arm: Arm, lead: LeadTime) -> PathBuf {
        self.forecast_dir(cycle, arm)
            .join(format!("test.fc.{}.{}", cycle, lead))
    }

    /// Initial state read by the forecast of `cycle` in `arm`.
    pub fn analysis_file(&self, cycle: &Cycle, arm: Arm) -> PathBuf {
        self.forecast_dir(cycle, arm)
            .join(format!("test.an.{}", cycle))
    }

    /// Observation-space output of the assimilation at `cycle`.
    pub fn assimilated_obs_file(&self, cycle: &Cycle) -> PathBuf {
        self.forecast_dir(cycle, Arm::On)
            .join(format!("l95.{}.{}.obt", self.kind, cycle))
    }

    pub fn assimilation_log(&self, cycle: &Cycle) -> PathBuf {
        self.forecast_dir(cycle, Arm::On).join("runAssimilation.stdout")
    }

    pub fn forecast_log(&self, cycle: &Cycle, arm: Arm) -> PathBuf {
        self.forecast_dir(cycle, arm).join("runForecast.stdout")
    }

    // -- verification --------------------------------------------------------

    pub fn verify_dir(&self) -> PathBuf {
        self.root.join("verify")
    }

    pub fn verify_table(&self) -> PathBuf {
        self.verify_dir().join("verify.dat")
    }

    pub fn run_report(&self) -> PathBuf {
        self.root.join("run.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::fixtures::experiment;

    fn layout() -> ExperimentLayout {
        ExperimentLayout::new(&Workspace::new("/work"), &experiment())
    }

    #[test]
    fn test_experiment_paths() {
        let layout = layout();
        assert_eq!(layout.root(), Path::new("/work/experiments/l95-3dvar"));
        assert_eq!(
            layout.truth_record(LeadTime::from_hours(6)),
            PathBuf::from("/work/experiments/l95-3dvar/truth/truth.fc.2020-01-01T00:00:00Z.PT6H")
        );
        assert_eq!(
            layout.executable("l95_forecast.x"),
            PathBuf::from("/opt/jedi/bin/l95_forecast.x")
        );
        assert_eq!(
            layout.assimilation_template(),
            PathBuf::from("/work/yaml/3dvar.3dvar.yaml")
        );
    }

    #[test]
    fn test_forecast_paths_are_namespaced_by_arm() {
        let layout = layout();
        let cycle = Cycle::parse("2020-01-01T12:00:00Z").unwrap();
        let on = layout.forecast_record(&cycle, Arm::On, LeadTime::ZERO);
        let off = layout.forecast_record(&cycle, Arm::Off, LeadTime::ZERO);
        assert_ne!(on, off);
        assert!(on.ends_with("forecasts/2020-01-01T12:00:00Z/assimilation_on/test.fc.2020-01-01T12:00:00Z.PT0S"));
        assert!(off.to_string_lossy().contains("assimilation_off"));
        assert_ne!(
            layout.forecast_config(&cycle, Arm::On),
            layout.forecast_config(&cycle, Arm::Off)
        );
    }

    #[test]
    fn test_obs_paths_carry_type_and_cycle() {
        let layout = layout();
        let cycle = Cycle::parse("2020-01-01T12:00:00Z").unwrap();
        assert!(layout
            .obs_file(&cycle)
            .ends_with("obs/l95.truth.3dvar.2020-01-01T12:00:00Z.obt"));
        assert!(layout
            .obs_filter_file(&cycle)
            .ends_with("obs/l95.3dvar.2020-01-01T12:00:00Z.gom"));
    }
}
