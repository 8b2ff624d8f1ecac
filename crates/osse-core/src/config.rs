//! Typed experiment parameters.
//!
//! The experiment file is read once into an immutable [`ExperimentConfig`].
//! Stage derivation only ever borrows it.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{OsseError, Result};
use crate::leadtime::LeadTime;
use crate::schedule::{Cycle, Schedule};
use crate::stages::background_offset;

/// Where the background state sits inside the assimilation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssimilationType {
    /// Background valid at the window centre.
    #[serde(rename = "3dvar", alias = "3d")]
    ThreeDVar,
    /// Background valid at the window start.
    #[serde(rename = "4dvar", alias = "4d")]
    FourDVar,
}

impl AssimilationType {
    pub fn name(&self) -> &'static str {
        match self {
            AssimilationType::ThreeDVar => "3dvar",
            AssimilationType::FourDVar => "4dvar",
        }
    }
}

impl fmt::Display for AssimilationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentSection {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Begin")]
    pub begin: Cycle,
    #[serde(rename = "Length")]
    pub length: LeadTime,
    #[serde(rename = "Cycle Frequency")]
    pub cycle_frequency: LeadTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssimilationSection {
    #[serde(rename = "Type")]
    pub kind: AssimilationType,
    #[serde(rename = "Algorithm")]
    pub algorithm: String,
    #[serde(rename = "Window Begin")]
    pub window_begin: LeadTime,
    #[serde(rename = "Window Length")]
    pub window_length: LeadTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastSection {
    #[serde(rename = "Length")]
    pub length: LeadTime,
    #[serde(rename = "Frequency")]
    pub frequency: LeadTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSection {
    #[serde(rename = "Spinup")]
    pub spinup: LeadTime,
}

/// Experiment-level parameters as read from the experiment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(rename = "Experiment")]
    pub experiment: ExperimentSection,
    #[serde(rename = "Assimilation")]
    pub assimilation: AssimilationSection,
    #[serde(rename = "Forecast")]
    pub forecast: ForecastSection,
    #[serde(rename = "Verification")]
    pub verification: VerificationSection,
    /// Install prefix of the external model executables.
    #[serde(rename = "JEDI Path")]
    pub jedi_path: PathBuf,
}

impl ExperimentConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(text)?;
        config.check_time_range()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| OsseError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Replace the executable install prefix.
    pub fn with_jedi_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.jedi_path = path.into();
        self
    }

    /// Every timestamp derived from the experiment must be representable:
    /// the last cycle, the truth horizon, the verification start and the
    /// windows and backgrounds of the first and last cycles.
    fn check_time_range(&self) -> Result<()> {
        let begin = self.begin();
        let end = begin.checked_offset(self.experiment.length - self.experiment.cycle_frequency)?;
        begin.checked_offset(self.experiment.length + self.forecast.length)?;
        begin.checked_offset(self.verification.spinup)?;
        end.checked_offset(self.forecast.length)?;
        let background = background_offset(
            self.assimilation.kind,
            self.assimilation.window_begin,
            self.experiment.cycle_frequency,
            self.assimilation.window_length,
        );
        for cycle in [begin, end] {
            cycle
                .checked_offset(self.assimilation.window_begin)?
                .checked_offset(self.assimilation.window_length)?;
            cycle.checked_offset(background)?;
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.experiment.name
    }

    pub fn begin(&self) -> Cycle {
        self.experiment.begin
    }

    /// The last analysis time: `Begin + Length - Cycle Frequency`.
    pub fn end(&self) -> Cycle {
        self.begin()
            .offset(self.experiment.length - self.experiment.cycle_frequency)
    }

    pub fn schedule(&self) -> Schedule {
        Schedule::new(self.begin(), self.end(), self.experiment.cycle_frequency)
    }

    /// Lead times `0, f, 2f, ...` up to the forecast length, `f` being the
    /// forecast output frequency.
    pub fn forecast_leads(&self) -> Result<Vec<LeadTime>> {
        let step = self.forecast.frequency;
        if !step.is_positive() {
            return Err(OsseError::NonPositiveFrequency(step.to_string()));
        }
        let mut leads = Vec::new();
        let mut f = LeadTime::ZERO;
        while f <= self.forecast.length {
            leads.push(f);
            f = f + step;
        }
        Ok(leads)
    }
}
