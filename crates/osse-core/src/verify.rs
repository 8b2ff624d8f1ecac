//! Forecast verification against the truth run.
//!
//! For each forecast lead time and each cycle past the spin-up, the
//! forecast of both arms is compared with the truth record valid at the
//! same time. Per-cycle mean squared errors are averaged over cycles.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ExperimentConfig;
use crate::error::{OsseError, Result};
use crate::layout::{Arm, ExperimentLayout};
use crate::leadtime::LeadTime;
use crate::schedule::Cycle;

/// Header row of the verification table.
pub const TABLE_HEADER: &str = "LeadTime AssimilationOn AssimilationOff";

/// Zero-based line of a model record holding the state vector.
const STATE_LINE: usize = 2;

/// Read the state vector of a model output record.
pub fn read_state_vector(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path).map_err(|source| OsseError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let line = text
        .lines()
        .nth(STATE_LINE)
        .ok_or_else(|| OsseError::MissingStateLine {
            path: path.to_path_buf(),
        })?;
    line.split_whitespace()
        .map(|token| {
            token.parse::<f64>().map_err(|_| OsseError::BadRecordValue {
                path: path.to_path_buf(),
                token: token.to_string(),
            })
        })
        .collect()
}

/// Mean of squared elementwise differences. Vectors must be non-empty and
/// of equal length; `what` names the pair in the error.
pub fn mean_squared_error(truth: &[f64], forecast: &[f64], what: &str) -> Result<f64> {
    if truth.len() != forecast.len() {
        return Err(OsseError::LengthMismatch {
            what: what.to_string(),
            truth: truth.len(),
            forecast: forecast.len(),
        });
    }
    if truth.is_empty() {
        return Err(OsseError::EmptyRecord {
            what: what.to_string(),
        });
    }
    let sum: f64 = truth
        .iter()
        .zip(forecast)
        .map(|(t, f)| (f - t) * (f - t))
        .sum();
    Ok(sum / truth.len() as f64)
}

/// Lookup of state vectors by lead time, cycle and arm.
pub trait RecordSource {
    /// Truth valid `lead` after the experiment start.
    fn truth(&self, lead: LeadTime) -> Result<Vec<f64>>;

    /// Forecast started at `cycle` in `arm`, valid `lead` later.
    fn forecast(&self, cycle: &Cycle, arm: Arm, lead: LeadTime) -> Result<Vec<f64>>;
}

/// Records read from an experiment directory.
#[derive(Debug, Clone, Copy)]
pub struct FileRecords<'a> {
    layout: &'a ExperimentLayout,
}

impl<'a> FileRecords<'a> {
    pub fn new(layout: &'a ExperimentLayout) -> Self {
        Self { layout }
    }
}

impl RecordSource for FileRecords<'_> {
    fn truth(&self, lead: LeadTime) -> Result<Vec<f64>> {
        read_state_vector(&self.layout.truth_record(lead))
    }

    fn forecast(&self, cycle: &Cycle, arm: Arm, lead: LeadTime) -> Result<Vec<f64>> {
        read_state_vector(&self.layout.forecast_record(cycle, arm, lead))
    }
}

/// Mean over cycles of the per-cycle MSE at one lead time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VerificationRow {
    pub lead: LeadTime,
    pub assimilation_on: f64,
    pub assimilation_off: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationTable {
    pub rows: Vec<VerificationRow>,
}

impl VerificationTable {
    /// Whitespace-delimited text with a header row.
    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(TABLE_HEADER);
        out.push('\n');
        for row in &self.rows {
            let _ = writeln!(
                out,
                "{} {} {}",
                row.lead, row.assimilation_on, row.assimilation_off
            );
        }
        out
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| OsseError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, self.render()).map_err(|source| OsseError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Verification plan: which cycles and lead times to compare.
#[derive(Debug, Clone, PartialEq)]
pub struct Verifier {
    start: Cycle,
    cycles: Vec<Cycle>,
    leads: Vec<LeadTime>,
}

impl Verifier {
    pub fn new(start: Cycle, cycles: Vec<Cycle>, leads: Vec<LeadTime>) -> Self {
        Self {
            start,
            cycles,
            leads,
        }
    }

    pub fn from_config(config: &ExperimentConfig) -> Result<Self> {
        let cycles = config
            .schedule()
            .cycles_after(config.verification.spinup)?;
        if cycles.is_empty() {
            return Err(OsseError::NoVerificationCycles {
                from: config.begin().offset(config.verification.spinup).to_string(),
                to: config.end().to_string(),
            });
        }
        Ok(Self::new(config.begin(), cycles, config.forecast_leads()?))
    }

    pub fn cycles(&self) -> &[Cycle] {
        &self.cycles
    }

    pub fn leads(&self) -> &[LeadTime] {
        &self.leads
    }

    pub fn aggregate(&self, records: &dyn RecordSource) -> Result<VerificationTable> {
        if self.cycles.is_empty() {
            return Err(OsseError::NoVerificationCycles {
                from: self.start.to_string(),
                to: self.start.to_string(),
            });
        }
        let mut rows = Vec::with_capacity(self.leads.len());
        for &lead in &self.leads {
            let mut samples: BTreeMap<Arm, Vec<f64>> = BTreeMap::new();
            for cycle in &self.cycles {
                let valid = cycle.checked_offset(lead)?;
                let truth = records.truth(valid.since(&self.start))?;
                for arm in Arm::BOTH {
                    let forecast = records.forecast(cycle, arm, lead)?;
                    let what = format!("lead {lead}, cycle {cycle}, assimilation_{arm}");
                    let mse = mean_squared_error(&truth, &forecast, &what)?;
                    debug!(%lead, %cycle, %arm, mse, "verified forecast");
                    samples.entry(arm).or_default().push(mse);
                }
            }
            rows.push(VerificationRow {
                lead,
                assimilation_on: mean(&samples[&Arm::On]),
                assimilation_off: mean(&samples[&Arm::Off]),
            });
        }
        Ok(VerificationTable { rows })
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}
