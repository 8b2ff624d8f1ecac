//! Run report written alongside each experiment.

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, RunError};
use crate::runner::StageResult;

/// Hex SHA-256 of the experiment configuration text.
pub fn config_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub experiment: String,
    pub config_digest: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub success: bool,
    pub stages: Vec<StageResult>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn start(experiment: &str, config_text: &str) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            experiment: experiment.to_string(),
            config_digest: config_digest(config_text),
            started_at: Utc::now(),
            finished_at: None,
            success: false,
            stages: Vec::new(),
            error: None,
        }
    }

    pub fn finish(&mut self, stages: Vec<StageResult>, error: Option<String>) {
        self.finished_at = Some(Utc::now());
        self.success = error.is_none() && stages.iter().all(StageResult::passed);
        self.stages = stages;
        self.error = error;
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| RunError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osse_core::StageId;
    use std::path::PathBuf;

    #[test]
    fn test_digest_is_stable_hex() {
        let a = config_digest("Experiment:\n  Name: x\n");
        assert_eq!(a, config_digest("Experiment:\n  Name: x\n"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, config_digest("Experiment:\n  Name: y\n"));
    }

    #[test]
    fn test_failed_stage_marks_run_failed() {
        let mut report = RunReport::start("l95", "text");
        report.finish(
            vec![StageResult {
                stage: StageId::Truth,
                exit_code: 1,
                log_path: PathBuf::from("truth/makeTruth.stdout"),
                duration_ms: 5,
                success: false,
            }],
            None,
        );
        assert!(!report.success);
        assert_eq!(report.stages.len(), 1);
        assert!(report.finished_at.is_some());
    }

    #[test]
    fn test_report_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let mut report = RunReport::start("l95", "text");
        report.finish(Vec::new(), None);
        report.write(&path).unwrap();

        let back: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back.run_id, report.run_id);
        assert!(back.success);
    }
}
