//! Errors raised while executing experiment stages.

use std::path::PathBuf;

use osse_core::OsseError;

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{stage} failed with exit code {exit_code}! See {}", log_path.display())]
    StageFailed {
        stage: String,
        exit_code: i32,
        log_path: PathBuf,
    },

    #[error("failed to launch {} for {stage}: {source}", executable.display())]
    Spawn {
        stage: String,
        executable: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} timed out after {seconds} seconds. See {}", log_path.display())]
    Timeout {
        stage: String,
        seconds: u64,
        log_path: PathBuf,
    },

    #[error("{0} is not a cycle of this experiment")]
    UnknownCycle(String),

    #[error("failed to stage {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode run report: {0}")]
    Report(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] OsseError),
}

pub type Result<T> = std::result::Result<T, RunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure_names_log() {
        let err = RunError::StageFailed {
            stage: "runForecast".to_string(),
            exit_code: 2,
            log_path: PathBuf::from("/exp/forecasts/x/assimilation_on/runForecast.stdout"),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("runForecast failed"));
        assert!(msg.contains("runForecast.stdout"));
    }

    #[test]
    fn test_core_errors_pass_through() {
        let err: RunError = OsseError::NoPreviousCycle("2020-01-01T00:00:00Z".to_string()).into();
        assert!(err.to_string().contains("2020-01-01T00:00:00Z"));
    }
}
