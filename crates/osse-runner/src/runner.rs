//! External program execution.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use osse_core::StageId;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{Result, RunError};
use crate::stage::Invocation;

/// Result of a stage execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    pub stage: StageId,

    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub log_path: PathBuf,

    /// Duration in milliseconds.
    pub duration_ms: u64,

    pub success: bool,
}

impl StageResult {
    /// Whether this stage passed (exit code 0).
    pub fn passed(&self) -> bool {
        self.success && self.exit_code == 0
    }

    /// Turn a non-zero exit into a [`RunError::StageFailed`].
    pub fn into_checked(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(RunError::StageFailed {
                stage: self.stage.name().to_string(),
                exit_code: self.exit_code,
                log_path: self.log_path,
            })
        }
    }
}

/// Executes prepared stages.
///
/// A runner reports non-zero exits through [`StageResult`]; only failures
/// to launch or wait on the program are errors.
#[async_trait]
pub trait StageRunner: Send + Sync {
    async fn run(&self, invocation: &Invocation) -> Result<StageResult>;
}

/// Runs the stage executable as a child process with the rendered config
/// path as its argument and stdout written to the stage log.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    timeout: Option<Duration>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill and fail stages running longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl StageRunner for ProcessRunner {
    async fn run(&self, invocation: &Invocation) -> Result<StageResult> {
        let start = Instant::now();
        let stage = invocation.stage.name().to_string();

        let log = std::fs::File::create(&invocation.log_path).map_err(|source| RunError::Io {
            path: invocation.log_path.clone(),
            source,
        })?;

        debug!(
            stage = %invocation.stage,
            executable = %invocation.executable.display(),
            "launching stage"
        );
        let mut child = Command::new(&invocation.executable)
            .arg(&invocation.config_path)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RunError::Spawn {
                stage: stage.clone(),
                executable: invocation.executable.clone(),
                source,
            })?;

        let wait_error = |source: std::io::Error| RunError::Spawn {
            stage: stage.clone(),
            executable: invocation.executable.clone(),
            source,
        };
        let status = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(status) => status.map_err(wait_error)?,
                Err(_) => {
                    warn!(stage = %invocation.stage, "stage timed out, killing");
                    let _ = child.kill().await;
                    return Err(RunError::Timeout {
                        stage: stage.clone(),
                        seconds: limit.as_secs(),
                        log_path: invocation.log_path.clone(),
                    });
                }
            },
            None => child.wait().await.map_err(wait_error)?,
        };

        Ok(StageResult {
            stage: invocation.stage,
            exit_code: status.code().unwrap_or(-1),
            log_path: invocation.log_path.clone(),
            duration_ms: start.elapsed().as_millis() as u64,
            success: status.success(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(dir: &tempfile::TempDir, body: &str) -> Invocation {
        let config_path = dir.path().join("stage.yaml");
        std::fs::write(&config_path, body).unwrap();
        Invocation {
            stage: StageId::Truth,
            executable: PathBuf::from("sh"),
            config_path,
            log_path: dir.path().join("makeTruth.stdout"),
            output_dir: dir.path().to_path_buf(),
        }
    }

    #[test]
    fn test_stage_result_failed() {
        let result = StageResult {
            stage: StageId::Truth,
            exit_code: 1,
            log_path: PathBuf::from("truth/makeTruth.stdout"),
            duration_ms: 100,
            success: false,
        };
        assert!(!result.passed());
        let err = result.into_checked().unwrap_err();
        assert!(err.to_string().contains("makeTruth failed"));
        assert!(err.to_string().contains("truth/makeTruth.stdout"));
    }

    #[tokio::test]
    async fn test_stdout_goes_to_log() {
        let dir = tempfile::tempdir().unwrap();
        let inv = script(&dir, "echo hello\n");

        let result = ProcessRunner::new().run(&inv).await.expect("run failed");
        assert!(result.passed());
        assert_eq!(
            std::fs::read_to_string(&inv.log_path).unwrap().trim(),
            "hello"
        );
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let inv = script(&dir, "exit 3\n");

        let result = ProcessRunner::new().run(&inv).await.expect("run failed");
        assert!(!result.success);
        assert_eq!(result.exit_code, 3);
    }

    #[tokio::test]
    async fn test_missing_executable_is_a_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut inv = script(&dir, "");
        inv.executable = dir.path().join("bin/l95_forecast.x");

        let err = ProcessRunner::new().run(&inv).await.unwrap_err();
        assert!(matches!(err, RunError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let inv = script(&dir, "sleep 5\n");

        let err = ProcessRunner::new()
            .with_timeout(Duration::from_millis(100))
            .run(&inv)
            .await
            .unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }));
    }
}
