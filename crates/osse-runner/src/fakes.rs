//! In-memory runner for tests.

use std::sync::Mutex;

use async_trait::async_trait;
use osse_core::StageId;

use crate::error::{Result, RunError};
use crate::runner::{StageResult, StageRunner};
use crate::stage::Invocation;

type Hook = Box<dyn Fn(&Invocation) -> std::io::Result<()> + Send + Sync>;

/// Records every invocation instead of launching a process.
///
/// An optional hook stands in for the program, typically writing the
/// files the real executable would produce. Stages matching `fail_when`
/// report exit code 1 without calling the hook.
#[derive(Default)]
pub struct RecordingRunner {
    invocations: Mutex<Vec<Invocation>>,
    hook: Option<Hook>,
    fail_when: Option<Box<dyn Fn(&StageId) -> bool + Send + Sync>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Invocation) -> std::io::Result<()> + Send + Sync + 'static,
    {
        self.hook = Some(Box::new(hook));
        self
    }

    pub fn failing_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StageId) -> bool + Send + Sync + 'static,
    {
        self.fail_when = Some(Box::new(predicate));
        self
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations
            .lock()
            .expect("invocation log poisoned")
            .clone()
    }

    pub fn stages(&self) -> Vec<StageId> {
        self.invocations().into_iter().map(|inv| inv.stage).collect()
    }
}

#[async_trait]
impl StageRunner for RecordingRunner {
    async fn run(&self, invocation: &Invocation) -> Result<StageResult> {
        self.invocations
            .lock()
            .expect("invocation log poisoned")
            .push(invocation.clone());

        let failed = self
            .fail_when
            .as_ref()
            .is_some_and(|predicate| predicate(&invocation.stage));
        if !failed {
            if let Some(hook) = &self.hook {
                hook(invocation).map_err(|source| RunError::Io {
                    path: invocation.output_dir.clone(),
                    source,
                })?;
            }
        }

        Ok(StageResult {
            stage: invocation.stage,
            exit_code: i32::from(failed),
            log_path: invocation.log_path.clone(),
            duration_ms: 0,
            success: !failed,
        })
    }
}
