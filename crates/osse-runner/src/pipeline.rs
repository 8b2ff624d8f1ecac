//! Experiment orchestration: truth, observations, cycles, verification.

use std::sync::Arc;
use std::time::Instant;

use osse_core::{
    write_yaml, Arm, Cycle, ExperimentConfig, ExperimentLayout, FileRecords, StageConfig,
    StageDeriver, VerificationTable, Verifier, Workspace,
};
use tracing::{error, info};

use crate::error::{Result, RunError};
use crate::manifest::RunReport;
use crate::runner::{StageResult, StageRunner};
use crate::stage::{clear_dir, Invocation};

/// Drives one experiment through its stages, one external program at a time.
pub struct ExperimentPipeline {
    config: ExperimentConfig,
    layout: ExperimentLayout,
    runner: Arc<dyn StageRunner>,
    results: Vec<StageResult>,
}

impl ExperimentPipeline {
    pub fn new(config: ExperimentConfig, workspace: &Workspace, runner: Arc<dyn StageRunner>) -> Self {
        let layout = ExperimentLayout::new(workspace, &config);
        Self {
            config,
            layout,
            runner,
            results: Vec::new(),
        }
    }

    pub fn config(&self) -> &ExperimentConfig {
        &self.config
    }

    pub fn layout(&self) -> &ExperimentLayout {
        &self.layout
    }

    /// Stages executed so far, in order.
    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    /// Run the truth forecast from the experiment start, replacing any
    /// earlier truth products.
    pub async fn truth(&mut self) -> Result<StageResult> {
        clear_dir(&self.layout.truth_dir())?;
        let stage = StageDeriver::new(&self.config, &self.layout).truth();
        self.execute(&stage).await
    }

    /// Generate synthetic observations for every cycle after the first,
    /// replacing any earlier observation products.
    pub async fn observations(&mut self) -> Result<Vec<StageResult>> {
        let schedule = self.config.schedule();
        clear_dir(&self.layout.obs_dir())?;
        let mut results = Vec::new();
        for cycle in schedule.cycles()? {
            if schedule.is_first(&cycle) {
                continue;
            }
            let stage = StageDeriver::new(&self.config, &self.layout).observations(&cycle);
            results.push(self.execute(&stage).await?);
        }
        Ok(results)
    }

    /// Assimilate (unless this is the first cycle), then forecast both arms.
    pub async fn cycle(&mut self, cycle: &Cycle) -> Result<Vec<StageResult>> {
        let schedule = self.config.schedule();
        if !schedule.cycles()?.contains(cycle) {
            return Err(RunError::UnknownCycle(cycle.to_string()));
        }
        info!(cycle = %cycle, "Starting cycle");

        let mut results = Vec::new();
        if !schedule.is_first(cycle) {
            let stage = StageDeriver::new(&self.config, &self.layout).assimilation(cycle)?;
            results.push(self.execute(&stage).await?);
        }
        for arm in Arm::BOTH {
            let stage = StageDeriver::new(&self.config, &self.layout).forecast(cycle, arm);
            results.push(self.execute(&stage).await?);
        }
        Ok(results)
    }

    /// Compare both arms against the truth and write the verification table.
    pub fn verify(&self) -> Result<VerificationTable> {
        let verifier = Verifier::from_config(&self.config)?;
        let table = verifier.aggregate(&FileRecords::new(&self.layout))?;
        let path = self.layout.verify_table();
        table.write(&path)?;
        info!(
            cycles = verifier.cycles().len(),
            leads = verifier.leads().len(),
            path = %path.display(),
            "Wrote verification table"
        );
        Ok(table)
    }

    /// Run the whole experiment and write `run.json`, whether or not it
    /// succeeds.
    pub async fn run(&mut self) -> Result<RunReport> {
        let config_text = self.config.to_yaml()?;
        let mut report = RunReport::start(self.config.name(), &config_text);
        info!(
            run_id = %report.run_id,
            experiment = %self.config.name(),
            root = %self.layout.root().display(),
            "Starting experiment"
        );

        let start = Instant::now();
        let outcome = self.run_all().await;
        let error = outcome.as_ref().err().map(|e| e.to_string());
        report.finish(self.results.clone(), error);

        std::fs::create_dir_all(self.layout.root()).map_err(|source| RunError::Io {
            path: self.layout.root().to_path_buf(),
            source,
        })?;
        report.write(&self.layout.run_report())?;

        match outcome {
            Ok(()) => {
                info!(
                    run_id = %report.run_id,
                    stages = report.stages.len(),
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Experiment completed successfully"
                );
                Ok(report)
            }
            Err(e) => {
                error!(run_id = %report.run_id, error = %e, "Experiment failed");
                Err(e)
            }
        }
    }

    async fn run_all(&mut self) -> Result<()> {
        write_yaml(&self.layout.experiment_copy(), &self.config)?;
        self.truth().await?;
        self.observations().await?;
        for cycle in self.config.schedule().cycles()? {
            self.cycle(&cycle).await?;
        }
        self.verify()?;
        Ok(())
    }

    async fn execute(&mut self, stage: &dyn StageConfig) -> Result<StageResult> {
        let invocation = Invocation::prepare(stage, &self.layout)?;
        info!(stage = %invocation.stage, "Executing stage");

        let runner = Arc::clone(&self.runner);
        let result = runner.run(&invocation).await?;
        self.results.push(result.clone());
        result.into_checked()
    }
}
