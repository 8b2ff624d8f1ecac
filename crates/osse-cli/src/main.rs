//! OSSE - cycling observing system simulation experiments
//!
//! The `osse` command drives a toy-model experiment through external
//! forecast, observation and assimilation programs.
//!
//! ## Commands
//!
//! - `run`: truth, observations, every cycle, then verification
//! - `truth` / `obs` / `cycle` / `verify`: one phase at a time
//! - `cycles`: print the cycle schedule
//! - `leadtime`: encode or decode ISO-8601 style lead times

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use osse_core::{default_level, init_tracing, Cycle, ExperimentConfig, LeadTime, Workspace};
use osse_runner::{ExperimentPipeline, ProcessRunner, StageResult};
use tracing::info;

#[derive(Parser)]
#[command(name = "osse")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Cycling OSSE driver for a toy model", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Directory holding yaml/, input_data/ and experiments/
    #[arg(long, global = true, default_value = ".")]
    base_dir: PathBuf,

    /// Install prefix of the model executables, overriding `JEDI Path`
    #[arg(long, global = true, env = "JEDI_PATH")]
    jedi_path: Option<PathBuf>,

    /// Kill any stage running longer than this many seconds (0 = no limit)
    #[arg(long, global = true, default_value = "0")]
    stage_timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole experiment
    Run {
        /// Experiment configuration (YAML)
        config: PathBuf,
    },

    /// Run the truth forecast
    Truth { config: PathBuf },

    /// Generate observations for every cycle after the first
    Obs { config: PathBuf },

    /// Run one cycle: assimilation (unless first) and both forecasts
    Cycle {
        config: PathBuf,

        /// Cycle time, e.g. 2020-01-01T12:00:00Z
        time: String,
    },

    /// Verify both arms against the truth and write verify/verify.dat
    Verify { config: PathBuf },

    /// Print the cycle schedule
    Cycles { config: PathBuf },

    /// Lead time conversions
    Leadtime {
        #[command(subcommand)]
        action: LeadtimeAction,
    },
}

#[derive(Subcommand)]
enum LeadtimeAction {
    /// Seconds to text, e.g. 21600 -> PT6H
    Encode {
        #[arg(allow_hyphen_values = true)]
        seconds: i64,
    },

    /// Text to seconds, e.g. MT3H -> -10800
    Decode {
        #[arg(allow_hyphen_values = true)]
        text: String,

        /// Reject text outside the lead-time grammar
        #[arg(long)]
        strict: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.json, default_level(cli.verbose));

    let workspace = Workspace::new(&cli.base_dir);
    let jedi = cli.jedi_path.as_deref();
    let timeout = cli.stage_timeout;

    match cli.command {
        Commands::Run { config } => cmd_run(&workspace, &config, jedi, timeout).await,
        Commands::Truth { config } => {
            let mut pipeline = build_pipeline(&workspace, &config, jedi, timeout)?;
            let result = pipeline.truth().await?;
            print_results(std::slice::from_ref(&result));
            Ok(())
        }
        Commands::Obs { config } => {
            let mut pipeline = build_pipeline(&workspace, &config, jedi, timeout)?;
            let results = pipeline.observations().await?;
            print_results(&results);
            Ok(())
        }
        Commands::Cycle { config, time } => {
            let cycle: Cycle = time
                .parse()
                .with_context(|| format!("Invalid cycle time {time:?}"))?;
            let mut pipeline = build_pipeline(&workspace, &config, jedi, timeout)?;
            let results = pipeline.cycle(&cycle).await?;
            print_results(&results);
            Ok(())
        }
        Commands::Verify { config } => {
            let pipeline = build_pipeline(&workspace, &config, jedi, timeout)?;
            let table = pipeline.verify()?;
            print!("{}", table.render());
            Ok(())
        }
        Commands::Cycles { config } => cmd_cycles(&config),
        Commands::Leadtime { action } => cmd_leadtime(action),
    }
}

fn load_config(path: &Path, jedi: Option<&Path>) -> Result<ExperimentConfig> {
    let config = ExperimentConfig::load(path)
        .with_context(|| format!("Failed to load experiment config {}", path.display()))?;
    Ok(match jedi {
        Some(prefix) => config.with_jedi_path(prefix),
        None => config,
    })
}

fn build_pipeline(
    workspace: &Workspace,
    config: &Path,
    jedi: Option<&Path>,
    timeout: u64,
) -> Result<ExperimentPipeline> {
    let config = load_config(config, jedi)?;
    let mut runner = ProcessRunner::new();
    if timeout > 0 {
        runner = runner.with_timeout(Duration::from_secs(timeout));
    }
    Ok(ExperimentPipeline::new(config, workspace, Arc::new(runner)))
}

async fn cmd_run(
    workspace: &Workspace,
    config: &Path,
    jedi: Option<&Path>,
    timeout: u64,
) -> Result<()> {
    let mut pipeline = build_pipeline(workspace, config, jedi, timeout)?;
    println!("Running experiment: {}", pipeline.config().name());
    println!("Output: {}", pipeline.layout().root().display());

    let report = pipeline
        .run()
        .await
        .with_context(|| format!("Experiment {} failed", pipeline.config().name()))?;

    print_results(&report.stages);
    println!();
    println!("Run ID: {}", report.run_id);
    println!("Config digest: {}", &report.config_digest[..12]);
    println!(
        "Verification: {}",
        pipeline.layout().verify_table().display()
    );
    info!(run_id = %report.run_id, "Run report written");
    Ok(())
}

fn cmd_cycles(config: &Path) -> Result<()> {
    let config = load_config(config, None)?;
    let schedule = config.schedule();
    for cycle in schedule.cycles()? {
        let marker = if schedule.is_first(&cycle) {
            "  (no assimilation)"
        } else {
            ""
        };
        println!("{cycle}{marker}");
    }
    Ok(())
}

fn cmd_leadtime(action: LeadtimeAction) -> Result<()> {
    match action {
        LeadtimeAction::Encode { seconds } => {
            println!("{}", LeadTime::from_seconds(seconds));
        }
        LeadtimeAction::Decode { text, strict } => {
            let lead = if strict {
                LeadTime::parse_strict(&text)?
            } else {
                LeadTime::from_seconds(osse_core::decode(&text))
            };
            println!("{}", lead.seconds());
        }
    }
    Ok(())
}

fn print_results(results: &[StageResult]) {
    for result in results {
        let status = if result.passed() { "ok" } else { "FAILED" };
        println!(
            "{:<8} {:<48} {:>8}ms  {}",
            status,
            result.stage.to_string(),
            result.duration_ms,
            result.log_path.display()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cycle_command() {
        let cli = Cli::try_parse_from([
            "osse",
            "--base-dir",
            "/data/osse",
            "cycle",
            "l95.yaml",
            "2020-01-01T12:00:00Z",
        ])
        .unwrap();
        assert_eq!(cli.base_dir, PathBuf::from("/data/osse"));
        match cli.command {
            Commands::Cycle { config, time } => {
                assert_eq!(config, PathBuf::from("l95.yaml"));
                assert_eq!(time, "2020-01-01T12:00:00Z");
            }
            _ => panic!("expected cycle command"),
        }
    }

    #[test]
    fn test_parse_negative_lead_time() {
        let cli = Cli::try_parse_from(["osse", "leadtime", "encode", "-10800"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Leadtime {
                action: LeadtimeAction::Encode { seconds: -10800 }
            }
        ));
    }

    #[test]
    fn test_jedi_path_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exp.yaml");
        std::fs::write(
            &path,
            r#"
Experiment:
  Name: cli
  Begin: "2020-01-01T00:00:00Z"
  Length: P1D
  Cycle Frequency: PT12H
Assimilation:
  Type: 4dvar
  Algorithm: 4dvar
  Window Begin: PT0S
  Window Length: PT12H
Forecast:
  Length: PT12H
  Frequency: PT6H
Verification:
  Spinup: PT12H
JEDI Path: /opt/jedi
"#,
        )
        .unwrap();

        let config = load_config(&path, Some(Path::new("/usr/local/jedi"))).unwrap();
        assert_eq!(config.jedi_path, PathBuf::from("/usr/local/jedi"));
        assert!(load_config(&dir.path().join("missing.yaml"), None).is_err());
    }
}
