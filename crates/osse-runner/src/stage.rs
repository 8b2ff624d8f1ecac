//! Preparing a derived stage for execution.

use std::path::{Path, PathBuf};

use osse_core::{write_yaml, ExperimentLayout, StageConfig, StageId, Template};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RunError};

/// A stage whose configuration has been rendered to disk and whose
/// directories and inputs are in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub stage: StageId,

    /// Absolute path of the program to launch.
    pub executable: PathBuf,

    /// Rendered configuration, passed as the only argument.
    pub config_path: PathBuf,

    /// Receives the program's stdout.
    pub log_path: PathBuf,

    pub output_dir: PathBuf,
}

impl Invocation {
    /// Render the stage template, write it out, create the output and log
    /// directories and perform any staged copy.
    pub fn prepare(stage: &dyn StageConfig, layout: &ExperimentLayout) -> Result<Self> {
        let id = stage.stage();
        let template = Template::load(stage.template_path())?;
        let rendered = template.render(&stage.overlay())?;
        write_yaml(stage.config_path(), &rendered)?;
        debug!(stage = %id, config = %stage.config_path().display(), "rendered stage config");

        create_dir(stage.output_dir())?;
        if let Some(parent) = stage.log_path().parent() {
            create_dir(parent)?;
        }

        if let Some(copy) = stage.staged_copy() {
            if let Some(parent) = copy.to.parent() {
                create_dir(parent)?;
            }
            std::fs::copy(&copy.from, &copy.to).map_err(|source| RunError::Io {
                path: copy.from.clone(),
                source,
            })?;
            debug!(
                stage = %id,
                from = %copy.from.display(),
                to = %copy.to.display(),
                "staged initial state"
            );
        }

        Ok(Self {
            stage: id,
            executable: layout.executable(stage.executable()),
            config_path: stage.config_path().to_path_buf(),
            log_path: stage.log_path().to_path_buf(),
            output_dir: stage.output_dir().to_path_buf(),
        })
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|source| RunError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Remove `path` and everything below it. A missing directory is not an error.
pub(crate) fn clear_dir(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(RunError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osse_core::{Arm, ExperimentConfig, StageDeriver, Workspace};

    const CONFIG: &str = r#"
Experiment:
  Name: prep
  Begin: "2020-01-01T00:00:00Z"
  Length: P1D
  Cycle Frequency: PT12H
Assimilation:
  Type: 3dvar
  Algorithm: 3dvar
  Window Begin: MT3H
  Window Length: PT6H
Forecast:
  Length: PT12H
  Frequency: PT6H
Verification:
  Spinup: PT0S
JEDI Path: /opt/jedi
"#;

    fn setup() -> (tempfile::TempDir, ExperimentConfig, ExperimentLayout) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path());
        std::fs::create_dir_all(workspace.template_dir()).unwrap();
        std::fs::write(
            workspace.template_dir().join("forecast.yaml"),
            "forecast_length: PT0S\ninitial:\n  filename: none\noutput:\n  datadir: none\n",
        )
        .unwrap();
        let config = ExperimentConfig::from_yaml(CONFIG).unwrap();
        let layout = ExperimentLayout::new(&workspace, &config);
        (dir, config, layout)
    }

    #[test]
    fn test_prepare_writes_rendered_config() {
        let (_dir, config, layout) = setup();
        let stage = StageDeriver::new(&config, &layout).forecast(&config.begin(), Arm::On);
        let inv = Invocation::prepare(&stage, &layout).unwrap();

        assert_eq!(inv.executable, PathBuf::from("/opt/jedi/bin/l95_forecast.x"));
        assert!(inv.output_dir.is_dir());
        let text = std::fs::read_to_string(&inv.config_path).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
        assert_eq!(doc["forecast_length"].as_str(), Some("PT12H"));
    }

    #[test]
    fn test_prepare_copies_off_arm_initial_state() {
        let (_dir, config, layout) = setup();
        let deriver = StageDeriver::new(&config, &layout);
        let second = deriver.schedule().end;
        let stage = deriver.forecast(&second, Arm::Off);
        let copy = stage.staged.clone().unwrap();
        std::fs::create_dir_all(copy.from.parent().unwrap()).unwrap();
        std::fs::write(&copy.from, "40\nheader\n1.0 2.0\n").unwrap();

        Invocation::prepare(&stage, &layout).unwrap();
        assert_eq!(
            std::fs::read_to_string(&copy.to).unwrap(),
            "40\nheader\n1.0 2.0\n"
        );
    }

    #[test]
    fn test_missing_staged_source_is_an_error() {
        let (_dir, config, layout) = setup();
        let deriver = StageDeriver::new(&config, &layout);
        let stage = deriver.forecast(&deriver.schedule().end, Arm::Off);
        assert!(matches!(
            Invocation::prepare(&stage, &layout),
            Err(RunError::Io { .. })
        ));
    }

    #[test]
    fn test_missing_template_is_an_error() {
        let (_dir, config, layout) = setup();
        let stage = StageDeriver::new(&config, &layout).truth();
        assert!(matches!(
            Invocation::prepare(&stage, &layout),
            Err(RunError::Core(_))
        ));
    }
}
