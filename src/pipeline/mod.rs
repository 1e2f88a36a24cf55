/// The three batch stages and the driver that chains them.
///
/// ```text
///   ingest      exy<step>.csv ──► <run>{E,V1,V2,V3}<step>.<ext>  + overview PNG
///   decompose   external tool ──► <run>data_BIMF0_{E,V1,V2,V3}.<ext>
///   report      both of the above ──► analysis PNG + summary .txt/.json
/// ```
///
/// Stages share nothing but the output directory.

pub mod decompose;
pub mod ingest;
pub mod report;

use std::fmt;
use std::path::{Path, PathBuf};

use log::{error, info};

use crate::config::PipelineConfig;
use crate::data::model::Quantity;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Artifact naming
// ---------------------------------------------------------------------------

/// File names of everything the stages read and write for one step.
#[derive(Debug, Clone)]
pub struct Artifacts {
    dir: PathBuf,
    run: String,
    step: u32,
    ext: &'static str,
}

impl Artifacts {
    pub fn new(config: &PipelineConfig) -> Self {
        Artifacts {
            dir: config.output_dir.clone(),
            run: config.run_name.clone(),
            step: config.step,
            ext: config.container.extension(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Stage-1 container for one quantity, e.g. `loam1V21005.parquet`.
    pub fn field(&self, q: Quantity) -> PathBuf {
        self.dir
            .join(format!("{}{}{}.{}", self.run, q.tag(), self.step, self.ext))
    }

    /// Decomposition output for one quantity.
    pub fn modes(&self, q: Quantity) -> PathBuf {
        self.dir
            .join(format!("{}data_BIMF0_{}.{}", self.run, q.tag(), self.ext))
    }

    pub fn overview_png(&self) -> PathBuf {
        self.dir.join(format!("processed_data_{}.png", self.step))
    }

    pub fn analysis_png(&self) -> PathBuf {
        self.dir.join(format!("bemd_analysis_{}.png", self.step))
    }

    pub fn summary_txt(&self) -> PathBuf {
        self.dir.join(format!("bemd_analysis_summary_{}.txt", self.step))
    }

    pub fn summary_json(&self) -> PathBuf {
        self.dir.join(format!("bemd_analysis_summary_{}.json", self.step))
    }

    pub fn tool_log(&self, stream: &str) -> PathBuf {
        self.dir.join(format!("bemd_tool_{}.{stream}.log", self.step))
    }

    pub fn config_json(&self) -> PathBuf {
        self.dir.join("pipeline_config.json")
    }
}

pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| PipelineError::io(dir, e))
}

/// File name (without directory) for listings.
pub(crate) fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

// ---------------------------------------------------------------------------
// Stages and driver
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Ingest,
    Decompose,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Ingest, Stage::Decompose, Stage::Report];

    pub fn number(self) -> usize {
        match self {
            Stage::Ingest => 1,
            Stage::Decompose => 2,
            Stage::Report => 3,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ingest" | "step1" => Some(Stage::Ingest),
            "decompose" | "bemd" | "step2" => Some(Stage::Decompose),
            "report" | "visualize" | "step3" => Some(Stage::Report),
            _ => None,
        }
    }

    /// Execute this stage, returning the files it produced.
    pub fn run(self, config: &PipelineConfig) -> Result<Vec<PathBuf>> {
        match self {
            Stage::Ingest => ingest::run(config),
            Stage::Decompose => decompose::run(config),
            Stage::Report => report::run(config).map(|outcome| outcome.files),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Ingest => "Data Processing",
            Stage::Decompose => "BEMD Processing",
            Stage::Report => "Visualization",
        };
        write!(f, "{name}")
    }
}

/// Run `stages` in order; the first failure stops the pipeline.
pub fn run_stages(config: &PipelineConfig, stages: &[Stage]) -> Result<Vec<PathBuf>> {
    let mut produced = Vec::new();
    for &stage in stages {
        info!("{}", "=".repeat(60));
        info!("Step {}: {stage}", stage.number());
        info!("{}", "=".repeat(60));
        match stage.run(config) {
            Ok(files) => {
                info!("Step {} completed successfully", stage.number());
                produced.extend(files);
            }
            Err(e) => {
                error!("Step {} failed: {e}. Stopping execution.", stage.number());
                return Err(e);
            }
        }
    }
    Ok(produced)
}

/// Full three-stage run, recording the effective configuration first.
pub fn run_all(config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    config.validate()?;
    let artifacts = Artifacts::new(config);
    ensure_dir(artifacts.dir())?;
    config.save(&artifacts.config_json())?;
    let mut files = vec![artifacts.config_json()];
    files.extend(run_stages(config, &Stage::ALL)?);
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_names_follow_run_and_step() {
        let cfg = PipelineConfig {
            output_dir: PathBuf::from("out"),
            ..PipelineConfig::default()
        };
        let a = Artifacts::new(&cfg);
        assert_eq!(a.field(Quantity::V2), PathBuf::from("out/loam1V21005.parquet"));
        assert_eq!(a.modes(Quantity::V3), PathBuf::from("out/loam1data_BIMF0_V3.parquet"));
        assert_eq!(a.summary_txt(), PathBuf::from("out/bemd_analysis_summary_1005.txt"));
    }

    #[test]
    fn stage_names_parse() {
        assert_eq!(Stage::parse("ingest"), Some(Stage::Ingest));
        assert_eq!(Stage::parse("step2"), Some(Stage::Decompose));
        assert_eq!(Stage::parse("plot"), None);
    }

    #[test]
    fn failing_stage_stops_the_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            input_dir: dir.path().join("missing"),
            output_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let err = run_all(&cfg).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        // decomposition and report never ran
        assert!(!Artifacts::new(&cfg).summary_txt().exists());
    }
}
