use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::data::container::ContainerFormat;
use crate::data::model::GridOrder;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Everything the headless renderer needs; passed in explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Skip PNG output entirely.
    pub enabled: bool,
    /// Side length of one square panel, in pixels.
    pub panel_size: u32,
    /// Quiver arrows are drawn on every `quiver_step`-th row and column.
    pub quiver_step: usize,
    /// Field-to-grid-unit factor for analysis quivers.
    pub arrow_scale: f64,
    /// Frame colour marking figures built from synthetic data.
    pub synthetic_frame: [u8; 3],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            panel_size: 480,
            quiver_step: 12,
            arrow_scale: 1e-4,
            synthetic_frame: [255, 140, 0],
        }
    }
}

// ---------------------------------------------------------------------------
// External decomposition tool
// ---------------------------------------------------------------------------

/// Command line of the decomposition collaborator.
///
/// `{output_dir}`, `{step}` and `{run}` are substituted in every argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            program: "matlab".to_string(),
            args: vec![
                "-batch".to_string(),
                "cd('{output_dir}'); step2_bemd_processing".to_string(),
            ],
            timeout_secs: 600,
        }
    }
}

impl ToolConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// Pipeline configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Simulation time step to process.
    pub step: u32,
    pub input_dir: PathBuf,
    /// Sample files are `<input_dir>/<input_prefix><step>.csv`.
    pub input_prefix: String,
    pub header_lines: usize,
    pub grid_order: GridOrder,
    pub crop_size: usize,
    pub output_dir: PathBuf,
    /// Prefix of every persisted container.
    pub run_name: String,
    pub container: ContainerFormat,
    pub tool: ToolConfig,
    pub render: RenderConfig,
    pub synthetic_seed: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            step: 1005,
            input_dir: PathBuf::from("../loam1/exy"),
            input_prefix: "exy".to_string(),
            header_lines: 3,
            grid_order: GridOrder::RowMajor,
            crop_size: 560,
            output_dir: PathBuf::from("./output"),
            run_name: "loam1".to_string(),
            container: ContainerFormat::Parquet,
            tool: ToolConfig::default(),
            render: RenderConfig::default(),
            synthetic_seed: 42,
        }
    }
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
        let config: PipelineConfig = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| PipelineError::parse(path, format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .map_err(|e| PipelineError::parse(path, format!("writing config: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        if self.crop_size == 0 {
            return Err(PipelineError::Config("crop_size must be positive".into()));
        }
        if self.render.panel_size < 16 {
            return Err(PipelineError::Config("render.panel_size must be at least 16".into()));
        }
        if self.render.quiver_step == 0 {
            return Err(PipelineError::Config("render.quiver_step must be positive".into()));
        }
        if self.tool.timeout_secs == 0 {
            return Err(PipelineError::Config("tool.timeout_secs must be positive".into()));
        }
        Ok(())
    }

    /// Apply one `key=value` command-line override.
    pub fn apply_override(&mut self, key: &str, value: &str) -> Result<()> {
        fn num<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
            value
                .parse()
                .map_err(|_| PipelineError::Config(format!("{key}={value}: not a valid number")))
        }

        match key {
            "step" => self.step = num(key, value)?,
            "input" | "input_dir" => self.input_dir = PathBuf::from(value),
            "prefix" | "input_prefix" => self.input_prefix = value.to_string(),
            "header" | "header_lines" => self.header_lines = num(key, value)?,
            "order" | "grid_order" => {
                self.grid_order = GridOrder::parse(value).ok_or_else(|| {
                    PipelineError::Config(format!("{key}={value}: expected row-major or column-major"))
                })?
            }
            "crop" | "crop_size" => self.crop_size = num(key, value)?,
            "out" | "output_dir" => self.output_dir = PathBuf::from(value),
            "run" | "run_name" => self.run_name = value.to_string(),
            "format" | "container" => {
                self.container = ContainerFormat::parse(value).ok_or_else(|| {
                    PipelineError::Config(format!("{key}={value}: expected parquet or json"))
                })?
            }
            "tool" => self.tool.program = value.to_string(),
            "timeout" => self.tool.timeout_secs = num(key, value)?,
            "render" => {
                self.render.enabled = match value {
                    "on" | "true" | "1" => true,
                    "off" | "false" | "0" => false,
                    _ => return Err(PipelineError::Config(format!("{key}={value}: expected on/off"))),
                }
            }
            "panel" => self.render.panel_size = num(key, value)?,
            "quiver" => self.render.quiver_step = num(key, value)?,
            "alpha" => self.render.arrow_scale = num(key, value)?,
            "seed" => self.synthetic_seed = num(key, value)?,
            other => return Err(PipelineError::Config(format!("unknown option `{other}`"))),
        }
        Ok(())
    }

    /// Path of the sample CSV for the configured step.
    pub fn input_file(&self) -> PathBuf {
        self.input_dir
            .join(format!("{}{}.csv", self.input_prefix, self.step))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_update_fields() {
        let mut cfg = PipelineConfig::default();
        cfg.apply_override("step", "7").unwrap();
        cfg.apply_override("crop", "64").unwrap();
        cfg.apply_override("order", "column-major").unwrap();
        cfg.apply_override("format", "json").unwrap();
        cfg.apply_override("render", "off").unwrap();
        assert_eq!(cfg.step, 7);
        assert_eq!(cfg.crop_size, 64);
        assert_eq!(cfg.grid_order, GridOrder::ColumnMajor);
        assert_eq!(cfg.container, ContainerFormat::Json);
        assert!(!cfg.render.enabled);
        assert_eq!(cfg.input_file(), PathBuf::from("../loam1/exy/exy7.csv"));
    }

    #[test]
    fn bad_overrides_are_rejected() {
        let mut cfg = PipelineConfig::default();
        assert!(cfg.apply_override("step", "soon").is_err());
        assert!(cfg.apply_override("colour", "red").is_err());
        assert!(cfg.apply_override("order", "diagonal").is_err());
    }

    #[test]
    fn partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{ "step": 12, "tool": { "timeout_secs": 5 } }"#).unwrap();
        let cfg = PipelineConfig::load(&path).unwrap();
        assert_eq!(cfg.step, 12);
        assert_eq!(cfg.tool.timeout_secs, 5);
        assert_eq!(cfg.tool.program, "matlab");
        assert_eq!(cfg.crop_size, 560);
    }

    #[test]
    fn save_then_load_is_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        let mut cfg = PipelineConfig::default();
        cfg.grid_order = GridOrder::ColumnMajor;
        cfg.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn zero_crop_is_invalid() {
        let cfg = PipelineConfig {
            crop_size: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(PipelineError::Config(_))));
    }
}
