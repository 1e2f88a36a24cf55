// Driver for the optical vortex BEMD pipeline.
//
// Examples:
//
//   vortex-bemd run input=../loam1/exy step=1005 out=./output
//       -> ingest exy1005.csv, run the decomposition tool, write the report.
//
//   vortex-bemd report config=pipeline.json render=off
//       -> rebuild the summary from existing stage-1/stage-2 outputs.
//
//   vortex-bemd run tool=./bemd_stub timeout=60 format=json
//
// Outputs (per output directory):
//   processed_data_<step>.png, <run>{E,V1,V2,V3}<step>.<ext>,
//   bemd_tool_<step>.{stdout,stderr}.log,
//   bemd_analysis_<step>.png, bemd_analysis_summary_<step>.{txt,json}

use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use log::{error, info};

use vortex_bemd::pipeline::{self, Stage};
use vortex_bemd::PipelineConfig;

fn print_usage() {
    eprintln!(
        r#"Usage:
  vortex-bemd <run|ingest|decompose|report|print-config> [config=FILE] [key=value ...]

Options (key=value):
  step=N            time step (default 1005)
  input=DIR         directory holding <prefix><step>.csv
  prefix=STR        sample file prefix (default exy)
  header=N          metadata lines to skip (default 3)
  order=row-major|column-major
  crop=N            centered crop size (default 560)
  out=DIR           output directory (default ./output)
  run=STR           container prefix (default loam1)
  format=parquet|json
  tool=PROGRAM      decomposition program (default matlab)
  timeout=SECS      decomposition timeout (default 600)
  render=on|off     PNG figures
  panel=PX  quiver=N  alpha=VAL  seed=N
"#
    );
}

fn parse_args(args: &[String]) -> Result<(String, PipelineConfig)> {
    let Some(command) = args.first() else {
        bail!("missing command");
    };

    let mut overrides = Vec::new();
    let mut config_path: Option<PathBuf> = None;
    for arg in &args[1..] {
        let Some((key, value)) = arg.split_once('=') else {
            bail!("expected key=value, got `{arg}`");
        };
        if key == "config" {
            config_path = Some(PathBuf::from(value));
        } else {
            overrides.push((key, value));
        }
    }

    let mut config = match &config_path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    for (key, value) in overrides {
        config.apply_override(key, value)?;
    }
    config.validate()?;
    Ok((command.clone(), config))
}

fn execute(command: &str, config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let files = match command {
        "run" => pipeline::run_all(config)?,
        "print-config" => {
            println!("{}", serde_json::to_string_pretty(config)?);
            Vec::new()
        }
        other => match Stage::parse(other) {
            Some(stage) => pipeline::run_stages(config, &[stage])?,
            None => bail!("unknown command `{other}`"),
        },
    };
    Ok(files)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().skip(1).collect();
    let (command, config) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            error!("{e:#}");
            print_usage();
            return ExitCode::from(2);
        }
    };

    match execute(&command, &config) {
        Ok(files) => {
            if !files.is_empty() {
                info!("Generated files in {}:", config.output_dir.display());
                for f in &files {
                    info!("- {}", f.display());
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
