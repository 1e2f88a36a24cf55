use std::path::PathBuf;

use log::{info, warn};

use super::{ensure_dir, Artifacts};
use crate::analysis::derived::phase;
use crate::config::PipelineConfig;
use crate::data::container::save_array;
use crate::data::crop::crop_bundle;
use crate::data::loader::load_bundle;
use crate::data::model::{FieldBundle, NamedArray, Quantity};
use crate::error::Result;
use crate::render::render_overview;
use crate::summary::sci;

/// Stage 1: sample CSV → cropped field bundle → one container per quantity.
pub fn run(config: &PipelineConfig) -> Result<Vec<PathBuf>> {
    let artifacts = Artifacts::new(config);
    ensure_dir(artifacts.dir())?;

    info!("Processing step {}", config.step);
    let bundle = load_bundle(&config.input_file(), config.header_lines, config.grid_order)?;
    let bundle = crop_bundle(&bundle, config.crop_size)?;

    if let Some((lo, hi)) = bundle.intensity.min_max() {
        info!("E intensity range: [{}, {}]", sci(lo), sci(hi));
    }

    let mut files = Vec::new();
    if config.render.enabled {
        let phase = phase(&bundle.v1, &bundle.v2)?;
        let path = artifacts.overview_png();
        render_overview(&path, &bundle, &phase, &config.render)?;
        files.push(path);
    } else {
        warn!("rendering disabled; skipping overview figure");
    }

    files.extend(persist_bundle(&bundle, &artifacts)?);
    let (h, w) = bundle.shape();
    info!("Data shape: (1, {h}, {w})");
    Ok(files)
}

/// Write each quantity as a `(1, height, width)` array.
pub fn persist_bundle(bundle: &FieldBundle, artifacts: &Artifacts) -> Result<Vec<PathBuf>> {
    Quantity::ALL
        .iter()
        .map(|&q| {
            let path = artifacts.field(q);
            save_array(&path, &NamedArray::from_grid(q.field_variable(), bundle.grid(q)))?;
            info!("- {}: {} component", super::file_name(&path), q);
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::container::load_named;

    #[test]
    fn ingest_writes_cropped_containers() {
        let dir = tempfile::tempdir().unwrap();
        let mut csv = String::from("meta\nmeta\nX,Y,ex,ey,ez\n");
        for i in 0..6 {
            for j in 0..5 {
                csv.push_str(&format!("{i},{j},{},{},0.5\n", i + j, i * j));
            }
        }
        std::fs::write(dir.path().join("exy7.csv"), csv).unwrap();

        let config = PipelineConfig {
            step: 7,
            input_dir: dir.path().to_path_buf(),
            output_dir: dir.path().join("out"),
            crop_size: 4,
            render: crate::config::RenderConfig {
                panel_size: 64,
                ..Default::default()
            },
            ..PipelineConfig::default()
        };
        let files = run(&config).unwrap();
        assert_eq!(files.len(), 5);

        let artifacts = Artifacts::new(&config);
        let v1 = load_named(&artifacts.field(Quantity::V1), "dataV1").unwrap();
        assert_eq!(v1.shape, vec![1, 4, 4]);
        // rows start at (6-4)/2 = 1, columns at (5-4)/2 = 0
        assert_eq!(v1.data[0], 1.0);
        let e = load_named(&artifacts.field(Quantity::Intensity), "dataE").unwrap();
        assert_eq!(e.shape, vec![1, 4, 4]);
        assert!(artifacts.overview_png().exists());
    }
}
