use std::path::PathBuf;

use log::{debug, info, warn};

use super::{ensure_dir, file_name, Artifacts};
use crate::analysis::partition::{partition, Decomposition, ModeStack, Partition};
use crate::analysis::synthetic::synthesize;
use crate::config::PipelineConfig;
use crate::data::container::{load_array, load_named};
use crate::data::model::{FieldBundle, Grid, Quantity};
use crate::error::{PipelineError, Result};
use crate::render::render_analysis;
use crate::summary::{DataSource, SummaryRecord};

// ---------------------------------------------------------------------------
// Partition source
// ---------------------------------------------------------------------------

/// The bands the report is built from, tagged with their provenance.
#[derive(Debug, Clone, PartialEq)]
pub enum PartitionSource {
    Real(Partition),
    Synthetic(Partition),
}

impl PartitionSource {
    pub fn partition(&self) -> &Partition {
        match self {
            PartitionSource::Real(p) | PartitionSource::Synthetic(p) => p,
        }
    }

    pub fn data_source(&self) -> DataSource {
        match self {
            PartitionSource::Real(_) => DataSource::Real,
            PartitionSource::Synthetic(_) => DataSource::Synthetic,
        }
    }
}

/// Turn a decomposition load attempt into a partition source.
///
/// Degenerate output and missing decomposition data fall back to synthetic
/// bands; every other error is passed through.
pub fn resolve_partition(
    bundle: &FieldBundle,
    total: &Grid,
    loaded: Result<Decomposition>,
    seed: u64,
) -> Result<PartitionSource> {
    match loaded {
        Ok(Decomposition::Usable(p)) => Ok(PartitionSource::Real(p)),
        Ok(Decomposition::Degenerate) => {
            warn!("BEMD results are zero, creating synthetic demonstration...");
            Ok(PartitionSource::Synthetic(synthesize(bundle, total, seed)?))
        }
        Err(e) if e.is_missing_decomposition() => {
            warn!("{e}");
            warn!("Generating synthetic IMF data for demonstration...");
            Ok(PartitionSource::Synthetic(synthesize(bundle, total, seed)?))
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Reload the stage-1 bundle. Any failure here aborts the stage.
pub fn load_original(artifacts: &Artifacts) -> Result<FieldBundle> {
    let mut grids = Vec::with_capacity(4);
    for q in Quantity::ALL {
        let array = load_named(&artifacts.field(q), q.field_variable())?;
        debug!("{} shape: {:?}", q.field_variable(), array.shape);
        grids.push(array.first_slice()?);
    }
    let mut grids = grids.into_iter();
    match (grids.next(), grids.next(), grids.next(), grids.next()) {
        (Some(e), Some(v1), Some(v2), Some(v3)) => FieldBundle::new(e, v1, v2, v3),
        _ => Err(PipelineError::shape("original bundle", &[4], &[0])),
    }
}

/// Load and partition the V1–V3 decomposition outputs.
///
/// Unreadable or malformed files surface as missing decomposition data.
pub fn load_decomposition(artifacts: &Artifacts, bundle: &FieldBundle) -> Result<Decomposition> {
    let (rows, cols) = bundle.shape();

    let intensity_modes = artifacts.modes(Quantity::Intensity);
    if intensity_modes.is_file() {
        match load_array(&intensity_modes) {
            Ok(a) => info!("BEMD data shape: {:?}", a.shape),
            Err(e) => debug!("ignoring intensity decomposition: {e}"),
        }
    }

    let mut stacks = Vec::with_capacity(3);
    for q in Quantity::COMPONENTS {
        let path = artifacts.modes(q);
        let array = load_named(&path, q.mode_variable()).map_err(|e| match e {
            PipelineError::MissingDecompositionData(_) => e,
            other => PipelineError::MissingDecompositionData(other.to_string()),
        })?;
        stacks.push(ModeStack::from_array(&array, rows, cols)?);
    }
    let stacks: [ModeStack; 3] = stacks
        .try_into()
        .map_err(|_| PipelineError::MissingDecompositionData("component stacks incomplete".into()))?;
    partition(bundle, &stacks)
}

// ---------------------------------------------------------------------------
// Stage entry-point
// ---------------------------------------------------------------------------

/// Result of the reporting stage.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub summary: SummaryRecord,
    pub files: Vec<PathBuf>,
}

/// Stage 3: reload, partition (or fall back), render and summarise.
pub fn run(config: &PipelineConfig) -> Result<ReportOutcome> {
    let artifacts = Artifacts::new(config);
    ensure_dir(artifacts.dir())?;

    info!("Loading original data...");
    let bundle = load_original(&artifacts)?;
    let total = bundle.total_field()?;
    let (height, width) = bundle.shape();
    info!("Field dimensions: {height} x {width}");

    info!("Loading BEMD results...");
    let source = resolve_partition(
        &bundle,
        &total,
        load_decomposition(&artifacts, &bundle),
        config.synthetic_seed,
    )?;
    let bands = source.partition();

    let mut files = Vec::new();
    if config.render.enabled {
        let png = artifacts.analysis_png();
        render_analysis(
            &png,
            &total,
            &bundle,
            bands,
            source.data_source() == DataSource::Synthetic,
            &config.render,
        )?;
        files.push(png);
    }

    let mut summary = SummaryRecord::build(
        config.step,
        &total,
        &bands.noise.magnitude,
        &bands.denoised.magnitude,
        source.data_source(),
    )?;
    let txt = artifacts.summary_txt();
    let json = artifacts.summary_json();
    files.push(txt.clone());
    files.push(json.clone());
    summary.generated_files = files.iter().map(|p| file_name(p)).collect();

    summary.write_text(&txt)?;
    summary.write_json(&json)?;
    info!("Analysis summary saved: {}", file_name(&txt));

    match source {
        PartitionSource::Real(_) => info!("Successfully processed real BEMD results"),
        PartitionSource::Synthetic(_) => warn!("Using synthetic demonstration data"),
    }
    Ok(ReportOutcome { summary, files })
}
