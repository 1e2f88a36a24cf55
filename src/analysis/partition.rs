use log::{info, warn};

use super::derived::magnitude;
use crate::data::model::{FieldBundle, Grid, NamedArray};
use crate::error::{PipelineError, Result};

/// Modes consumed by partitioning: first mode, second mode, residual.
pub const REQUIRED_MODES: usize = 3;

// ---------------------------------------------------------------------------
// On-disk mode layouts
// ---------------------------------------------------------------------------

/// How the external tool laid out a mode array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeLayout {
    /// `[row, col, mode]`
    Stacked { rows: usize, cols: usize, modes: usize },
    /// `[row * cols + col, mode]`
    Flattened { pixels: usize, modes: usize },
}

impl ModeLayout {
    /// Resolve the layout from the array rank.
    pub fn detect(shape: &[usize]) -> Option<Self> {
        match *shape {
            [rows, cols, modes] => Some(ModeLayout::Stacked { rows, cols, modes }),
            [pixels, modes] => Some(ModeLayout::Flattened { pixels, modes }),
            _ => None,
        }
    }

    pub fn modes(&self) -> usize {
        match *self {
            ModeLayout::Stacked { modes, .. } | ModeLayout::Flattened { modes, .. } => modes,
        }
    }
}

// ---------------------------------------------------------------------------
// ModeStack – normalised (height, width, mode) view
// ---------------------------------------------------------------------------

/// Ordered mode grids of one component, all `height × width`.
#[derive(Debug, Clone, PartialEq)]
pub struct ModeStack {
    modes: Vec<Grid>,
}

impl ModeStack {
    pub fn new(modes: Vec<Grid>) -> Result<Self> {
        if let Some(first) = modes.first() {
            for m in &modes[1..] {
                first.ensure_same_shape(m, "mode stack")?;
            }
        }
        Ok(ModeStack { modes })
    }

    /// Normalise either on-disk layout to per-mode grids of `rows × cols`.
    ///
    /// Anything that cannot yield at least [`REQUIRED_MODES`] grids of the
    /// expected size counts as missing decomposition data.
    pub fn from_array(array: &NamedArray, rows: usize, cols: usize) -> Result<Self> {
        let layout = ModeLayout::detect(&array.shape).ok_or_else(|| {
            PipelineError::MissingDecompositionData(format!(
                "`{}` has rank {} (shape {:?}); expected (h, w, modes) or (h*w, modes)",
                array.name,
                array.rank(),
                array.shape
            ))
        })?;

        let modes = layout.modes();
        if modes < REQUIRED_MODES {
            return Err(PipelineError::MissingDecompositionData(format!(
                "`{}` holds {modes} modes, at least {REQUIRED_MODES} required",
                array.name
            )));
        }

        let pixels = match layout {
            ModeLayout::Stacked { rows: r, cols: c, .. } => {
                if (r, c) != (rows, cols) {
                    return Err(PipelineError::MissingDecompositionData(format!(
                        "`{}` is {r} x {c}, field is {rows} x {cols}",
                        array.name
                    )));
                }
                r * c
            }
            ModeLayout::Flattened { pixels, .. } => {
                if pixels != rows * cols {
                    return Err(PipelineError::MissingDecompositionData(format!(
                        "`{}` has {pixels} pixels, field is {rows} x {cols} = {}",
                        array.name,
                        rows * cols
                    )));
                }
                pixels
            }
        };
        if array.data.len() != pixels * modes {
            return Err(PipelineError::MissingDecompositionData(format!(
                "`{}` is truncated: {} values for shape {:?}",
                array.name,
                array.data.len(),
                array.shape
            )));
        }

        // Both layouts put the mode index innermost; only the pixel indexing
        // differs, and (row, col) -> row * cols + col matches the flattened form.
        let grids = (0..modes)
            .map(|m| {
                Grid::from_fn(rows, cols, |r, c| array.data[(r * cols + c) * modes + m])
            })
            .collect();
        ModeStack::new(grids)
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }

    pub fn mode(&self, index: usize) -> Option<&Grid> {
        self.modes.get(index)
    }

    fn required(&self, index: usize) -> Result<&Grid> {
        self.mode(index).ok_or_else(|| {
            PipelineError::MissingDecompositionData(format!(
                "mode {index} requested from a stack of {}",
                self.modes.len()
            ))
        })
    }
}

// ---------------------------------------------------------------------------
// Partition – noise band and denoised band
// ---------------------------------------------------------------------------

/// One band of a partition: per-component grids and their RSS magnitude.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub components: [Grid; 3],
    pub magnitude: Grid,
}

impl Band {
    pub fn new(components: [Grid; 3]) -> Result<Self> {
        let [a, b, c] = &components;
        let magnitude = magnitude(&[a, b, c])?;
        Ok(Band {
            components,
            magnitude,
        })
    }

    pub fn is_all_zero(&self) -> bool {
        self.magnitude.is_all_zero()
    }
}

/// Noise (first mode) and denoised (second mode + residual) bands.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub noise: Band,
    pub denoised: Band,
}

/// Outcome of partitioning decomposition output.
#[derive(Debug, Clone, PartialEq)]
pub enum Decomposition {
    Usable(Partition),
    /// Both bands are identically zero: the tool produced nothing useful.
    Degenerate,
}

/// Split per-component mode stacks into noise and denoised bands.
///
/// `stacks` holds V1, V2, V3 in order. Trailing modes beyond the residual are
/// ignored.
pub fn partition(bundle: &FieldBundle, stacks: &[ModeStack; 3]) -> Result<Decomposition> {
    let (rows, cols) = bundle.shape();
    let mut noise = Vec::with_capacity(3);
    let mut denoised = Vec::with_capacity(3);

    for stack in stacks {
        let first = stack.required(0)?;
        if first.shape() != (rows, cols) {
            return Err(PipelineError::shape(
                "mode stack vs field bundle",
                &[rows, cols],
                &[first.rows(), first.cols()],
            ));
        }
        if stack.len() > REQUIRED_MODES {
            info!(
                "ignoring {} trailing mode(s) beyond the residual",
                stack.len() - REQUIRED_MODES
            );
        }
        noise.push(first.clone());
        denoised.push(stack.required(1)?.add(stack.required(2)?)?);
    }

    let noise = Band::new(to_triple(noise)?)?;
    let denoised = Band::new(to_triple(denoised)?)?;

    if let (Some((lo, hi)), Some((dlo, dhi))) = (noise.magnitude.min_max(), denoised.magnitude.min_max()) {
        info!("IMF1 range: [{lo:.2e}, {hi:.2e}]");
        info!("Denoised field range: [{dlo:.2e}, {dhi:.2e}]");
    }

    if noise.is_all_zero() && denoised.is_all_zero() {
        warn!("decomposition output is identically zero");
        return Ok(Decomposition::Degenerate);
    }
    Ok(Decomposition::Usable(Partition { noise, denoised }))
}

fn to_triple(grids: Vec<Grid>) -> Result<[Grid; 3]> {
    let n = grids.len();
    grids
        .try_into()
        .map_err(|_| PipelineError::shape("component triple", &[3], &[n]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
