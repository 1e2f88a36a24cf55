//! Clearly-labelled stand-in bands for when the decomposition is unusable.
//!
//! Nothing here is physically meaningful. The bands are shaped so the figure
//! and summary still render: a narrow gaussian-weighted random noise band and
//! a broad, angularly modulated "vortex" band.

use rand::prelude::*;
use rand_distr::Normal;

use super::partition::{Band, Partition};
use crate::data::model::{FieldBundle, Grid};
use crate::error::{PipelineError, Result};

const NOISE_WEIGHT: f64 = 0.3;
const NOISE_WIDTH: f64 = 0.1;
const NOISE_STD: f64 = 0.5;
const SIGNAL_WEIGHT: f64 = 0.8;
const SIGNAL_WIDTH: f64 = 0.5;
const ANGULAR_DEPTH: f64 = 0.3;

/// `n` evenly spaced points from −1 to 1 inclusive.
fn linspace_unit(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![-1.0],
        _ => (0..n)
            .map(|i| -1.0 + 2.0 * i as f64 / (n - 1) as f64)
            .collect(),
    }
}

/// Deterministically derive fallback noise/denoised bands from the original
/// field.
///
/// `total` is the original magnitude field; it must match the bundle shape.
pub fn synthesize(bundle: &FieldBundle, total: &Grid, seed: u64) -> Result<Partition> {
    bundle.intensity.ensure_same_shape(total, "synthetic fallback")?;
    let (rows, cols) = bundle.shape();
    let xs = linspace_unit(cols);
    let ys = linspace_unit(rows);

    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, NOISE_STD)
        .map_err(|e| PipelineError::Config(format!("noise distribution: {e}")))?;

    let noise_magnitude = Grid::from_fn(rows, cols, |r, c| {
        let r2 = xs[c] * xs[c] + ys[r] * ys[r];
        let z: f64 = normal.sample(&mut rng);
        (total.get(r, c) * NOISE_WEIGHT * (-r2 / NOISE_WIDTH).exp() * z).abs()
    });
    let denoised_magnitude = Grid::from_fn(rows, cols, |r, c| {
        let (x, y) = (xs[c], ys[r]);
        let r2 = x * x + y * y;
        let theta = y.atan2(x);
        total.get(r, c) * SIGNAL_WEIGHT * (-r2 / SIGNAL_WIDTH).exp() * (1.0 + ANGULAR_DEPTH * theta.sin())
    });

    let [v1, v2, v3] = bundle.components();
    Ok(Partition {
        noise: Band {
            components: [v1.scale(NOISE_WEIGHT), v2.scale(NOISE_WEIGHT), v3.scale(NOISE_WEIGHT)],
            magnitude: noise_magnitude,
        },
        denoised: Band {
            components: [v1.scale(SIGNAL_WEIGHT), v2.scale(SIGNAL_WEIGHT), v3.scale(SIGNAL_WEIGHT)],
            magnitude: denoised_magnitude,
        },
    })
}
