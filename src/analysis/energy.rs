use serde::Serialize;

use crate::data::model::Grid;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Energy accounting
// ---------------------------------------------------------------------------

/// Sum of squared magnitudes of the original field and both bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EnergySummary {
    pub original: f64,
    pub noise: f64,
    pub denoised: f64,
}

impl EnergySummary {
    pub fn compute(original: &Grid, noise: &Grid, denoised: &Grid) -> Result<Self> {
        original.ensure_same_shape(noise, "noise energy")?;
        original.ensure_same_shape(denoised, "denoised energy")?;
        Ok(EnergySummary {
            original: original.sum_of_squares(),
            noise: noise.sum_of_squares(),
            denoised: denoised.sum_of_squares(),
        })
    }

    /// `part / original × 100`. Fails on a zero original energy instead of
    /// producing NaN or infinity.
    pub fn percent_of_original(&self, part: f64) -> Result<f64> {
        if self.original == 0.0 {
            return Err(PipelineError::ZeroEnergy);
        }
        Ok(part / self.original * 100.0)
    }

    pub fn noise_percent(&self) -> Result<f64> {
        self.percent_of_original(self.noise)
    }

    pub fn denoised_percent(&self) -> Result<f64> {
        self.percent_of_original(self.denoised)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> Grid {
        Grid::from_fn(5, 4, |r, c| 1.0 + (r * 4 + c) as f64 * 0.37)
    }

    #[test]
    fn energy_is_sum_of_squares() {
        let g = Grid::new(1, 3, vec![1.0, 2.0, 3.0]).unwrap();
        let e = EnergySummary::compute(&g, &g, &Grid::zeros(1, 3)).unwrap();
        assert_eq!(e.original, 14.0);
        assert_eq!(e.noise, 14.0);
        assert_eq!(e.denoised, 0.0);
    }

    #[test]
    fn constructed_fractions_are_recovered() {
        // Scaling magnitudes by sqrt(f) scales energy by f.
        let orig = field();
        let noise = orig.scale(0.3f64.sqrt());
        let denoised = orig.scale(0.8f64.sqrt());
        let e = EnergySummary::compute(&orig, &noise, &denoised).unwrap();
        assert!((e.noise_percent().unwrap() - 30.0).abs() < 1e-9);
        assert!((e.denoised_percent().unwrap() - 80.0).abs() < 1e-9);
    }

    #[test]
    fn zero_original_energy_is_reported() {
        let z = Grid::zeros(3, 3);
        let e = EnergySummary::compute(&z, &field().window(0, 0, 3, 3).unwrap(), &z).unwrap();
        assert!(matches!(e.noise_percent(), Err(PipelineError::ZeroEnergy)));
    }

    #[test]
    fn shape_mismatch_is_rejected() {
        let err = EnergySummary::compute(&field(), &Grid::zeros(2, 2), &field()).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }
}
