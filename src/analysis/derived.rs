use std::f64::consts::PI;

use crate::data::model::Grid;
use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// Derived scalar fields
// ---------------------------------------------------------------------------

/// Phase angle of a single (a, b) pair, in (−π, π].
///
/// `atan2` returns −π for a negative real axis approached from below
/// (`b == -0.0`); that value is folded onto +π.
pub fn phase_angle(a: f64, b: f64) -> f64 {
    let phi = b.atan2(a);
    if phi <= -PI {
        PI
    } else {
        phi
    }
}

/// Element-wise phase `atan2(component_b, component_a)`.
pub fn phase(component_a: &Grid, component_b: &Grid) -> Result<Grid> {
    component_a.zip_with(component_b, "phase", phase_angle)
}

/// Root-sum-of-squares across equally shaped grids.
pub fn magnitude(grids: &[&Grid]) -> Result<Grid> {
    let Some(first) = grids.first() else {
        return Err(PipelineError::shape("magnitude", &[1], &[0]));
    };
    let mut acc = first.map(|v| v * v);
    for g in &grids[1..] {
        acc = acc.zip_with(g, "magnitude", |s, v| s + v * v)?;
    }
    Ok(acc.map(f64::sqrt))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn single(v: f64) -> Grid {
        Grid::new(1, 1, vec![v]).unwrap()
    }

    #[test]
    fn phase_of_cardinal_directions() {
        assert_eq!(phase_angle(1.0, 0.0), 0.0);
        assert!((phase_angle(0.0, 1.0) - PI / 2.0).abs() < 1e-15);
        assert_eq!(phase_angle(-1.0, 0.0), PI);
        assert_eq!(phase_angle(-1.0, -0.0), PI);
        assert_eq!(phase_angle(0.0, 0.0), 0.0);
    }

    #[test]
    fn phase_of_grids() {
        let a = Grid::new(1, 3, vec![1.0, 0.0, -1.0]).unwrap();
        let b = Grid::new(1, 3, vec![0.0, 1.0, 0.0]).unwrap();
        let p = phase(&a, &b).unwrap();
        assert_eq!(p.get(0, 0), 0.0);
        assert!((p.get(0, 1) - PI / 2.0).abs() < 1e-15);
        assert_eq!(p.get(0, 2), PI);
    }

    #[test]
    fn phase_rejects_shape_mismatch() {
        let err = phase(&Grid::zeros(2, 2), &Grid::zeros(2, 3)).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }

    #[test]
    fn magnitude_is_root_sum_of_squares() {
        let m = magnitude(&[&single(3.0), &single(4.0), &single(12.0)]).unwrap();
        assert_eq!(m.get(0, 0), 13.0);
    }

    proptest! {
        #[test]
        fn phase_stays_in_half_open_interval(a in -1e6f64..1e6, b in -1e6f64..1e6) {
            let phi = phase_angle(a, b);
            prop_assert!(phi > -PI && phi <= PI);
        }
    }
}
