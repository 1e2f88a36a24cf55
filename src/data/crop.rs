use log::info;

use super::model::{FieldBundle, Grid};
use crate::error::Result;

// ---------------------------------------------------------------------------
// Centered cropping
// ---------------------------------------------------------------------------

/// Start index and length of a centered window of at most `crop` cells on an
/// axis of `len` cells.
pub fn centered_span(len: usize, crop: usize) -> (usize, usize) {
    if len > crop {
        ((len - crop) / 2, crop)
    } else {
        (0, len)
    }
}

pub fn crop_grid(grid: &Grid, crop: usize) -> Result<Grid> {
    let (r0, h) = centered_span(grid.rows(), crop);
    let (c0, w) = centered_span(grid.cols(), crop);
    grid.window(r0, c0, h, w)
}

/// Crop every grid of the bundle to the same centered window.
///
/// No-op when both dimensions already fit within `crop`.
pub fn crop_bundle(bundle: &FieldBundle, crop: usize) -> Result<FieldBundle> {
    let (rows, cols) = bundle.shape();
    if rows <= crop && cols <= crop {
        return Ok(bundle.clone());
    }
    let cropped = bundle.map_grids(|g| crop_grid(g, crop))?;
    let (h, w) = cropped.shape();
    info!("After cropping: {h} x {w} (from {rows} x {cols})");
    Ok(cropped)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn indexed(rows: usize, cols: usize) -> Grid {
        Grid::from_fn(rows, cols, |r, c| (r * 1000 + c) as f64)
    }

    fn bundle(rows: usize, cols: usize) -> FieldBundle {
        FieldBundle::new(
            indexed(rows, cols),
            indexed(rows, cols),
            indexed(rows, cols).scale(2.0),
            indexed(rows, cols).scale(3.0),
        )
        .unwrap()
    }

    #[test]
    fn crop_is_noop_when_grid_fits() {
        let b = bundle(4, 4);
        assert_eq!(crop_bundle(&b, 4).unwrap(), b);
        assert_eq!(crop_bundle(&b, 10).unwrap(), b);
    }

    #[test]
    fn crop_takes_center_window() {
        let cropped = crop_bundle(&bundle(10, 7), 4).unwrap();
        assert_eq!(cropped.shape(), (4, 4));
        // rows start at (10-4)/2 = 3, cols at (7-4)/2 = 1
        assert_eq!(cropped.v1.get(0, 0), 3001.0);
        assert_eq!(cropped.v3.get(3, 3), 3.0 * 6004.0);
    }

    #[test]
    fn only_the_oversized_axis_is_cropped() {
        let cropped = crop_bundle(&bundle(3, 9), 5).unwrap();
        assert_eq!(cropped.shape(), (3, 5));
        assert_eq!(cropped.intensity.get(0, 0), 2.0);
    }

    proptest! {
        #[test]
        fn crop_is_centered(rows in 1usize..40, cols in 1usize..40, crop in 1usize..40) {
            let cropped = crop_grid(&indexed(rows, cols), crop).unwrap();
            prop_assert_eq!(cropped.shape(), (rows.min(crop), cols.min(crop)));

            let (r0, h) = centered_span(rows, crop);
            let (c0, w) = centered_span(cols, crop);
            let top = r0 as i64;
            let bottom = (rows - r0 - h) as i64;
            let left = c0 as i64;
            let right = (cols - c0 - w) as i64;
            prop_assert!((top - bottom).abs() <= 1);
            prop_assert!((left - right).abs() <= 1);
            prop_assert_eq!(cropped.get(0, 0), (r0 * 1000 + c0) as f64);
        }

        #[test]
        fn crop_is_idempotent(rows in 1usize..30, cols in 1usize..30, crop in 1usize..30) {
            let once = crop_grid(&indexed(rows, cols), crop).unwrap();
            let twice = crop_grid(&once, crop).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
