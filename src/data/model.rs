use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ---------------------------------------------------------------------------
// GridOrder – how a flat sample list maps onto (row, col)
// ---------------------------------------------------------------------------

/// Iteration order of a flattened grid.
///
/// `RowMajor` means the column index varies fastest, i.e. the file walks every
/// y for the first x before moving to the next x.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridOrder {
    #[default]
    RowMajor,
    ColumnMajor,
}

impl GridOrder {
    /// Grid cell holding flat element `k` of a `rows × cols` grid.
    pub fn cell(self, k: usize, rows: usize, cols: usize) -> (usize, usize) {
        match self {
            GridOrder::RowMajor => (k / cols, k % cols),
            GridOrder::ColumnMajor => (k % rows, k / rows),
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "row-major" | "row" | "c" => Some(Self::RowMajor),
            "column-major" | "col-major" | "column" | "f" => Some(Self::ColumnMajor),
            _ => None,
        }
    }
}

impl fmt::Display for GridOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GridOrder::RowMajor => write!(f, "row-major"),
            GridOrder::ColumnMajor => write!(f, "column-major"),
        }
    }
}

// ---------------------------------------------------------------------------
// Grid – a dense 2-D array of scalars
// ---------------------------------------------------------------------------

/// A `rows × cols` scalar grid stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid {
    /// Wrap row-major data. Fails when `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if data.len() != rows * cols {
            return Err(PipelineError::shape(
                "grid construction",
                &[rows * cols],
                &[data.len()],
            ));
        }
        Ok(Grid { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Grid {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for r in 0..rows {
            for c in 0..cols {
                data.push(f(r, c));
            }
        }
        Grid { rows, cols, data }
    }

    /// Reshape a flat value list into a grid following `order`.
    pub fn from_flat(values: &[f64], rows: usize, cols: usize, order: GridOrder) -> Result<Self> {
        if values.len() != rows * cols {
            return Err(PipelineError::shape(
                format!("{order} reshape"),
                &[rows, cols],
                &[values.len()],
            ));
        }
        let mut data = vec![0.0; rows * cols];
        for (k, &v) in values.iter().enumerate() {
            let (r, c) = order.cell(k, rows, cols);
            data[r * cols + c] = v;
        }
        Ok(Grid { rows, cols, data })
    }

    /// Inverse of [`Grid::from_flat`].
    pub fn flatten(&self, order: GridOrder) -> Vec<f64> {
        (0..self.data.len())
            .map(|k| {
                let (r, c) = order.cell(k, self.rows, self.cols);
                self.get(r, c)
            })
            .collect()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Row-major backing slice.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    pub fn map(&self, f: impl Fn(f64) -> f64) -> Grid {
        Grid {
            rows: self.rows,
            cols: self.cols,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    pub fn scale(&self, factor: f64) -> Grid {
        self.map(|v| v * factor)
    }

    /// Element-wise combination of two equally shaped grids.
    pub fn zip_with(&self, other: &Grid, context: &str, f: impl Fn(f64, f64) -> f64) -> Result<Grid> {
        self.ensure_same_shape(other, context)?;
        Ok(Grid {
            rows: self.rows,
            cols: self.cols,
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| f(a, b))
                .collect(),
        })
    }

    pub fn add(&self, other: &Grid) -> Result<Grid> {
        self.zip_with(other, "grid addition", |a, b| a + b)
    }

    pub fn ensure_same_shape(&self, other: &Grid, context: &str) -> Result<()> {
        if self.shape() != other.shape() {
            return Err(PipelineError::shape(
                context,
                &[self.rows, self.cols],
                &[other.rows, other.cols],
            ));
        }
        Ok(())
    }

    /// Copy of the `height × width` block starting at (`row0`, `col0`).
    pub fn window(&self, row0: usize, col0: usize, height: usize, width: usize) -> Result<Grid> {
        if row0 + height > self.rows || col0 + width > self.cols {
            return Err(PipelineError::shape(
                "grid window",
                &[self.rows, self.cols],
                &[row0 + height, col0 + width],
            ));
        }
        Ok(Grid::from_fn(height, width, |r, c| self.get(row0 + r, col0 + c)))
    }

    /// Every `step`-th row and column, starting at the origin.
    pub fn subsample(&self, step: usize) -> Vec<(usize, usize, f64)> {
        let step = step.max(1);
        let mut out = Vec::new();
        for r in (0..self.rows).step_by(step) {
            for c in (0..self.cols).step_by(step) {
                out.push((r, c, self.get(r, c)));
            }
        }
        out
    }

    /// Minimum and maximum over finite cells, `None` if there are none.
    pub fn min_max(&self) -> Option<(f64, f64)> {
        self.data
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    pub fn sum_of_squares(&self) -> f64 {
        self.data.iter().map(|v| v * v).sum()
    }

    pub fn is_all_zero(&self) -> bool {
        self.data.iter().all(|&v| v == 0.0)
    }
}

// ---------------------------------------------------------------------------
// FieldBundle – co-registered grids for one time step
// ---------------------------------------------------------------------------

/// Intensity plus the three field components of one time step, all the same
/// shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldBundle {
    pub intensity: Grid,
    pub v1: Grid,
    pub v2: Grid,
    pub v3: Grid,
}

impl FieldBundle {
    pub fn new(intensity: Grid, v1: Grid, v2: Grid, v3: Grid) -> Result<Self> {
        intensity.ensure_same_shape(&v1, "field bundle V1")?;
        intensity.ensure_same_shape(&v2, "field bundle V2")?;
        intensity.ensure_same_shape(&v3, "field bundle V3")?;
        Ok(FieldBundle {
            intensity,
            v1,
            v2,
            v3,
        })
    }

    /// Build a bundle from the three components, deriving the intensity.
    pub fn from_components(v1: Grid, v2: Grid, v3: Grid) -> Result<Self> {
        let intensity = crate::analysis::derived::magnitude(&[&v1, &v2, &v3])?;
        FieldBundle::new(intensity, v1, v2, v3)
    }

    /// (height, width).
    pub fn shape(&self) -> (usize, usize) {
        self.intensity.shape()
    }

    pub fn components(&self) -> [&Grid; 3] {
        [&self.v1, &self.v2, &self.v3]
    }

    /// Root-sum-of-squares over intensity and all three components.
    pub fn total_field(&self) -> Result<Grid> {
        crate::analysis::derived::magnitude(&[&self.intensity, &self.v1, &self.v2, &self.v3])
    }

    pub fn map_grids(&self, mut f: impl FnMut(&Grid) -> Result<Grid>) -> Result<FieldBundle> {
        FieldBundle::new(f(&self.intensity)?, f(&self.v1)?, f(&self.v2)?, f(&self.v3)?)
    }

    pub fn grid(&self, quantity: Quantity) -> &Grid {
        match quantity {
            Quantity::Intensity => &self.intensity,
            Quantity::V1 => &self.v1,
            Quantity::V2 => &self.v2,
            Quantity::V3 => &self.v3,
        }
    }
}

/// The four persisted quantities of a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quantity {
    Intensity,
    V1,
    V2,
    V3,
}

impl Quantity {
    pub const ALL: [Quantity; 4] = [Quantity::Intensity, Quantity::V1, Quantity::V2, Quantity::V3];
    pub const COMPONENTS: [Quantity; 3] = [Quantity::V1, Quantity::V2, Quantity::V3];

    /// Short tag used in file names.
    pub fn tag(self) -> &'static str {
        match self {
            Quantity::Intensity => "E",
            Quantity::V1 => "V1",
            Quantity::V2 => "V2",
            Quantity::V3 => "V3",
        }
    }

    /// Variable name inside the stage-1 container.
    pub fn field_variable(self) -> &'static str {
        match self {
            Quantity::Intensity => "dataE",
            Quantity::V1 => "dataV1",
            Quantity::V2 => "dataV2",
            Quantity::V3 => "dataV3",
        }
    }

    /// Variable name inside the decomposition container.
    pub fn mode_variable(self) -> &'static str {
        match self {
            Quantity::Intensity => "a",
            Quantity::V1 => "b",
            Quantity::V2 => "c",
            Quantity::V3 => "d",
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

// ---------------------------------------------------------------------------
// NamedArray – one persisted n-d array
// ---------------------------------------------------------------------------

/// Product of `shape`, or `None` if it does not fit in `usize`.
pub fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

/// A named n-dimensional array, data in row-major (C) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedArray {
    pub name: String,
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

impl NamedArray {
    pub fn new(name: impl Into<String>, shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let name = name.into();
        let expected = element_count(&shape).ok_or_else(|| {
            PipelineError::shape(format!("`{name}` element count overflows"), &shape, &[data.len()])
        })?;
        if expected != data.len() {
            return Err(PipelineError::shape(
                "named array",
                &shape,
                &[data.len()],
            ));
        }
        Ok(NamedArray { name, shape, data })
    }

    /// Wrap a grid as `(1, height, width)`; the leading axis is a time slot.
    pub fn from_grid(name: impl Into<String>, grid: &Grid) -> Self {
        NamedArray {
            name: name.into(),
            shape: vec![1, grid.rows(), grid.cols()],
            data: grid.as_slice().to_vec(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Extract the first time slot of a `(1, h, w)` (or plain `(h, w)`) array.
    pub fn first_slice(&self) -> Result<Grid> {
        match self.shape.as_slice() {
            [t, h, w] if *t >= 1 => match self.data.get(..h * w) {
                Some(slot) => Grid::new(*h, *w, slot.to_vec()),
                None => Err(PipelineError::shape(
                    format!("time-slice of `{}`", self.name),
                    &[h * w],
                    &[self.data.len()],
                )),
            },
            [h, w] => Grid::new(*h, *w, self.data.clone()),
            _ => Err(PipelineError::shape(
                format!("time-slice of `{}`", self.name),
                &[1, 0, 0],
                &self.shape,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn row_major_reshape_fills_rows_first() {
        let g = Grid::from_flat(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3, GridOrder::RowMajor).unwrap();
        assert_eq!(g.get(0, 2), 3.0);
        assert_eq!(g.get(1, 0), 4.0);
    }

    #[test]
    fn column_major_reshape_fills_columns_first() {
        let g = Grid::from_flat(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], 2, 3, GridOrder::ColumnMajor)
            .unwrap();
        assert_eq!(g.get(1, 0), 2.0);
        assert_eq!(g.get(0, 1), 3.0);
        assert_eq!(g.get(1, 2), 6.0);
    }

    #[test]
    fn ragged_reshape_is_rejected() {
        let err = Grid::from_flat(&[1.0; 5], 2, 3, GridOrder::RowMajor).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }

    #[test]
    fn bundle_rejects_mismatched_grids() {
        let err = FieldBundle::new(
            Grid::zeros(2, 2),
            Grid::zeros(2, 2),
            Grid::zeros(2, 3),
            Grid::zeros(2, 2),
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }

    #[test]
    fn first_slice_drops_time_axis() {
        let g = Grid::from_fn(2, 3, |r, c| (r * 3 + c) as f64);
        let arr = NamedArray::from_grid("dataE", &g);
        assert_eq!(arr.shape, vec![1, 2, 3]);
        assert_eq!(arr.first_slice().unwrap(), g);
    }

    #[test]
    fn overflowing_shape_is_rejected() {
        assert_eq!(element_count(&[1 << 32, 1 << 32, 3]), None);
        assert_eq!(element_count(&[2, 3, 4]), Some(24));
        let err = NamedArray::new("b", vec![1 << 32, 1 << 32, 3], Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch { .. }));
    }

    #[test]
    fn min_max_ignores_non_finite() {
        let g = Grid::new(1, 3, vec![f64::NAN, -2.0, 5.0]).unwrap();
        assert_eq!(g.min_max(), Some((-2.0, 5.0)));
    }

    proptest! {
        #[test]
        fn reshape_is_lossless(rows in 1usize..12, cols in 1usize..12, column_major in any::<bool>()) {
            let order = if column_major { GridOrder::ColumnMajor } else { GridOrder::RowMajor };
            let values: Vec<f64> = (0..rows * cols).map(|k| k as f64 * 0.5 - 3.0).collect();
            let g = Grid::from_flat(&values, rows, cols, order).unwrap();
            prop_assert_eq!(g.shape(), (rows, cols));
            prop_assert_eq!(g.flatten(order), values);
        }
    }
}
