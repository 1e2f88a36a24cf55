use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use log::{debug, info};

use super::model::{FieldBundle, Grid, GridOrder};
use crate::error::{PipelineError, Result};

/// Number of comma-separated fields in every sample row: x, y, Ex, Ey, Ez.
pub const SAMPLE_COLUMNS: usize = 5;

// ---------------------------------------------------------------------------
// SampleTable – the five raw columns of a field-sample CSV
// ---------------------------------------------------------------------------

/// Column-oriented copy of a sample file, in file order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleTable {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub ex: Vec<f64>,
    pub ey: Vec<f64>,
    pub ez: Vec<f64>,
}

impl SampleTable {
    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Grid extents inferred from the number of distinct x and y values.
    pub fn grid_extent(&self) -> (usize, usize) {
        (distinct_count(&self.x), distinct_count(&self.y))
    }

    /// Reshape the component columns into an `nx × ny` field bundle.
    ///
    /// Fails when the row count is not `nx * ny`, or when the coordinate
    /// columns reshaped with `order` do not put a single x on each grid row
    /// and a single y on each grid column.
    pub fn to_bundle(&self, order: GridOrder, source: &Path) -> Result<FieldBundle> {
        if self.is_empty() {
            return Err(PipelineError::parse(source, "no sample rows after the header"));
        }
        let (nx, ny) = self.grid_extent();
        if nx * ny != self.len() {
            return Err(PipelineError::parse(
                source,
                format!(
                    "ragged grid: {nx} distinct x × {ny} distinct y = {} cells, but {} rows",
                    nx * ny,
                    self.len()
                ),
            ));
        }

        let reshape = |col: &[f64]| Grid::from_flat(col, nx, ny, order);
        check_axes(&reshape(&self.x)?, &reshape(&self.y)?, order, source)?;

        FieldBundle::from_components(reshape(&self.ex)?, reshape(&self.ey)?, reshape(&self.ez)?)
    }
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted.dedup_by(|a, b| a.total_cmp(b).is_eq());
    sorted.len()
}

/// x must be constant along each grid row, y along each grid column.
fn check_axes(xs: &Grid, ys: &Grid, order: GridOrder, source: &Path) -> Result<()> {
    for r in 0..xs.rows() {
        for c in 0..xs.cols() {
            let (x, y) = (xs.get(r, c), ys.get(r, c));
            if x != xs.get(r, 0) || y != ys.get(0, c) {
                return Err(PipelineError::parse(
                    source,
                    format!(
                        "coordinates disagree with {order} order at cell ({r}, {c}): \
                         x={x}, y={y}, expected x={}, y={}",
                        xs.get(r, 0),
                        ys.get(0, c)
                    ),
                ));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

/// Read a field-sample CSV: `header_lines` metadata lines, then rows of
/// exactly five numeric fields.
pub fn read_samples(path: &Path, header_lines: usize) -> Result<SampleTable> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let mut reader = BufReader::new(file);

    let mut skipped = String::new();
    for _ in 0..header_lines {
        skipped.clear();
        let n = reader
            .read_line(&mut skipped)
            .map_err(|e| PipelineError::io(path, e))?;
        if n == 0 {
            return Err(PipelineError::parse(
                path,
                format!("file ends inside the {header_lines}-line header"),
            ));
        }
        debug!("header: {}", skipped.trim_end());
    }

    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut table = SampleTable::default();
    for (row_no, result) in csv_reader.records().enumerate() {
        let line = header_lines + row_no + 1;
        let record = result.map_err(|e| PipelineError::parse(path, format!("line {line}: {e}")))?;
        if record.len() != SAMPLE_COLUMNS {
            return Err(PipelineError::parse(
                path,
                format!(
                    "line {line}: expected {SAMPLE_COLUMNS} columns, found {}",
                    record.len()
                ),
            ));
        }

        let mut values = [0.0; SAMPLE_COLUMNS];
        for (j, field) in record.iter().enumerate() {
            values[j] = field.parse::<f64>().map_err(|_| {
                PipelineError::parse(path, format!("line {line}, column {j}: '{field}' is not a number"))
            })?;
        }
        let [x, y, ex, ey, ez] = values;
        table.x.push(x);
        table.y.push(y);
        table.ex.push(ex);
        table.ey.push(ey);
        table.ez.push(ez);
    }

    Ok(table)
}

/// Read a sample file and reshape it into a field bundle.
pub fn load_bundle(path: &Path, header_lines: usize, order: GridOrder) -> Result<FieldBundle> {
    info!("Reading: {}", path.display());
    let table = read_samples(path, header_lines)?;
    info!("Data points: {}", table.len());
    let (nx, ny) = table.grid_extent();
    info!("Original grid size: {nx} x {ny}");
    table.to_bundle(order, path)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
