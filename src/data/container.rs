use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, Float32Array, Float64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use log::debug;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use serde::{Deserialize, Serialize};

use super::model::{element_count, NamedArray};
use crate::error::{PipelineError, Result};

/// Arrow schema metadata key holding the JSON-encoded array shape.
pub const SHAPE_KEY: &str = "shape";

// ---------------------------------------------------------------------------
// Container format
// ---------------------------------------------------------------------------

/// On-disk encoding of a single named array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    /// One Float64 column named after the variable, shape in schema metadata.
    #[default]
    Parquet,
    /// `{ "name": .., "shape": [..], "data": [..] }`
    Json,
}

impl ContainerFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Parquet => "parquet",
            ContainerFormat::Json => "json",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "parquet" | "pq" => Some(Self::Parquet),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        ContainerFormat::parse(ext)
            .ok_or_else(|| PipelineError::parse(path, format!("unsupported container extension: .{ext}")))
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load a named array.  Dispatch by extension.
pub fn load_array(path: &Path) -> Result<NamedArray> {
    let array = match ContainerFormat::from_path(path)? {
        ContainerFormat::Parquet => load_parquet(path)?,
        ContainerFormat::Json => load_json(path)?,
    };
    debug!(
        "loaded `{}` {:?} from {}",
        array.name,
        array.shape,
        path.display()
    );
    Ok(array)
}

/// Save a named array.  Dispatch by extension.
pub fn save_array(path: &Path, array: &NamedArray) -> Result<()> {
    match ContainerFormat::from_path(path)? {
        ContainerFormat::Parquet => save_parquet(path, array),
        ContainerFormat::Json => save_json(path, array),
    }
}

/// Load a container and insist on the variable name.
pub fn load_named(path: &Path, name: &str) -> Result<NamedArray> {
    let array = load_array(path)?;
    if array.name != name {
        return Err(PipelineError::parse(
            path,
            format!("expected variable `{name}`, found `{}`", array.name),
        ));
    }
    Ok(array)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn load_json(path: &Path) -> Result<NamedArray> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let raw: NamedArray = serde_json::from_reader(BufReader::new(file))
        .map_err(|e| PipelineError::parse(path, format!("parsing JSON container: {e}")))?;
    NamedArray::new(raw.name, raw.shape, raw.data)
}

fn save_json(path: &Path, array: &NamedArray) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::to_writer(BufWriter::new(file), array)
        .map_err(|e| PipelineError::parse(path, format!("writing JSON container: {e}")))
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

fn save_parquet(path: &Path, array: &NamedArray) -> Result<()> {
    let shape = serde_json::to_string(&array.shape)
        .map_err(|e| PipelineError::parse(path, format!("encoding shape: {e}")))?;
    let metadata = HashMap::from([(SHAPE_KEY.to_string(), shape)]);
    let schema = Arc::new(Schema::new_with_metadata(
        vec![Field::new(array.name.as_str(), DataType::Float64, false)],
        metadata,
    ));

    let column: ArrayRef = Arc::new(Float64Array::from(array.data.clone()));
    let batch = RecordBatch::try_new(schema.clone(), vec![column])
        .map_err(|e| PipelineError::parse(path, format!("building record batch: {e}")))?;

    let file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut writer = ArrowWriter::try_new(file, schema, None)
        .map_err(|e| PipelineError::parse(path, format!("creating parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| PipelineError::parse(path, format!("writing parquet batch: {e}")))?;
    writer
        .close()
        .map_err(|e| PipelineError::parse(path, format!("closing parquet writer: {e}")))?;
    Ok(())
}

fn load_parquet(path: &Path) -> Result<NamedArray> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| PipelineError::parse(path, format!("reading parquet metadata: {e}")))?;

    let schema = builder.schema().clone();
    if schema.fields().len() != 1 {
        return Err(PipelineError::parse(
            path,
            format!("expected a single array column, found {}", schema.fields().len()),
        ));
    }
    let name = schema.field(0).name().clone();
    let shape: Vec<usize> = match schema.metadata().get(SHAPE_KEY) {
        Some(s) => serde_json::from_str(s)
            .map_err(|e| PipelineError::parse(path, format!("invalid shape metadata '{s}': {e}")))?,
        None => return Err(PipelineError::parse(path, "missing `shape` metadata")),
    };

    let rows = usize::try_from(builder.metadata().file_metadata().num_rows())
        .map_err(|_| PipelineError::parse(path, "negative row count in parquet metadata"))?;
    match element_count(&shape) {
        Some(n) if n == rows => {}
        _ => return Err(PipelineError::shape(format!("`{name}` in {}", path.display()), &shape, &[rows])),
    }

    let reader = builder
        .build()
        .map_err(|e| PipelineError::parse(path, format!("building parquet reader: {e}")))?;

    let mut data = Vec::new();
    for batch_result in reader {
        let batch = batch_result
            .map_err(|e| PipelineError::parse(path, format!("reading parquet record batch: {e}")))?;
        extend_f64(&mut data, batch.column(0), path)?;
    }

    NamedArray::new(name, shape, data)
}

/// The column may be Float64 or Float32; nulls read as NaN.
fn extend_f64(out: &mut Vec<f64>, col: &ArrayRef, path: &Path) -> Result<()> {
    if let Some(arr) = col.as_any().downcast_ref::<Float64Array>() {
        out.extend(arr.iter().map(|v| v.unwrap_or(f64::NAN)));
    } else if let Some(arr) = col.as_any().downcast_ref::<Float32Array>() {
        out.extend(arr.iter().map(|v| v.map_or(f64::NAN, f64::from)));
    } else {
        return Err(PipelineError::parse(
            path,
            format!("column type is {:?}, expected Float64 or Float32", col.data_type()),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NamedArray {
        NamedArray::new("b", vec![2, 2, 3], (0..12).map(|v| v as f64 * 1.5).collect()).unwrap()
    }

    #[test]
    fn parquet_keeps_name_and_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loam1data_BIMF0_V1.parquet");
        save_array(&path, &sample()).unwrap();
        assert_eq!(load_array(&path).unwrap(), sample());
    }

    #[test]
    fn json_keeps_name_and_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loam1data_BIMF0_V1.json");
        save_array(&path, &sample()).unwrap();
        assert_eq!(load_named(&path, "b").unwrap(), sample());
    }

    #[test]
    fn wrong_variable_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.json");
        save_array(&path, &sample()).unwrap();
        assert!(matches!(load_named(&path, "c"), Err(PipelineError::Parse { .. })));
    }

    #[test]
    fn json_with_inconsistent_shape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"name":"a","shape":[2,2],"data":[1.0,2.0,3.0]}"#).unwrap();
        assert!(matches!(load_array(&path), Err(PipelineError::ShapeMismatch { .. })));
    }

    /// Valid single-column file whose shape metadata claims `shape`.
    fn write_parquet_with_shape(path: &Path, shape: &str, values: Vec<f64>) {
        let metadata = HashMap::from([(SHAPE_KEY.to_string(), shape.to_string())]);
        let schema = Arc::new(Schema::new_with_metadata(
            vec![Field::new("b", DataType::Float64, false)],
            metadata,
        ));
        let column: ArrayRef = Arc::new(Float64Array::from(values));
        let batch = RecordBatch::try_new(schema.clone(), vec![column]).unwrap();
        let mut writer = ArrowWriter::try_new(File::create(path).unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn oversized_parquet_shape_is_rejected_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.parquet");
        write_parquet_with_shape(&path, "[1000000,1000000,3]", vec![1.0; 6]);
        assert!(matches!(load_array(&path), Err(PipelineError::ShapeMismatch { .. })));

        write_parquet_with_shape(&path, "[100000000000,100000000000,3]", vec![1.0; 6]);
        assert!(matches!(load_array(&path), Err(PipelineError::ShapeMismatch { .. })));
    }

    #[test]
    fn overflowing_json_shape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.json");
        std::fs::write(&path, r#"{"name":"b","shape":[4294967296,4294967296,3],"data":[]}"#).unwrap();
        assert!(matches!(load_array(&path), Err(PipelineError::ShapeMismatch { .. })));
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = load_array(Path::new("data.mat")).unwrap_err();
        assert!(matches!(err, PipelineError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_array(Path::new("/nonexistent/a.parquet")).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
