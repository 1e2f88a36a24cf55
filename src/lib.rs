//! Optical vortex field pipeline.
//!
//! Converts FDTD field samples into persisted arrays, hands them to an
//! external bi-dimensional EMD tool, and turns the returned intrinsic mode
//! components into a noise / denoised comparison with energy accounting.

pub mod analysis;
pub mod color;
pub mod config;
pub mod data;
pub mod error;
pub mod pipeline;
pub mod render;
pub mod summary;

pub use config::{PipelineConfig, RenderConfig};
pub use error::{PipelineError, Result};
