use std::path::{Path, PathBuf};

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy shared by every stage
// ---------------------------------------------------------------------------

/// Everything that can stop (or, for missing decomposition data, divert) a
/// pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input did not match the expected schema.
    #[error("{}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    /// Two grids or arrays of incompatible dimensions were combined.
    #[error("shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Output of the external decomposition is absent, truncated or unusable.
    #[error("decomposition data unavailable: {0}")]
    MissingDecompositionData(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The decomposition tool could not be started, exited nonzero or timed out.
    #[error("external tool `{command}` failed: {reason}")]
    ExternalToolFailure { command: String, reason: String },

    /// Energy fractions requested against an all-zero original field.
    #[error("original field energy is zero; energy fractions are undefined")]
    ZeroEnergy,

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn parse(path: &Path, message: impl Into<String>) -> Self {
        PipelineError::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn shape(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        PipelineError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Whether the reporting stage may recover from this error with the
    /// synthetic fallback.
    pub fn is_missing_decomposition(&self) -> bool {
        matches!(self, PipelineError::MissingDecompositionData(_))
    }
}
