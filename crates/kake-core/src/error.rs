//! Error taxonomy for the Kake dependency engine.

use crate::path::TargetPath;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum KakeError {
    #[error("no rule matches target: {0}")]
    UnknownTarget(TargetPath),

    #[error("ambiguous rule registration for output '{output}': collides with '{label}'")]
    AmbiguousRule { output: String, label: String },

    #[error("cycle detected while resolving {target}: {path}")]
    CycleDetected { target: TargetPath, path: String },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("computed inputs did not converge for {target} after {iterations} iterations")]
    ComputedInputsDivergence {
        target: TargetPath,
        iterations: usize,
    },

    #[error("build failed for {output} (rule '{label}', argv {argv:?}): {stderr}")]
    BuildFailed {
        label: String,
        output: TargetPath,
        argv: Option<Vec<String>>,
        stderr: String,
    },

    #[error("build of {output} completed but output does not exist")]
    MissingOutput { output: TargetPath },

    #[error("build cancelled: {0}")]
    Cancelled(TargetPath),

    #[error("build timed out after {0:?}: {1}")]
    Timeout(std::time::Duration, TargetPath),

    #[error("io error: {0}")]
    Io(String),
}

impl KakeError {
    pub fn build_failed(
        label: impl Into<String>,
        output: TargetPath,
        argv: Option<Vec<String>>,
        stderr: impl Into<String>,
    ) -> Self {
        Self::BuildFailed {
            label: label.into(),
            output,
            argv,
            stderr: stderr.into(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }
}

impl From<std::io::Error> for KakeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, KakeError>;
