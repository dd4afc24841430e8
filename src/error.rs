use std::path::PathBuf;

use thiserror::Error;

/// Typed failures raised inside the pipeline.
///
/// Stages return `anyhow::Result` and attach context as they propagate; the
/// orchestrator inspects the root cause with `downcast_ref` to decide whether
/// a unit is skipped or the whole run aborts.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("input file {path:?} does not exist")]
    MissingInput { path: PathBuf },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("schema mismatch in {path:?}: {detail}")]
    SchemaMismatch { path: PathBuf, detail: String },
    #[error("column '{column}' holds a value the legacy format cannot represent: {detail}")]
    UnsupportedValue { column: String, detail: String },
    #[error("unsupported snapshot version {found} in {path:?} (expected {expected})")]
    SnapshotVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
}

impl PipelineError {
    /// Argument and representation errors abort the run; everything else only
    /// invalidates the (year, format) unit it was raised for.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PipelineError::InvalidArgument(_) | PipelineError::UnsupportedValue { .. }
        )
    }
}

/// Returns true when the root cause of `err` is a fatal [`PipelineError`].
pub fn is_fatal(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<PipelineError>())
        .any(PipelineError::is_fatal)
}
