//! Error taxonomy of the worker engine.

/// Fatal error kinds surfaced by engine stages.
///
/// Per-pair tasks report their kind to the scheduler which records it and
/// continues with the remaining pairs; only `ResourceExhausted` is retried.
#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    /// Species or tissue declared in configuration but absent from the data.
    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),
    /// Schema violation in either input table.
    #[error("malformed input: {0}")]
    InputMalformed(String),
    /// Species/tissue below the minimum sample count for correlation.
    #[error("insufficient samples: {0}")]
    InsufficientSamples(String),
    /// NaN appeared in the correlation matrix.
    #[error("degenerate expression: {0}")]
    DegenerateExpression(String),
    /// Consistency violation between stages.
    #[error("ortholog gene missing: {0}")]
    OrthologGeneMissing(String),
    /// Memory or wall-time budget exceeded.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),
    /// Cached artifact failed the header or checksum check.
    #[error("artifact corrupt: {0}")]
    ArtifactCorrupt(String),
}

impl WorkerError {
    /// Stable machine-readable kind name, used in run summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            WorkerError::ConfigMismatch(_) => "ConfigMismatch",
            WorkerError::InputMalformed(_) => "InputMalformed",
            WorkerError::InsufficientSamples(_) => "InsufficientSamples",
            WorkerError::DegenerateExpression(_) => "DegenerateExpression",
            WorkerError::OrthologGeneMissing(_) => "OrthologGeneMissing",
            WorkerError::ResourceExhausted(_) => "ResourceExhausted",
            WorkerError::ArtifactCorrupt(_) => "ArtifactCorrupt",
        }
    }

    /// Whether the scheduler may retry the task with a doubled budget.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkerError::ResourceExhausted(_))
    }
}
