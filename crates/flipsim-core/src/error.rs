//! Error types, one per pipeline stage.
//!
//! Every failure a caller can see carries the [`Stage`] that produced it so a
//! presentation layer can say *where* a run went wrong (generator, transform,
//! statistics, query) without parsing messages.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Pipeline stage that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Run parameters rejected before any process was spawned.
    Input,
    /// Outcome generator process or its line protocol.
    Source,
    /// The run itself: user cancellation or resource exhaustion while
    /// collecting outcomes.
    Run,
    /// Reshaping raw outcomes into the return tensor.
    Transform,
    /// Descriptive and bootstrap statistics.
    Statistics,
    /// Percentile and backstop lookups against stored results.
    Query,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Input => write!(f, "input"),
            Self::Source => write!(f, "source"),
            Self::Run => write!(f, "run"),
            Self::Transform => write!(f, "transform"),
            Self::Statistics => write!(f, "statistics"),
            Self::Query => write!(f, "query"),
        }
    }
}

/// Failure talking to the outcome generator.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to start generator `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("generator is not running")]
    NotRunning,

    #[error("generator I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("generator closed its output after {received} of {expected} tokens")]
    Closed { expected: usize, received: usize },

    #[error("generator ended the chunk after {received} of {expected} tokens")]
    ShortChunk { expected: usize, received: usize },

    #[error("generator sent more than {expected} tokens without a terminator")]
    Overlong { expected: usize },

    #[error("malformed token {token:?} on response line {line}")]
    Malformed { line: usize, token: String },
}

/// Raw outcome stream could not be shaped into a return tensor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error(
        "expected {expected} tokens for {simulations} sims x {flips} flips x {wagers} wagers, got {actual}"
    )]
    ShapeMismatch {
        expected: usize,
        actual: usize,
        simulations: usize,
        flips: usize,
        wagers: usize,
    },

    #[error("tensor axis `{0}` has zero length")]
    EmptyAxis(&'static str),
}

/// Statistics could not be computed over a sample.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("cannot compute statistics over an empty sample")]
    EmptySample,

    #[error("sample value at index {index} is not finite")]
    NonFinite { index: usize },

    #[error("invalid statistics parameter: {0}")]
    InvalidParameter(String),
}

/// Percentile or backstop query failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("label not found: {0}")]
    LabelNotFound(String),

    #[error("percentile {0} is outside [0, 100]")]
    InvalidPercentile(f64),

    #[error("invalid query argument: {0}")]
    InvalidArgument(String),

    #[error("stored sample is empty")]
    EmptySample,
}

/// A simulation run failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid run request: {0}")]
    InvalidRequest(String),

    #[error("outcome source failed before a single simulation completed: {0}")]
    Source(#[from] SourceError),

    /// Cancellation was requested before one whole simulation arrived.
    #[error("run cancelled before a single simulation completed")]
    Cancelled,

    /// The store was reset while the run was in flight.
    #[error("results discarded: the result store was reset during the run")]
    Discarded,

    #[error("cannot hold {tokens} outcome tokens in memory")]
    OutOfMemory { tokens: usize },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Statistics(#[from] StatsError),
}

impl RunError {
    /// Stage this error belongs to.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidRequest(_) => Stage::Input,
            Self::Source(_) => Stage::Source,
            Self::Cancelled | Self::Discarded | Self::OutOfMemory { .. } => Stage::Run,
            Self::Transform(_) => Stage::Transform,
            Self::Statistics(_) => Stage::Statistics,
        }
    }
}

impl QueryError {
    pub fn stage(&self) -> Stage {
        Stage::Query
    }
}
