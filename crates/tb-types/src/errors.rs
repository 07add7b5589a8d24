use thiserror::Error;

/// Boxed error returned by external collaborators (trainers, scorers, stores).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for the TrialBench system
#[derive(Error, Debug)]
pub enum TbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Trial execution error: {0}")]
    Trial(#[from] TrialError),

    #[error("Publication error: {0}")]
    Publication(#[from] PublicationError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl TbError {
    /// True for errors that surface before any trial has run.
    pub fn is_configuration(&self) -> bool {
        matches!(self, TbError::Config(_) | TbError::Validation(_))
    }
}

/// Failures raised while running a single trial. Always fatal for the run.
#[derive(Error, Debug)]
pub enum TrialError {
    #[error("trial index must be positive, got {index}")]
    InvalidIndex { index: u32 },

    #[error("trainer failed on trial {trial}: {source}")]
    Fit {
        trial: u32,
        #[source]
        source: BoxError,
    },

    #[error("scorer failed on trial {trial}: {source}")]
    Score {
        trial: u32,
        #[source]
        source: BoxError,
    },

    #[error("scorer returned non-finite metric {value} on trial {trial}")]
    NonFiniteMetric { trial: u32, value: f64 },
}

impl TrialError {
    /// Trial index the failure is attributed to.
    pub fn trial(&self) -> u32 {
        match self {
            TrialError::InvalidIndex { index } => *index,
            TrialError::Fit { trial, .. }
            | TrialError::Score { trial, .. }
            | TrialError::NonFiniteMetric { trial, .. } => *trial,
        }
    }
}

/// Failures raised while staging or publishing a payload.
#[derive(Error, Debug)]
pub enum PublicationError {
    #[error("failed to allocate scratch directory: {source}")]
    ScratchAllocation {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode payload {payload}: {source}")]
    Encode {
        payload: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write payload {payload} to scratch path {path}: {source}")]
    ScratchWrite {
        payload: String,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {from} to {to}: {source}")]
    LocalRename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to upload payload {payload} to {uri}: {source}")]
    Remote {
        payload: String,
        uri: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to remove scratch directory {path}: {source}")]
    Cleanup {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Data-related errors
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Data loading failed: {message}")]
    LoadingFailed { message: String },

    #[error("Data parsing error at line {line}: {message}")]
    ParseError { line: usize, message: String },

    #[error("Column not found: {column}")]
    ColumnNotFound { column: String },

    #[error("Invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("Insufficient data: {message}")]
    InsufficientData { message: String },
}

/// Result type alias for TrialBench operations
pub type TbResult<T> = Result<T, TbError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::TbError::Validation(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::TbError::Config(format!($($arg)*))
    };
}
