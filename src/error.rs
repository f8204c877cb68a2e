//! Error types for the benchmark harness.

use thiserror::Error;

/// `EINVAL`: exit status for configuration errors.
pub const EXIT_INVALID: i32 = 22;
/// `EIO`: exit status for I/O failures without an OS error code.
pub const EXIT_IO: i32 = 5;

/// Errors raised by strategy registries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// Strategy names must be non-empty.
    #[error("strategy name is empty")]
    EmptyName,

    /// The name contains characters that would make it unreachable by lookup.
    #[error("invalid strategy name: {0}")]
    InvalidName(String),

    /// A strategy with this name (case-insensitive) is already registered.
    #[error("strategy already registered: {0}")]
    Duplicate(String),

    /// No registered strategy matches the specification.
    #[error("unknown strategy: {0}")]
    Unknown(String),

    /// A name list specification could not be parsed.
    #[error("invalid routine specification: {spec} (at '{token}')")]
    InvalidList { spec: String, token: String },
}

/// Errors raised by strategy instances, during allocation or operation.
#[derive(Debug, Error)]
pub enum StrategyError {
    /// The argument string following `=` was rejected.
    #[error("invalid argument for '{strategy}': {message}")]
    InvalidArgument { strategy: String, message: String },

    /// Matrix buffers do not match the requested dimension.
    #[error("matrix of {actual} elements does not hold a {n}x{n} matrix")]
    Dimension { n: usize, actual: usize },

    /// A worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(String),

    /// Reading or opening an input file failed.
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

/// Top-level error type.
#[derive(Debug, Error)]
pub enum MmbenchError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    /// Configuration values that failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MmbenchError {
    /// Process exit status derived from the error cause.
    pub fn exit_code(&self) -> i32 {
        match self {
            MmbenchError::Registry(_) | MmbenchError::Config(_) => EXIT_INVALID,
            MmbenchError::Strategy(StrategyError::Io { source, .. }) => {
                source.raw_os_error().unwrap_or(EXIT_IO)
            }
            MmbenchError::Strategy(StrategyError::InvalidArgument { .. }) => EXIT_INVALID,
            MmbenchError::Strategy(StrategyError::Dimension { .. }) => EXIT_INVALID,
            MmbenchError::Strategy(StrategyError::ThreadPool(_)) => EXIT_IO,
            MmbenchError::Io(e) => e.raw_os_error().unwrap_or(EXIT_IO),
            MmbenchError::Serialization(_) => EXIT_IO,
        }
    }
}

pub type Result<T> = std::result::Result<T, MmbenchError>;
