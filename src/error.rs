//! Error types for tsrelay

use std::fmt;

/// Result type alias for tsrelay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for tsrelay
#[derive(Debug)]
pub enum Error {
    /// No pool resource became available within the configured timeout
    PoolTimeout {
        class: &'static str,
        waited_ms: u128,
    },
    /// Table provisioning failed for one metric
    TableCreation { table: String, message: String },
    /// The engine rejected a statement
    Query(String),
    /// Query time range exceeds the configured maximum window
    RangeTooLarge { window_ms: i64, max_ms: i64 },
    /// Unsupported matcher type on the metric-name label
    MalformedMatcher(String),
    /// Configuration errors
    Config(String),
    /// Engine-level errors (open, connect)
    Engine(String),
    /// Wire payload decode errors
    Decode(String),
    /// IO errors
    Io(std::io::Error),
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolTimeout { class, waited_ms } => {
                write!(
                    f,
                    "{} pool timeout: no resource available after {}ms",
                    class, waited_ms
                )
            }
            Error::TableCreation { table, message } => {
                write!(f, "failed to create table {}: {}", table, message)
            }
            Error::Query(msg) => write!(f, "query error: {}", msg),
            Error::RangeTooLarge { window_ms, max_ms } => {
                write!(
                    f,
                    "query window {}ms exceeds the maximum of {}ms",
                    window_ms, max_ms
                )
            }
            Error::MalformedMatcher(msg) => write!(f, "malformed matcher: {}", msg),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::Engine(msg) => write!(f, "engine error: {}", msg),
            Error::Decode(msg) => write!(f, "decode error: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<prost::DecodeError> for Error {
    fn from(e: prost::DecodeError) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<snap::Error> for Error {
    fn from(e: snap::Error) -> Self {
        Error::Decode(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}
