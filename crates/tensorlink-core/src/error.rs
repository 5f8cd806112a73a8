//! Error types for Tensorlink Core.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tonic::{Code, Status};

/// Coarse classification of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Transport unreachable or reset before a response was obtained.
    Connectivity,
    /// The call did not complete within its deadline.
    DeadlineExceeded,
    /// The remote service answered with an error status.
    RemoteStatus,
    /// A prediction call supplied no input source.
    InvalidInput,
    /// A supplied path could not be opened or read.
    ResourceIo,
    /// The connection was shut down.
    Closed,
    /// A request parameter was out of range.
    InvalidArgument,
    /// Connection configuration was rejected.
    Config,
    /// A caller-supplied stream failed while reading.
    Io,
    /// The blocking runtime could not be started.
    Runtime,
}

/// Core error type for Tensorlink operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// The call outlived its deadline
    #[error("Deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    /// Application-level error status from the remote service
    #[error("Remote status {code:?}: {message}")]
    RemoteStatus {
        /// gRPC status code
        code: Code,
        /// Status message sent by the service
        message: String,
    },

    /// Neither a path nor a stream was supplied
    #[error("Invalid input: no image path or stream supplied")]
    InvalidInput,

    /// Input file errors
    #[error("Failed to read {}: {source}", path.display())]
    ResourceIo {
        /// The path that failed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Call attempted after shutdown
    #[error("Connection is closed")]
    Closed,

    /// Request parameter errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Stream I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Runtime construction errors
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl ClientError {
    /// Classify a status returned by the transport.
    ///
    /// `deadline` is the budget the call ran under; it is reported back when the
    /// status says the deadline expired.
    pub fn from_status(status: &Status, deadline: Duration) -> Self {
        match status.code() {
            Code::DeadlineExceeded => Self::DeadlineExceeded(deadline),
            Code::Unavailable => Self::Connectivity(status.message().to_string()),
            // tonic reports connection-level failures without a service status as Unknown
            // with the transport error attached as the source.
            Code::Unknown if std::error::Error::source(status).is_some() => {
                Self::Connectivity(status.message().to_string())
            }
            code => Self::RemoteStatus { code, message: status.message().to_string() },
        }
    }

    /// The classification of this error.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Connectivity(_) => FailureKind::Connectivity,
            Self::DeadlineExceeded(_) => FailureKind::DeadlineExceeded,
            Self::RemoteStatus { .. } => FailureKind::RemoteStatus,
            Self::InvalidInput => FailureKind::InvalidInput,
            Self::ResourceIo { .. } => FailureKind::ResourceIo,
            Self::Closed => FailureKind::Closed,
            Self::InvalidArgument(_) => FailureKind::InvalidArgument,
            Self::Config(_) => FailureKind::Config,
            Self::Io(_) => FailureKind::Io,
            Self::Runtime(_) => FailureKind::Runtime,
        }
    }
}

/// Result type alias for Tensorlink operations.
pub type Result<T> = std::result::Result<T, ClientError>;
