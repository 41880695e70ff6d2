use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {address}: {source}")]
    Bind {
        address: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },

    /// The connection URI could not be parsed or normalized.
    #[error("invalid connection uri '{uri}': {reason}")]
    InvalidUri { uri: String, reason: String },

    /// No connector is registered for the URI scheme.
    #[error("no connector registered for scheme '{0}'")]
    UnknownScheme(String),

    /// The transport is not available on this platform.
    #[error("transport not supported on this platform: {0}")]
    Unsupported(&'static str),
}

impl TransportError {
    /// Build a `Bind` error for a filesystem path.
    pub fn bind_path(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Bind {
            address: path.display().to_string(),
            source,
        }
    }

    /// Build a `Connect` error for a filesystem path.
    pub fn connect_path(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Connect {
            address: path.display().to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
