use std::fmt;
use std::io;

use agentlink_frame::FrameError;
use agentlink_server::{JobError, ProfileError, ServerError};
use agentlink_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound => TRANSPORT_ERROR,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { ref source, .. } | TransportError::Connect { ref source, .. } => {
            let code = io_error(context, io::Error::from(source.kind())).code;
            CliError::new(code, format!("{context}: {err}"))
        }
        TransportError::Accept(source) | TransportError::Io(source) => io_error(context, source),
        TransportError::InvalidUri { .. } | TransportError::UnknownScheme(_) => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::Codec(_) => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed | FrameError::Truncated { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
    }
}

pub fn profile_error(context: &str, err: ProfileError) -> CliError {
    match err {
        ProfileError::FileNotFound { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        ProfileError::Parse { .. } | ProfileError::Invalid { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ProfileError::AlreadyExists(_) | ProfileError::NotFound(_) => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
    }
}

pub fn job_error(context: &str, err: JobError) -> CliError {
    match err {
        JobError::Bind { source, .. } => transport_error(context, source),
        JobError::Profile { source, .. } => profile_error(context, source),
        JobError::InvalidParams { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        JobError::NotFound(_) => CliError::new(FAILURE, format!("{context}: {err}")),
        JobError::Spawn { .. } => CliError::new(INTERNAL, format!("{context}: {err}")),
    }
}

pub fn server_error(context: &str, err: ServerError) -> CliError {
    match err {
        ServerError::Profile(err) => profile_error(context, err),
        ServerError::Job(err) => job_error(context, err),
        ServerError::ConfigRead { .. } => CliError::new(USAGE, format!("{context}: {err}")),
        ServerError::ConfigParse { .. } => CliError::new(DATA_INVALID, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeouts_map_to_124() {
        let err = frame_error("wait", FrameError::Io(io::Error::from(io::ErrorKind::WouldBlock)));
        assert_eq!(err.code, TIMEOUT);
        let err = frame_error("wait", FrameError::Io(io::Error::from(io::ErrorKind::TimedOut)));
        assert_eq!(err.code, TIMEOUT);
    }

    #[test]
    fn uri_errors_are_usage_errors() {
        let err = transport_error("connect", TransportError::UnknownScheme("smb".into()));
        assert_eq!(err.code, USAGE);
        assert!(err.message.contains("smb"));
    }

    #[test]
    fn refused_connect_is_transport_error() {
        let err = transport_error(
            "connect",
            TransportError::Connect {
                address: "127.0.0.1:1".into(),
                source: io::Error::from(io::ErrorKind::ConnectionRefused),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.contains("127.0.0.1:1"));
    }

    #[test]
    fn job_errors_unwrap_their_cause() {
        let err = job_error("listen", JobError::Profile {
            id: 4,
            source: ProfileError::NotFound("lab".into()),
        });
        assert_eq!(err.code, FAILURE);
        let err = job_error("listen", JobError::InvalidParams {
            id: 5,
            reason: "pipe listeners require a path".into(),
        });
        assert_eq!(err.code, USAGE);
    }
}
