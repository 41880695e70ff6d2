use std::path::{PathBuf, MAIN_SEPARATOR};
use std::time::Duration;

use tracing::debug;
use url::Url;

use crate::connection::Connection;
use crate::error::{Result, TransportError};
use crate::tcp::TcpSocketListener;

/// Scheme served by [`PipeConnector`].
pub const PIPE_SCHEME: &str = "namedpipe";
/// Scheme served by [`TcpConnector`].
pub const TCP_SCHEME: &str = "tcp";

/// Produces a duplex [`Connection`] for one address scheme.
///
/// Timeout and retry policy belong to the implementation.
pub trait Connector: Send + Sync {
    /// Open a connection to the parsed URI.
    fn connect(&self, uri: &Url) -> Result<Connection>;

    /// Human-readable connector name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Map a `namedpipe://host/seg/...` URI to a local pipe address.
///
/// Host and path segments are joined with the platform path separator. On
/// Windows that yields `\\host\seg\...`; on Unix it yields `/host/seg/...`,
/// naming a Unix domain socket.
pub fn pipe_address(uri: &Url) -> Result<PathBuf> {
    let invalid = |reason: &str| TransportError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    };

    let host = uri
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| invalid("missing host"))?;
    let segments: Vec<&str> = uri
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    if segments.is_empty() {
        return Err(invalid("missing pipe name"));
    }

    let sep = MAIN_SEPARATOR.to_string();
    let mut address = String::new();
    if cfg!(windows) {
        address.push_str(&sep);
    }
    address.push_str(&sep);
    address.push_str(host);
    for segment in segments {
        address.push_str(&sep);
        address.push_str(segment);
    }
    Ok(PathBuf::from(address))
}

/// Connects `namedpipe://` URIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipeConnector;

impl Connector for PipeConnector {
    fn connect(&self, uri: &Url) -> Result<Connection> {
        let address = pipe_address(uri)?;
        debug!(?address, "named pipe address");

        #[cfg(unix)]
        {
            crate::uds::UnixSocketListener::connect(&address)
        }

        #[cfg(not(unix))]
        {
            let _ = address;
            Err(TransportError::Unsupported(
                "named pipe connections are only implemented over unix domain sockets",
            ))
        }
    }

    fn name(&self) -> &'static str {
        "named-pipe"
    }
}

/// Connects `tcp://host:port` URIs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector {
    /// Per-attempt connect timeout. `None` uses the OS default.
    pub timeout: Option<Duration>,
}

impl TcpConnector {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

impl Connector for TcpConnector {
    fn connect(&self, uri: &Url) -> Result<Connection> {
        let host = uri.host_str().ok_or_else(|| TransportError::InvalidUri {
            uri: uri.to_string(),
            reason: "missing host".to_string(),
        })?;
        let port = uri.port().ok_or_else(|| TransportError::InvalidUri {
            uri: uri.to_string(),
            reason: "missing port".to_string(),
        })?;
        // IPv6 hosts come back bracketed from `host_str`, which `ToSocketAddrs` accepts.
        TcpSocketListener::connect(&format!("{host}:{port}"), self.timeout)
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(text: &str) -> Url {
        Url::parse(text).unwrap()
    }

    #[test]
    #[cfg(unix)]
    fn pipe_address_joins_host_and_segments() {
        let address = pipe_address(&url("namedpipe://tmp/agentlink/pipe.sock")).unwrap();
        assert_eq!(address, PathBuf::from("/tmp/agentlink/pipe.sock"));
    }

    #[test]
    #[cfg(windows)]
    fn pipe_address_uses_unc_form() {
        let address = pipe_address(&url("namedpipe://./pipe/agentlink")).unwrap();
        assert_eq!(address, PathBuf::from(r"\\.\pipe\agentlink"));
    }

    #[test]
    fn pipe_address_ignores_empty_segments() {
        let address = pipe_address(&url("namedpipe://host//pipe//name/")).unwrap();
        let sep = MAIN_SEPARATOR;
        assert!(address
            .to_string_lossy()
            .ends_with(&format!("host{sep}pipe{sep}name")));
    }

    #[test]
    fn pipe_address_requires_name() {
        let err = pipe_address(&url("namedpipe://host")).unwrap_err();
        assert!(matches!(err, TransportError::InvalidUri { .. }));
    }

    #[test]
    fn tcp_connector_requires_port() {
        let err = TcpConnector::default()
            .connect(&url("tcp://127.0.0.1"))
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUri { reason, .. } if reason == "missing port"));
    }

    #[test]
    #[cfg(unix)]
    fn pipe_connector_reaches_unix_listener() {
        use std::io::{Read, Write};

        let dir = std::env::temp_dir().join(format!("agentlink-pipe-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sock_path = dir.join("agent.sock");
        let listener = crate::uds::UnixSocketListener::bind(&sock_path).unwrap();

        let uri = url(&format!("namedpipe:/{}", sock_path.display()));
        let client = std::thread::spawn(move || {
            let mut conn = PipeConnector.connect(&uri).unwrap();
            conn.write_all(b"hi").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 2];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");

        client.join().unwrap();
        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
