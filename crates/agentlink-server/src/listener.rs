use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use agentlink_transport::{Connection, Result, TcpSocketListener, TransportError};
#[cfg(unix)]
use agentlink_transport::UnixSocketListener;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::profiles::Profile;

/// Transport a listener job accepts agents on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerKind {
    #[default]
    Tcp,
    /// Named pipe; a Unix-domain socket on Unix.
    Pipe,
}

impl ListenerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ListenerKind::Tcp => "tcp",
            ListenerKind::Pipe => "pipe",
        }
    }
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListenerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(ListenerKind::Tcp),
            "pipe" | "namedpipe" => Ok(ListenerKind::Pipe),
            other => Err(format!("unknown listener kind '{other}' (expected tcp or pipe)")),
        }
    }
}

/// Operator-supplied parameters for a listener job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ListenerParams {
    #[serde(default)]
    pub kind: ListenerKind,
    /// TCP host; the profile's `default_host` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// TCP port. Zero picks an ephemeral port.
    #[serde(default)]
    pub port: u16,
    /// Pipe socket path; relative paths resolve under the profile's `pipe_dir`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Profile name; empty selects the default profile.
    #[serde(default)]
    pub profile: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl ListenerParams {
    pub fn tcp(host: Option<&str>, port: u16) -> Self {
        Self {
            kind: ListenerKind::Tcp,
            host: host.map(str::to_string),
            port,
            ..Self::default()
        }
    }

    pub fn pipe(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ListenerKind::Pipe,
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = profile.into();
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Check that the fields required by `kind` are present.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self.kind {
            ListenerKind::Tcp if self.path.is_some() => {
                Err("tcp listeners take host/port, not path".to_string())
            }
            ListenerKind::Pipe if self.path.is_none() => {
                Err("pipe listeners require a path".to_string())
            }
            ListenerKind::Pipe if self.host.is_some() || self.port != 0 => {
                Err("pipe listeners take a path, not host/port".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// A bound, listening socket owned by one job.
pub enum BoundListener {
    Tcp(TcpSocketListener),
    #[cfg(unix)]
    Pipe(UnixSocketListener),
}

impl BoundListener {
    pub fn kind(&self) -> ListenerKind {
        match self {
            BoundListener::Tcp(_) => ListenerKind::Tcp,
            #[cfg(unix)]
            BoundListener::Pipe(_) => ListenerKind::Pipe,
        }
    }

    /// Address agents connect to, in the form shown to operators.
    pub fn address(&self) -> String {
        match self {
            BoundListener::Tcp(listener) => listener.local_addr().to_string(),
            #[cfg(unix)]
            BoundListener::Pipe(listener) => listener.path().display().to_string(),
        }
    }

    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        match self {
            BoundListener::Tcp(listener) => listener.set_nonblocking(nonblocking),
            #[cfg(unix)]
            BoundListener::Pipe(listener) => listener.set_nonblocking(nonblocking),
        }
    }

    /// Accept one pending agent.
    ///
    /// On a non-blocking listener with nothing pending this is
    /// `Ok(None)`; the accepted connection itself is always blocking.
    pub fn accept_nonblocking(&self) -> Result<Option<Connection>> {
        let accepted = match self {
            BoundListener::Tcp(listener) => listener.accept(),
            #[cfg(unix)]
            BoundListener::Pipe(listener) => listener.accept(),
        };
        match accepted {
            Ok(conn) => Ok(Some(conn)),
            Err(TransportError::Accept(err)) if err.kind() == std::io::ErrorKind::WouldBlock => {
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for BoundListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundListener")
            .field("kind", &self.kind())
            .field("address", &self.address())
            .finish()
    }
}

/// Turns listener parameters plus a profile into a bound socket.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListenerFactory;

impl ListenerFactory {
    pub fn bind(&self, params: &ListenerParams, profile: &Profile) -> Result<BoundListener> {
        let listener = match params.kind {
            ListenerKind::Tcp => {
                let host = params
                    .host
                    .as_deref()
                    .unwrap_or(&profile.config.default_host);
                BoundListener::Tcp(TcpSocketListener::bind(host, params.port)?)
            }
            ListenerKind::Pipe => {
                let path = params
                    .path
                    .as_deref()
                    .ok_or_else(|| TransportError::InvalidUri {
                        uri: String::new(),
                        reason: "pipe listener without a path".to_string(),
                    })?;
                bind_pipe(&resolve_pipe_path(path, profile))?
            }
        };
        listener.set_nonblocking(true)?;
        info!(
            kind = %listener.kind(),
            address = %listener.address(),
            profile = %profile.name,
            "listener bound"
        );
        Ok(listener)
    }
}

/// Resolve a pipe path against the profile's `pipe_dir`.
pub fn resolve_pipe_path(path: &Path, profile: &Profile) -> PathBuf {
    match &profile.config.pipe_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path.to_path_buf(),
    }
}

#[cfg(unix)]
fn bind_pipe(path: &Path) -> Result<BoundListener> {
    Ok(BoundListener::Pipe(UnixSocketListener::bind(path)?))
}

#[cfg(not(unix))]
fn bind_pipe(_path: &Path) -> Result<BoundListener> {
    Err(TransportError::Unsupported("pipe listeners"))
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::profiles::TransportConfig;

    fn profile_with_pipe_dir(dir: Option<PathBuf>) -> Profile {
        Profile {
            name: "test".to_string(),
            config: TransportConfig {
                pipe_dir: dir,
                ..TransportConfig::default()
            },
            source: None,
        }
    }

    #[test]
    fn kind_parses_and_displays() {
        assert_eq!("TCP".parse::<ListenerKind>().unwrap(), ListenerKind::Tcp);
        assert_eq!("namedpipe".parse::<ListenerKind>().unwrap(), ListenerKind::Pipe);
        assert!("smb".parse::<ListenerKind>().is_err());
        assert_eq!(ListenerKind::Pipe.to_string(), "pipe");
    }

    #[test]
    fn params_deserialize_with_defaults() {
        let params: ListenerParams =
            serde_json::from_str(r#"{ "kind": "pipe", "path": "a.sock" }"#).unwrap();
        assert_eq!(params, ListenerParams::pipe("a.sock"));

        let params: ListenerParams = serde_json::from_str(r#"{ "port": 9000 }"#).unwrap();
        assert_eq!(params.kind, ListenerKind::Tcp);
        assert!(params.profile.is_empty());
    }

    #[test]
    fn params_validation() {
        assert!(ListenerParams::tcp(None, 0).validate().is_ok());
        assert!(ListenerParams::pipe("x").validate().is_ok());
        let mut no_path = ListenerParams::pipe("x");
        no_path.path = None;
        assert!(no_path.validate().is_err());
        let mut tcp_with_path = ListenerParams::tcp(None, 1);
        tcp_with_path.path = Some("x".into());
        assert!(tcp_with_path.validate().is_err());
    }

    #[test]
    fn relative_pipe_paths_use_profile_dir() {
        let profile = profile_with_pipe_dir(Some(PathBuf::from("/run/agentlink")));
        assert_eq!(
            resolve_pipe_path(Path::new("a.sock"), &profile),
            PathBuf::from("/run/agentlink/a.sock")
        );
        assert_eq!(
            resolve_pipe_path(Path::new("/tmp/b.sock"), &profile),
            PathBuf::from("/tmp/b.sock")
        );
        let bare = profile_with_pipe_dir(None);
        assert_eq!(resolve_pipe_path(Path::new("c.sock"), &bare), PathBuf::from("c.sock"));
    }

    #[test]
    fn tcp_bind_uses_profile_default_host() {
        let profile = Profile::bootstrap();
        let listener = ListenerFactory
            .bind(&ListenerParams::tcp(None, 0), &profile)
            .expect("tcp listener should bind");
        assert_eq!(listener.kind(), ListenerKind::Tcp);
        assert!(listener.address().starts_with("127.0.0.1:"));
        assert!(listener.accept_nonblocking().unwrap().is_none());
    }

    #[test]
    fn tcp_bind_conflict_is_bind_error() {
        let profile = Profile::bootstrap();
        let first = ListenerFactory
            .bind(&ListenerParams::tcp(Some("127.0.0.1"), 0), &profile)
            .unwrap();
        let port: u16 = first.address().rsplit(':').next().unwrap().parse().unwrap();
        let err = ListenerFactory
            .bind(&ListenerParams::tcp(Some("127.0.0.1"), port), &profile)
            .unwrap_err();
        assert!(matches!(err, TransportError::Bind { .. }));
    }

    #[test]
    #[cfg(unix)]
    fn pipe_bind_accepts_agents() {
        let dir = std::env::temp_dir().join(format!(
            "agentlink-listener-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let profile = profile_with_pipe_dir(Some(dir.clone()));

        let listener = ListenerFactory
            .bind(&ListenerParams::pipe("agent.sock"), &profile)
            .expect("pipe listener should bind");
        assert_eq!(listener.address(), dir.join("agent.sock").display().to_string());

        let mut client = UnixSocketListener::connect(dir.join("agent.sock")).unwrap();
        let mut accepted = None;
        for _ in 0..100 {
            if let Some(conn) = listener.accept_nonblocking().unwrap() {
                accepted = Some(conn);
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let mut server = accepted.expect("pending agent should be accepted");

        client.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
