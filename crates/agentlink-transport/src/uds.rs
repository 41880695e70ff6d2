use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{Result, TransportError};

/// Unix domain socket listener backing the `namedpipe` transport on Unix.
///
/// The socket file is removed on drop, provided the path still refers to the
/// socket this listener created.
pub struct UnixSocketListener {
    listener: UnixListener,
    path: PathBuf,
    created_inode: Option<(u64, u64)>,
    accepted: AtomicU64,
}

impl UnixSocketListener {
    /// Default permission mode for created socket paths.
    pub const DEFAULT_SOCKET_MODE: u32 = 0o600;
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Bind and listen on a filesystem-path Unix domain socket.
    ///
    /// An existing socket at the path is removed when nothing listens on it;
    /// a live one fails with `AddrInUse`. Any other file type is an error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, Self::DEFAULT_SOCKET_MODE)
    }

    /// Bind with an explicit permission mode for the socket file.
    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        if path.exists() {
            let metadata = std::fs::symlink_metadata(&path)
                .map_err(|e| TransportError::bind_path(&path, e))?;
            if !metadata.file_type().is_socket() {
                return Err(TransportError::bind_path(
                    &path,
                    std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        "existing path is not a unix socket",
                    ),
                ));
            }
            match UnixStream::connect(&path) {
                Ok(_) => {
                    return Err(TransportError::bind_path(
                        &path,
                        std::io::Error::new(
                            std::io::ErrorKind::AddrInUse,
                            "socket is in use by a live listener",
                        ),
                    ));
                }
                Err(err) if err.kind() == std::io::ErrorKind::ConnectionRefused => {
                    debug!(?path, "removing stale socket");
                    std::fs::remove_file(&path)
                        .map_err(|e| TransportError::bind_path(&path, e))?;
                }
                Err(err) => return Err(TransportError::bind_path(&path, err)),
            }
        }

        let listener =
            UnixListener::bind(&path).map_err(|e| TransportError::bind_path(&path, e))?;

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(|e| TransportError::bind_path(&path, e))?;
        let created = std::fs::symlink_metadata(&path)
            .map_err(|e| TransportError::bind_path(&path, e))?;

        info!(?path, "listening on unix domain socket");

        Ok(Self {
            listener,
            path,
            created_inode: Some((created.dev(), created.ino())),
            accepted: AtomicU64::new(0),
        })
    }

    /// Switch the listening socket between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(TransportError::Io)
    }

    /// Accept an incoming connection.
    ///
    /// The returned connection is always in blocking mode, even when the
    /// listener itself is non-blocking. With a non-blocking listener and no
    /// pending client, the error is `Accept` with kind `WouldBlock`.
    pub fn accept(&self) -> Result<Connection> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(false)?;
        let seq = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        // Unix clients are normally unnamed; identify them by socket and order.
        let remote = format!("unix:{}#{seq}", self.path.display());
        debug!(%remote, "accepted connection");
        Ok(Connection::from_unix(stream, remote))
    }

    /// Connect to a listening Unix domain socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<Connection> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path).map_err(|e| TransportError::connect_path(path, e))?;
        debug!(?path, "connected to unix domain socket");
        Ok(Connection::from_unix(
            stream,
            format!("unix:{}", path.display()),
        ))
    }

    /// The path this socket is bound to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

impl Drop for UnixSocketListener {
    fn drop(&mut self) {
        let Some((expected_dev, expected_ino)) = self.created_inode else {
            return;
        };
        if let Ok(metadata) = std::fs::symlink_metadata(&self.path) {
            if metadata.file_type().is_socket()
                && metadata.dev() == expected_dev
                && metadata.ino() == expected_ino
            {
                debug!(path = ?self.path, "cleaning up socket file");
                let _ = std::fs::remove_file(&self.path);
            } else {
                debug!(
                    path = ?self.path,
                    "socket path identity changed; skipping cleanup"
                );
            }
        }
    }
}

impl std::fmt::Debug for UnixSocketListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixSocketListener")
            .field("path", &self.path)
            .finish()
    }
}
