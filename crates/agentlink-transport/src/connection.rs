use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use crate::error::Result;

/// A connected duplex byte stream implementing Read + Write.
///
/// This is the fundamental I/O type returned by listeners and connectors.
/// A `Connection` is owned by exactly one handling unit; the owning job only
/// keeps a [`ShutdownHandle`] so it can cancel blocked I/O.
pub struct Connection {
    inner: StreamInner,
    remote: String,
}

enum StreamInner {
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
    Tcp(TcpStream),
}

impl StreamInner {
    fn try_clone(&self) -> std::io::Result<Self> {
        match self {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.try_clone().map(StreamInner::Unix),
            StreamInner::Tcp(stream) => stream.try_clone().map(StreamInner::Tcp),
        }
    }

    fn shutdown(&self) -> std::io::Result<()> {
        let result = match self {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
            StreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            // Peer already gone; the stream is as closed as it will get.
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            other => other,
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.read(buf),
            StreamInner::Tcp(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.write(buf),
            StreamInner::Tcp(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.flush(),
            StreamInner::Tcp(stream) => stream.flush(),
        }
    }
}

impl Connection {
    /// Wrap a Unix domain socket stream.
    #[cfg(unix)]
    pub(crate) fn from_unix(stream: std::os::unix::net::UnixStream, remote: String) -> Self {
        Self {
            inner: StreamInner::Unix(stream),
            remote,
        }
    }

    /// Wrap a TCP stream.
    pub(crate) fn from_tcp(stream: TcpStream, remote: String) -> Self {
        Self {
            inner: StreamInner::Tcp(stream),
            remote,
        }
    }

    /// Create a connected pair of in-process connections.
    #[cfg(unix)]
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = std::os::unix::net::UnixStream::pair()?;
        Ok((
            Self::from_unix(left, "pair:left".to_string()),
            Self::from_unix(right, "pair:right".to_string()),
        ))
    }

    /// Remote address of the peer, formatted for diagnostics.
    pub fn remote_addr(&self) -> &str {
        &self.remote
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(_) => "unix-domain-socket",
            StreamInner::Tcp(_) => "tcp",
        }
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            StreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        match &self.inner {
            #[cfg(unix)]
            StreamInner::Unix(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
            StreamInner::Tcp(stream) => stream.set_write_timeout(timeout).map_err(Into::into),
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    ///
    /// Used to split one connection into a reader half and a writer half
    /// inside the same handling unit.
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            inner: self.inner.try_clone()?,
            remote: self.remote.clone(),
        })
    }

    /// Obtain a handle that can only shut this connection down.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            inner: self.inner.try_clone()?,
            remote: self.remote.clone(),
        })
    }

    /// Shut down both directions. Blocked reads and writes on any clone of
    /// this connection return promptly.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().map_err(Into::into)
    }

    /// Get the credentials of the connected peer (Linux Unix sockets only).
    ///
    /// Returns `(uid, gid, pid)` via `SO_PEERCRED`, or `None` if unavailable.
    #[cfg(target_os = "linux")]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        use std::os::fd::AsRawFd;

        let fd = match &self.inner {
            StreamInner::Unix(stream) => stream.as_raw_fd(),
            StreamInner::Tcp(_) => return None,
        };

        let mut cred = libc::ucred {
            pid: 0,
            uid: 0,
            gid: 0,
        };
        let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

        // SAFETY: `cred` and `len` are valid writable pointers for the provided sizes,
        // and `fd` is an open Unix socket descriptor owned by this connection.
        let rc = unsafe {
            libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_PEERCRED,
                (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
                &mut len,
            )
        };

        if rc == 0 && len as usize == std::mem::size_of::<libc::ucred>() {
            Some((cred.uid, cred.gid, cred.pid as u32))
        } else {
            None
        }
    }

    /// Get the credentials of the connected peer.
    ///
    /// Returns `None` on platforms that do not expose peer credentials.
    #[cfg(not(target_os = "linux"))]
    pub fn peer_credentials(&self) -> Option<(u32, u32, u32)> {
        None
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("type", &self.transport_name())
            .field("remote", &self.remote)
            .finish()
    }
}

/// Cancellation capability for a [`Connection`] owned elsewhere.
///
/// Holds a duplicated descriptor but exposes no I/O; the only thing it can do
/// is shut the underlying stream down.
pub struct ShutdownHandle {
    inner: StreamInner,
    remote: String,
}

impl ShutdownHandle {
    /// Shut down both directions of the connection.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().map_err(Into::into)
    }

    /// Remote address of the connection this handle controls.
    pub fn remote_addr(&self) -> &str {
        &self.remote
    }
}

impl std::fmt::Debug for ShutdownHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownHandle")
            .field("remote", &self.remote)
            .finish()
    }
}
