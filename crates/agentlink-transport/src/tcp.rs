use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::connection::Connection;
use crate::error::{Result, TransportError};

/// TCP listener for network-facing jobs.
pub struct TcpSocketListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl TcpSocketListener {
    /// Bind to `host:port`. Port 0 picks an ephemeral port.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let address = format!("{host}:{port}");
        let listener = TcpListener::bind((host, port)).map_err(|source| TransportError::Bind {
            address: address.clone(),
            source,
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind { address, source })?;

        info!(%local_addr, "listening on tcp");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Switch the listening socket between blocking and non-blocking accept.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(TransportError::Io)
    }

    /// Accept an incoming connection. The returned stream is blocking.
    pub fn accept(&self) -> Result<Connection> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(false)?;
        let _ = stream.set_nodelay(true);
        debug!(%peer, "accepted tcp connection");
        Ok(Connection::from_tcp(stream, peer.to_string()))
    }

    /// Connect to `address` (anything `ToSocketAddrs` accepts as a string).
    ///
    /// With a timeout, each resolved address is tried in order until one
    /// connects.
    pub fn connect(address: &str, timeout: Option<Duration>) -> Result<Connection> {
        let connect_err = |source| TransportError::Connect {
            address: address.to_string(),
            source,
        };

        let stream = match timeout {
            None => TcpStream::connect(address).map_err(connect_err)?,
            Some(timeout) => {
                let mut last_err = None;
                let mut connected = None;
                for addr in address.to_socket_addrs().map_err(connect_err)? {
                    match TcpStream::connect_timeout(&addr, timeout) {
                        Ok(stream) => {
                            connected = Some(stream);
                            break;
                        }
                        Err(err) => last_err = Some(err),
                    }
                }
                match connected {
                    Some(stream) => stream,
                    None => {
                        return Err(connect_err(last_err.unwrap_or_else(|| {
                            std::io::Error::new(
                                std::io::ErrorKind::AddrNotAvailable,
                                "address resolved to nothing",
                            )
                        })))
                    }
                }
            }
        };
        let _ = stream.set_nodelay(true);
        let remote = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| address.to_string());
        debug!(%remote, "connected over tcp");
        Ok(Connection::from_tcp(stream, remote))
    }

    /// The bound local address (with the real port when 0 was requested).
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

impl std::fmt::Debug for TcpSocketListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpSocketListener")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
