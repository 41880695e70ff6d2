//! Duplex connection and connector layer for agentlink.
//!
//! Provides a unified [`Connection`] over the supported stream transports:
//! - Unix domain sockets (the `namedpipe` transport on Linux/macOS)
//! - TCP
//!
//! and a [`TransportRegistry`] mapping URI schemes to [`Connector`]s. This is
//! the lowest layer of agentlink; framing and listener jobs build on it.

pub mod connection;
pub mod connector;
pub mod error;
pub mod registry;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

pub use connection::{Connection, ShutdownHandle};
pub use connector::{pipe_address, Connector, PipeConnector, TcpConnector, PIPE_SCHEME, TCP_SCHEME};
pub use error::{Result, TransportError};
pub use registry::TransportRegistry;
pub use tcp::TcpSocketListener;

#[cfg(unix)]
pub use uds::UnixSocketListener;
