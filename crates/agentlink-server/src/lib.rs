//! Listener jobs and transport profiles for agentlink.
//!
//! A [`Server`] owns a [`ProfileStore`] of named transport configurations
//! and a [`JobRegistry`] of listener jobs. Each job binds a TCP or pipe
//! listener, accepts agent connections, and runs every connection's
//! envelopes through a shared [`EnvelopeHandler`].

pub mod config;
pub mod error;
pub mod handler;
pub mod jobs;
pub mod listener;
pub mod profiles;
pub mod server;

pub use config::{ProfileImport, ServeConfig};
pub use error::{JobError, ProfileError, Result, ServerError};
pub use handler::{
    serve_connection, ConnectionContext, EchoHandler, EnvelopeHandler, LoggingHandler, TypeRouter,
};
pub use jobs::{
    JobId, JobRegistry, JobSnapshot, JobState, ACCEPT_POLL_INTERVAL, CONNECTION_DRAIN_TIMEOUT,
};
pub use listener::{BoundListener, ListenerFactory, ListenerKind, ListenerParams};
pub use profiles::{
    resolve_name, Profile, ProfileStore, TransportConfig, DEFAULT_PROFILE_NAME,
    MAX_PROFILE_FILE_SIZE,
};
pub use server::{ProfileDetails, Server};
