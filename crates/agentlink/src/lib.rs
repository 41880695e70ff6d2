//! Listener jobs and length-prefixed envelope transport for remote agents.
//!
//! agentlink lets an operator run listeners that agent processes connect
//! to, and exchanges opaque envelopes with those agents over named pipes
//! (Unix domain sockets on Unix) or TCP.
//!
//! # Crate Structure
//!
//! - [`transport`]: connections, listeners and the scheme-keyed connector registry
//! - [`frame`]: the envelope codec and length-prefixed framing
//! - [`server`]: profiles, listener jobs and the operator surface (behind `server` feature)

/// Re-export transport types.
pub mod transport {
    pub use agentlink_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use agentlink_frame::*;
}

/// Re-export server types (requires `server` feature).
#[cfg(feature = "server")]
pub mod server {
    pub use agentlink_server::*;
}
