//! Per-connection envelope loop and the handler seam.

use std::collections::HashMap;

use agentlink_frame::{Envelope, EnvelopeReader, EnvelopeWriter, FrameConfig, FrameError};
use agentlink_transport::Connection;
use tracing::{debug, info, trace, warn};

use crate::jobs::JobId;

/// Identity of one accepted agent connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionContext {
    pub job_id: JobId,
    /// Sequence number of the connection within its job, from 1.
    pub connection_id: u64,
    pub remote: String,
    pub transport: &'static str,
    /// `(uid, gid, pid)` of the agent process, where the transport exposes it.
    pub peer_credentials: Option<(u32, u32, u32)>,
}

/// Business logic applied to every envelope an agent sends.
///
/// Implementations are shared by all connections of all jobs and are called
/// concurrently from connection threads.
pub trait EnvelopeHandler: Send + Sync {
    /// Handle one envelope; a returned envelope is written back as the reply.
    fn handle(&self, ctx: &ConnectionContext, envelope: Envelope) -> Option<Envelope>;

    fn on_connect(&self, _ctx: &ConnectionContext) {}

    fn on_disconnect(&self, _ctx: &ConnectionContext) {}
}

/// Replies with the envelope it received.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl EnvelopeHandler for EchoHandler {
    fn handle(&self, _ctx: &ConnectionContext, envelope: Envelope) -> Option<Envelope> {
        Some(envelope)
    }
}

/// Logs every envelope and never replies.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl EnvelopeHandler for LoggingHandler {
    fn handle(&self, ctx: &ConnectionContext, envelope: Envelope) -> Option<Envelope> {
        info!(
            job_id = ctx.job_id,
            peer = %ctx.remote,
            id = envelope.id,
            msg_type = envelope.msg_type,
            len = envelope.data.len(),
            "envelope received"
        );
        None
    }

    fn on_connect(&self, ctx: &ConnectionContext) {
        match ctx.peer_credentials {
            Some((uid, gid, pid)) => info!(
                job_id = ctx.job_id,
                peer = %ctx.remote,
                transport = ctx.transport,
                uid,
                gid,
                pid,
                "agent connected"
            ),
            None => info!(job_id = ctx.job_id, peer = %ctx.remote, transport = ctx.transport, "agent connected"),
        }
    }

    fn on_disconnect(&self, ctx: &ConnectionContext) {
        info!(job_id = ctx.job_id, peer = %ctx.remote, "agent disconnected");
    }
}

type Route = Box<dyn Fn(&ConnectionContext, Envelope) -> Option<Envelope> + Send + Sync>;

/// Dispatches envelopes by `msg_type`.
///
/// Types without a route are answered with an `unknown_type` reply carrying
/// the request's id and type.
#[derive(Default)]
pub struct TypeRouter {
    routes: HashMap<u32, Route>,
}

impl TypeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route<F>(mut self, msg_type: u32, f: F) -> Self
    where
        F: Fn(&ConnectionContext, Envelope) -> Option<Envelope> + Send + Sync + 'static,
    {
        self.routes.insert(msg_type, Box::new(f));
        self
    }
}

impl EnvelopeHandler for TypeRouter {
    fn handle(&self, ctx: &ConnectionContext, envelope: Envelope) -> Option<Envelope> {
        match self.routes.get(&envelope.msg_type) {
            Some(route) => route(ctx, envelope),
            None => {
                debug!(job_id = ctx.job_id, msg_type = envelope.msg_type, "no route for message type");
                Some(envelope.unknown_type_reply())
            }
        }
    }
}

impl std::fmt::Debug for TypeRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.routes.keys().collect();
        types.sort();
        f.debug_struct("TypeRouter").field("routes", &types).finish()
    }
}

/// Run the read/dispatch/reply loop for one connection until it closes.
///
/// A clean close on a frame boundary returns `Ok(())`. Envelopes that fail
/// to decode are skipped; any transport or framing error ends the loop and
/// is returned.
pub fn serve_connection(
    conn: Connection,
    ctx: &ConnectionContext,
    handler: &dyn EnvelopeHandler,
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let read_half = conn
        .try_clone()
        .map_err(|err| FrameError::Io(std::io::Error::other(err)))?;
    let mut reader = EnvelopeReader::with_config_conn(read_half, config.clone())?;
    let mut writer = EnvelopeWriter::with_config_conn(conn, config.clone())?;

    handler.on_connect(ctx);
    let result = loop {
        let envelope = match reader.read_envelope() {
            Ok(envelope) => envelope,
            Err(FrameError::ConnectionClosed) => break Ok(()),
            Err(FrameError::Codec(err)) => {
                warn!(job_id = ctx.job_id, peer = %ctx.remote, error = %err, "dropping undecodable envelope");
                continue;
            }
            Err(err) => break Err(err),
        };

        trace!(job_id = ctx.job_id, id = envelope.id, msg_type = envelope.msg_type, "dispatching envelope");
        if let Some(reply) = handler.handle(ctx, envelope) {
            if let Err(err) = writer.write_envelope(&reply) {
                break Err(err);
            }
        }
    };
    handler.on_disconnect(ctx);
    result
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    use agentlink_frame::encode_frame;
    use bytes::BytesMut;

    use super::*;

    fn ctx() -> ConnectionContext {
        ConnectionContext {
            job_id: 1,
            connection_id: 1,
            remote: "test".to_string(),
            transport: "unix-domain-socket",
            peer_credentials: None,
        }
    }

    #[derive(Default)]
    struct Counting {
        connects: AtomicUsize,
        disconnects: AtomicUsize,
        handled: AtomicUsize,
    }

    impl EnvelopeHandler for Counting {
        fn handle(&self, _ctx: &ConnectionContext, envelope: Envelope) -> Option<Envelope> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Some(envelope.reply(99, "ok"))
        }

        fn on_connect(&self, _ctx: &ConnectionContext) {
            self.connects.fetch_add(1, Ordering::SeqCst);
        }

        fn on_disconnect(&self, _ctx: &ConnectionContext) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn router_answers_unknown_types() {
        let router = TypeRouter::new().route(7, |_ctx, env| Some(env.reply(8, "pong")));

        let reply = router.handle(&ctx(), Envelope::new(7, "ping").with_id(3)).unwrap();
        assert_eq!((reply.id, reply.msg_type, reply.unknown_type), (3, 8, false));

        let reply = router.handle(&ctx(), Envelope::new(42, "?").with_id(4)).unwrap();
        assert_eq!((reply.id, reply.msg_type, reply.unknown_type), (4, 42, true));
    }

    #[test]
    #[cfg(unix)]
    fn echo_loop_replies_in_order_and_ends_cleanly() {
        let (server, client) = Connection::pair().unwrap();
        let worker = thread::spawn(move || {
            serve_connection(server, &ctx(), &EchoHandler, &FrameConfig::default())
        });

        let mut writer = EnvelopeWriter::new(client.try_clone().unwrap());
        let mut reader = EnvelopeReader::new(client);
        for i in 0..10u64 {
            writer.write_envelope(&Envelope::new(1, format!("m{i}")).with_id(i)).unwrap();
        }
        for i in 0..10u64 {
            let reply = reader.read_envelope().unwrap();
            assert_eq!(reply.id, i);
            assert_eq!(reply.data.as_ref(), format!("m{i}").as_bytes());
        }

        drop(writer);
        reader.get_ref().shutdown().unwrap();
        assert!(worker.join().unwrap().is_ok());
    }

    #[test]
    #[cfg(unix)]
    fn undecodable_envelope_is_skipped() {
        let (server, client) = Connection::pair().unwrap();
        let handler = Arc::new(Counting::default());
        let worker = {
            let handler = Arc::clone(&handler);
            thread::spawn(move || {
                serve_connection(server, &ctx(), handler.as_ref(), &FrameConfig::default())
            })
        };

        // A 3-byte frame is shorter than the envelope header.
        let mut raw = BytesMut::new();
        encode_frame(b"bad", &mut raw).unwrap();
        let mut stream = client.try_clone().unwrap();
        stream.write_all(&raw).unwrap();

        let mut writer = EnvelopeWriter::new(client.try_clone().unwrap());
        writer.write_envelope(&Envelope::new(1, "good").with_id(5)).unwrap();

        let mut reader = EnvelopeReader::new(client);
        let reply = reader.read_envelope().unwrap();
        assert_eq!((reply.id, reply.msg_type), (5, 99));

        reader.get_ref().shutdown().unwrap();
        worker.join().unwrap().unwrap();
        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        assert_eq!(handler.connects.load(Ordering::SeqCst), 1);
        assert_eq!(handler.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    #[cfg(unix)]
    fn truncated_frame_ends_connection_with_error() {
        let (server, client) = Connection::pair().unwrap();
        let worker = thread::spawn(move || {
            serve_connection(server, &ctx(), &EchoHandler, &FrameConfig::default())
        });

        let mut stream = client;
        stream.write_all(&[50, 0, 0, 0, 1, 2]).unwrap();
        stream.shutdown().unwrap();

        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Truncated { expected: 50, received: 2 }));
    }

    #[test]
    #[cfg(unix)]
    fn oversized_prefix_ends_connection() {
        let (server, client) = Connection::pair().unwrap();
        let config = FrameConfig {
            max_frame_size: 64,
            ..FrameConfig::default()
        };
        let worker = thread::spawn(move || serve_connection(server, &ctx(), &EchoHandler, &config));

        let mut stream = client;
        stream.write_all(&1024u32.to_le_bytes()).unwrap();

        let err = worker.join().unwrap().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 1024, max: 64 }));
    }
}
