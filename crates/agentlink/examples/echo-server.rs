//! Echo server: runs one pipe listener job and answers type 1 envelopes.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send namedpipe://tmp/agentlink-echo-example/echo.sock \
//!     --type 1 --data hello --wait

use std::sync::Arc;

use agentlink::server::{ListenerParams, Server, TypeRouter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join("agentlink-echo-example");
    std::fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("echo.sock");

    let router = TypeRouter::new().route(1, |ctx, envelope| {
        eprintln!(
            "job {} connection {}: {} bytes",
            ctx.job_id,
            ctx.connection_id,
            envelope.data.len()
        );
        Some(envelope.reply(1, envelope.data.clone()))
    });
    let server = Server::new(Arc::new(router));

    let job = server.start_listener(ListenerParams::pipe(&sock_path))?;
    eprintln!("job {} listening on {}", job.id, sock_path.display());
    eprintln!("press enter to stop");

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    let stopped = server.stop_listener(job.id)?;
    eprintln!(
        "job {} stopped after {} connections",
        stopped.id, stopped.accepted_connections
    );
    let _ = std::fs::remove_dir_all(&sock_dir);
    Ok(())
}
