//! Async agent: sends envelopes to a TCP listener with `EnvelopeCodec`.
//!
//! Start a server with a TCP job first:
//!   echo "listen tcp --port 8443" | cargo run --features cli -- serve
//!
//! Then:
//!   cargo run --example async-client --features async -- 127.0.0.1:8443

use agentlink::frame::{Envelope, EnvelopeCodec};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let address = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8443".to_string());
    let stream = TcpStream::connect(&address).await?;
    let mut framed = Framed::new(stream, EnvelopeCodec::default());

    for id in 1..=3u64 {
        framed
            .send(Envelope::new(1, format!("async hello {id}")).with_id(id))
            .await?;
        match framed.next().await {
            Some(reply) => {
                let reply = reply?;
                println!(
                    "reply id={} type={} data={}",
                    reply.id,
                    reply.msg_type,
                    String::from_utf8_lossy(&reply.data)
                );
            }
            None => {
                eprintln!("listener closed the connection");
                break;
            }
        }
    }
    Ok(())
}
