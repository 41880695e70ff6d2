use std::fs;
use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use agentlink_frame::{
    Envelope, EnvelopeReader, EnvelopeWriter, FrameConfig, FrameError, DEFAULT_MAX_FRAME,
};
use agentlink_transport::{TcpConnector, TransportRegistry, TCP_SCHEME};
use tracing::debug;

use crate::cmd::SendArgs;
use crate::exit::{frame_error, transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_envelope, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let payload = resolve_payload(&args)?;

    let mut registry = TransportRegistry::with_defaults();
    registry.register(TCP_SCHEME, Arc::new(TcpConnector::with_timeout(timeout)));
    let conn = registry
        .connect(&args.uri)
        .map_err(|err| transport_error("connect failed", err))?;
    let peer = conn.remote_addr().to_string();

    let config = FrameConfig {
        max_frame_size: args.max_frame_size.unwrap_or(DEFAULT_MAX_FRAME),
        read_timeout: Some(timeout),
        write_timeout: Some(timeout),
    };
    let read_half = conn
        .try_clone()
        .map_err(|err| transport_error("connect failed", err))?;
    let mut writer = EnvelopeWriter::with_config_conn(conn, config.clone())
        .map_err(|err| frame_error("connect failed", err))?;

    let envelope = Envelope::new(args.msg_type, payload).with_id(args.id);
    writer
        .write_envelope(&envelope)
        .map_err(|err| frame_error("send failed", err))?;
    debug!(%peer, id = envelope.id, msg_type = envelope.msg_type, "envelope sent");

    if args.wait {
        let mut reader = EnvelopeReader::with_config_conn(read_half, config)
            .map_err(|err| frame_error("receive failed", err))?;
        let reply =
            wait_for_reply(&mut reader, args.id).map_err(|err| frame_error("receive failed", err))?;
        print_envelope(&reply, &peer, format);
    }

    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path).map_err(|err| {
            crate::exit::io_error(&format!("failed reading {}", path.display()), err)
        });
    }
    Ok(Vec::new())
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Read until the envelope answering `id` arrives.
fn wait_for_reply<R: Read>(reader: &mut EnvelopeReader<R>, id: u64) -> Result<Envelope, FrameError> {
    loop {
        let envelope = reader.read_envelope()?;
        if envelope.id == id {
            return Ok(envelope);
        }
        debug!(expected = id, got = envelope.id, "skipping unrelated envelope");
    }
}
