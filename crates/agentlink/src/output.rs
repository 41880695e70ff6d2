use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use agentlink_frame::Envelope;
use agentlink_server::{JobSnapshot, ProfileDetails};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_jobs(jobs: &[JobSnapshot], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(jobs),
        OutputFormat::Table => {
            if jobs.is_empty() {
                println!("no active jobs");
                return;
            }
            let mut table = table();
            table.set_header(vec![
                "ID", "KIND", "ADDRESS", "PROFILE", "OWNER", "STATE", "CONNS", "ERROR",
            ]);
            for job in jobs {
                table.add_row(vec![
                    job.id.to_string(),
                    job.kind.to_string(),
                    job.address.clone().unwrap_or_default(),
                    job.profile.clone(),
                    job.owner.clone().unwrap_or_default(),
                    job.state.to_string(),
                    format!("{}/{}", job.active_connections, job.accepted_connections),
                    job.error.clone().unwrap_or_default(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for job in jobs {
                println!("{}", job_line(job));
            }
        }
    }
}

pub fn print_job(job: &JobSnapshot, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(job),
        _ => print_jobs(std::slice::from_ref(job), format),
    }
}

fn job_line(job: &JobSnapshot) -> String {
    let mut line = format!(
        "job={} kind={} address={} profile={} state={} connections={}/{}",
        job.id,
        job.kind,
        job.address.as_deref().unwrap_or("-"),
        job.profile,
        job.state,
        job.active_connections,
        job.accepted_connections
    );
    if let Some(owner) = &job.owner {
        line.push_str(&format!(" owner={owner}"));
    }
    if let Some(error) = &job.error {
        line.push_str(&format!(" error=\"{error}\""));
    }
    line
}

pub fn print_profile(profile: &ProfileDetails, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(profile),
        OutputFormat::Table => {
            let config = &profile.config;
            let mut table = table();
            table.set_header(vec!["FIELD", "VALUE"]);
            table.add_row(vec!["name".to_string(), profile.name.clone()]);
            table.add_row(vec![
                "source".to_string(),
                profile
                    .source
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "built-in".to_string()),
            ]);
            table.add_row(vec!["max_frame_size".to_string(), config.max_frame_size.to_string()]);
            table.add_row(vec!["read_timeout_ms".to_string(), optional(config.read_timeout_ms)]);
            table.add_row(vec!["write_timeout_ms".to_string(), optional(config.write_timeout_ms)]);
            table.add_row(vec!["max_connections".to_string(), optional(config.max_connections)]);
            table.add_row(vec!["default_host".to_string(), config.default_host.clone()]);
            table.add_row(vec![
                "pipe_dir".to_string(),
                config
                    .pipe_dir
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "-".to_string()),
            ]);
            for (key, value) in &config.options {
                table.add_row(vec![format!("options.{key}"), value.to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            let config = &profile.config;
            println!(
                "profile={} max_frame_size={} read_timeout_ms={} write_timeout_ms={} max_connections={} default_host={}",
                profile.name,
                config.max_frame_size,
                optional(config.read_timeout_ms),
                optional(config.write_timeout_ms),
                optional(config.max_connections),
                config.default_host
            );
        }
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn print_profile_names(names: &[String], format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(names),
        OutputFormat::Table => {
            let mut table = table();
            table.set_header(vec!["PROFILE"]);
            for name in names {
                table.add_row(vec![name.clone()]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for name in names {
                println!("{name}");
            }
        }
    }
}

#[derive(Serialize)]
struct EnvelopeOutput<'a> {
    id: u64,
    msg_type: u32,
    unknown_type: bool,
    size: usize,
    data: String,
    peer: &'a str,
    timestamp: String,
}

pub fn print_envelope(envelope: &Envelope, peer: &str, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(&EnvelopeOutput {
            id: envelope.id,
            msg_type: envelope.msg_type,
            unknown_type: envelope.unknown_type,
            size: envelope.data.len(),
            data: payload_preview(envelope.data.as_ref()),
            peer,
            timestamp: now_unix_seconds(),
        }),
        OutputFormat::Table => {
            let mut table = table();
            table
                .set_header(vec!["ID", "TYPE", "SIZE", "PEER", "DATA"])
                .add_row(vec![
                    envelope.id.to_string(),
                    type_label(envelope),
                    envelope.data.len().to_string(),
                    peer.to_string(),
                    payload_preview(envelope.data.as_ref()),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "id={} type={} size={} peer={} data={}",
                envelope.id,
                type_label(envelope),
                envelope.data.len(),
                peer,
                payload_preview(envelope.data.as_ref())
            );
        }
    }
}

fn type_label(envelope: &Envelope) -> String {
    if envelope.unknown_type {
        format!("{} (unknown)", envelope.msg_type)
    } else {
        envelope.msg_type.to_string()
    }
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_preview_marks_binary() {
        assert_eq!(payload_preview(b"hello"), "hello");
        assert_eq!(payload_preview(&[0xff, 0xfe]), "<binary 2 bytes>");
    }

    #[test]
    fn unknown_type_is_labelled() {
        let reply = Envelope::new(9, "x").unknown_type_reply();
        assert_eq!(type_label(&reply), "9 (unknown)");
    }
}
