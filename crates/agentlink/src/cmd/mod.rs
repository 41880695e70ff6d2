use clap::{Args, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod console;
pub mod profile;
pub mod send;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the job server and read operator commands from stdin.
    Serve(ServeArgs),
    /// Send one envelope to a listener.
    Send(SendArgs),
    /// Work with profile files.
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Profile(command) => profile::run(command, format),
        Command::Version(args) => version::run(args, format),
    }
}

/// Built-in envelope handlers the server can run.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum HandlerKind {
    /// Reply with every envelope received.
    #[default]
    Echo,
    /// Log every envelope and never reply.
    Log,
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bootstrap file listing profiles to import and listeners to start.
    #[arg(long, value_name = "FILE", env = "AGENTLINK_CONFIG")]
    pub config: Option<PathBuf>,
    /// Envelope handler for accepted agents.
    #[arg(long, value_enum, default_value = "echo", env = "AGENTLINK_HANDLER")]
    pub handler: HandlerKind,
    /// Ignore stdin; run until interrupted.
    #[arg(long)]
    pub no_console: bool,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Listener URI, e.g. namedpipe://tmp/agent.sock or tcp://127.0.0.1:8443.
    pub uri: String,
    /// Envelope message type.
    #[arg(long = "type", short = 't', default_value = "1")]
    pub msg_type: u32,
    /// Envelope correlation id.
    #[arg(long, default_value = "1")]
    pub id: u64,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Wait for the reply carrying the same id and print it.
    #[arg(long)]
    pub wait: bool,
    /// Connect and reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s", env = "AGENTLINK_TIMEOUT")]
    pub timeout: String,
    /// Largest envelope accepted or sent, in bytes.
    #[arg(long, value_name = "BYTES")]
    pub max_frame_size: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Parse and validate a profile file without importing it.
    Check(ProfileCheckArgs),
}

#[derive(Args, Debug)]
pub struct ProfileCheckArgs {
    /// Profile JSON file.
    pub file: PathBuf,
    /// Name to report the profile under.
    #[arg(long, default_value = "")]
    pub name: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
