//! Operator commands read line by line while `serve` runs.

use std::path::PathBuf;

use agentlink_server::{JobId, ListenerKind, ListenerParams, Server};
use clap::error::ErrorKind;
use clap::{Args, Parser, Subcommand};

use crate::exit::{job_error, profile_error, CliError, CliResult, USAGE};
use crate::output::{print_job, print_jobs, print_profile, print_profile_names, OutputFormat};

#[derive(Parser, Debug)]
#[command(
    name = "console",
    no_binary_name = true,
    disable_version_flag = true,
    subcommand_required = true
)]
struct ConsoleLine {
    #[command(subcommand)]
    command: ConsoleCommand,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ConsoleCommand {
    /// List jobs.
    Jobs,
    /// Start a listener job.
    Listen(ListenArgs),
    /// Stop a job.
    Stop {
        id: JobId,
    },
    /// Import, show or list profiles.
    #[command(subcommand)]
    Profiles(ProfilesCommand),
    /// Stop every job and exit.
    #[command(alias = "exit")]
    Quit,
}

#[derive(Args, Debug, PartialEq)]
pub struct ListenArgs {
    /// Listener kind: tcp or pipe.
    pub kind: ListenerKind,
    #[arg(long)]
    pub host: Option<String>,
    #[arg(long, default_value_t = 0)]
    pub port: u16,
    #[arg(long)]
    pub path: Option<PathBuf>,
    /// Profile name; the default profile when omitted.
    #[arg(long, default_value = "")]
    pub profile: String,
    #[arg(long)]
    pub owner: Option<String>,
}

impl From<ListenArgs> for ListenerParams {
    fn from(args: ListenArgs) -> Self {
        ListenerParams {
            kind: args.kind,
            host: args.host,
            port: args.port,
            path: args.path,
            profile: args.profile,
            owner: args.owner,
        }
    }
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum ProfilesCommand {
    /// Import a profile file.
    Import {
        file: PathBuf,
        /// Profile name; the default profile when omitted.
        #[arg(long, default_value = "")]
        name: String,
        /// Replace an existing profile of the same name.
        #[arg(long)]
        overwrite: bool,
    },
    /// Show one profile.
    Show {
        #[arg(default_value = "")]
        name: String,
    },
    /// List profile names.
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleOutcome {
    Continue,
    Quit,
}

/// Parse one console line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> CliResult<Option<ConsoleCommand>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    match ConsoleLine::try_parse_from(line.split_whitespace()) {
        Ok(parsed) => Ok(Some(parsed.command)),
        Err(err) if err.kind() == ErrorKind::DisplayHelp => {
            println!("{}", err.render());
            Ok(None)
        }
        Err(err) => Err(CliError::new(
            USAGE,
            err.render().to_string().trim_end().to_string(),
        )),
    }
}

/// Parse and run one console line against `server`.
pub fn execute(line: &str, server: &Server, format: OutputFormat) -> CliResult<ConsoleOutcome> {
    match parse(line)? {
        Some(command) => run(command, server, format),
        None => Ok(ConsoleOutcome::Continue),
    }
}

fn run(command: ConsoleCommand, server: &Server, format: OutputFormat) -> CliResult<ConsoleOutcome> {
    match command {
        ConsoleCommand::Jobs => print_jobs(&server.list_jobs(), format),
        ConsoleCommand::Listen(args) => {
            let job = server
                .start_listener(args.into())
                .map_err(|err| job_error("listen failed", err))?;
            print_job(&job, format);
        }
        ConsoleCommand::Stop { id } => {
            let job = server
                .stop_listener(id)
                .map_err(|err| job_error("stop failed", err))?;
            print_job(&job, format);
        }
        ConsoleCommand::Profiles(ProfilesCommand::Import {
            file,
            name,
            overwrite,
        }) => {
            let profile = server
                .import_profile(&name, &file, overwrite)
                .map_err(|err| profile_error("import failed", err))?;
            print_profile(&profile, format);
        }
        ConsoleCommand::Profiles(ProfilesCommand::Show { name }) => {
            let profile = server
                .get_profile(&name)
                .map_err(|err| profile_error("show failed", err))?;
            print_profile(&profile, format);
        }
        ConsoleCommand::Profiles(ProfilesCommand::List) => {
            print_profile_names(&server.profile_names(), format)
        }
        ConsoleCommand::Quit => return Ok(ConsoleOutcome::Quit),
    }
    Ok(ConsoleOutcome::Continue)
}
