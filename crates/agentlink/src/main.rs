mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "agentlink", version, about = "Agent listener jobs and envelope transport")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true, env = "AGENTLINK_FORMAT")]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(
        long,
        value_name = "FORMAT",
        default_value = "text",
        global = true,
        env = "AGENTLINK_LOG_FORMAT"
    )]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(
        long,
        value_name = "LEVEL",
        default_value = "info",
        global = true,
        env = "AGENTLINK_LOG_LEVEL"
    )]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    match cmd::run(cli.command, format) {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "agentlink",
            "send",
            "tcp://127.0.0.1:8443",
            "--type",
            "7",
            "--data",
            "hello",
            "--wait",
        ])
        .expect("send args should parse");

        match cli.command {
            Command::Send(args) => {
                assert_eq!(args.msg_type, 7);
                assert!(args.wait);
                assert_eq!(args.data.as_deref(), Some("hello"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_conflicting_payload_args() {
        let err = Cli::try_parse_from([
            "agentlink",
            "send",
            "tcp://127.0.0.1:1",
            "--json",
            "{\"x\":1}",
            "--data",
            "hello",
        ])
        .expect_err("conflicting args should fail");

        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "agentlink",
            "serve",
            "--handler",
            "log",
            "--format",
            "pretty",
            "--log-level",
            "debug",
        ])
        .expect("serve args should parse");

        assert_eq!(cli.format, Some(OutputFormat::Pretty));
        assert_eq!(cli.log_level, LogLevel::Debug);
        assert!(matches!(
            cli.command,
            Command::Serve(cmd::ServeArgs { handler: cmd::HandlerKind::Log, .. })
        ));
    }

    #[test]
    fn parses_profile_check() {
        let cli = Cli::try_parse_from(["agentlink", "profile", "check", "lab.json"])
            .expect("profile check should parse");
        assert!(matches!(
            cli.command,
            Command::Profile(cmd::ProfileCommand::Check(_))
        ));
    }
}
