use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use agentlink_server::{EchoHandler, EnvelopeHandler, LoggingHandler, ServeConfig, Server};
use tracing::{debug, info};

use crate::cmd::console::{self, ConsoleOutcome};
use crate::cmd::{HandlerKind, ServeArgs};
use crate::exit::{server_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_jobs, OutputFormat};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let handler: Arc<dyn EnvelopeHandler> = match args.handler {
        HandlerKind::Echo => Arc::new(EchoHandler),
        HandlerKind::Log => Arc::new(LoggingHandler),
    };
    let server = Server::new(handler);

    if let Some(path) = &args.config {
        let config = ServeConfig::load(path).map_err(|err| server_error("config load failed", err))?;
        let started = server
            .bootstrap(&config)
            .map_err(|err| server_error("bootstrap failed", err))?;
        if !started.is_empty() {
            print_jobs(&started, format);
        }
    }

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut lines = if args.no_console {
        None
    } else {
        Some(spawn_console_reader()?)
    };
    info!("server ready");

    while running.load(Ordering::SeqCst) {
        let Some(rx) = &lines else {
            thread::sleep(POLL_INTERVAL);
            continue;
        };
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(line) => match console::execute(&line, &server, format) {
                Ok(ConsoleOutcome::Quit) => break,
                Ok(ConsoleOutcome::Continue) => {}
                Err(err) => eprintln!("error: {err}"),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // Stdin closed; keep serving until interrupted.
                debug!("console input closed");
                lines = None;
            }
        }
    }

    let stopped = server.shutdown();
    info!(jobs = stopped.len(), "server stopped");
    Ok(SUCCESS)
}

fn spawn_console_reader() -> CliResult<Receiver<String>> {
    let (tx, rx) = mpsc::channel();
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        })
        .map_err(|err| CliError::new(INTERNAL, format!("console reader setup failed: {err}")))?;
    Ok(rx)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
