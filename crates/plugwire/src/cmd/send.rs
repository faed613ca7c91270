use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use plugwire_client::{
    connect_with_config, spawn_worker_with_config, Client, ClientError, CompilerMessage,
    MessageKind, RequestIds, SourceFile, WorkerProcess,
};

use crate::cmd::{RunContext, SendArgs};
use crate::exit::{client_error, io_error, CliError, CliResult, FAILURE, SUCCESS, TIMEOUT, USAGE};
use crate::output::print_message;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

enum Endpoint {
    Socket(Client<CompilerMessage>),
    Worker(WorkerProcess<CompilerMessage>),
}

impl Endpoint {
    fn client(&self) -> &Client<CompilerMessage> {
        match self {
            Self::Socket(client) => client,
            Self::Worker(worker) => worker.client(),
        }
    }

    fn shutdown(self) {
        self.client().push_message(CompilerMessage::exit());
        match self {
            Self::Socket(client) => {
                if let Err(err) = client.stop_after_drain(SHUTDOWN_GRACE) {
                    tracing::debug!(error = %err, "socket peer not drained");
                }
            }
            Self::Worker(mut worker) => match worker.shutdown(SHUTDOWN_GRACE) {
                Ok(Some(status)) => tracing::debug!(%status, "worker exited"),
                Ok(None) => tracing::warn!("worker killed after grace period"),
                Err(err) => tracing::warn!(error = %err, "worker shutdown failed"),
            },
        }
    }
}

enum Event {
    Message(CompilerMessage),
    Failed(String),
}

pub fn run(args: SendArgs, ctx: RunContext) -> CliResult<i32> {
    let timeout = parse_duration(&args.timeout)?;
    let sources = read_sources(&args.files)?;
    let endpoint = open_endpoint(&args, ctx)?;

    let (tx, rx) = mpsc::channel();
    let messages = Mutex::new(tx.clone());
    endpoint.client().on_message(move |msg: &CompilerMessage| {
        if let Ok(tx) = messages.lock() {
            let _ = tx.send(Event::Message(msg.clone()));
        }
    });
    let errors = Mutex::new(tx);
    endpoint.client().on_error(move |err: &ClientError| {
        if let Ok(tx) = errors.lock() {
            let _ = tx.send(Event::Failed(err.to_string()));
        }
    });

    endpoint
        .client()
        .start()
        .map_err(|err| client_error("start failed", err))?;

    let id = args.id.unwrap_or_else(|| RequestIds::new().next_id());
    let request = CompilerMessage::compile(id, sources);
    endpoint.client().push_message(request.clone());
    tracing::debug!(id, "compile request queued");

    let reply = wait_for_reply(&rx, &request, timeout);
    let peer = endpoint.client().name().to_string();
    endpoint.shutdown();

    let reply = reply?;
    print_message(&reply, &peer, ctx.format);
    match reply.kind {
        MessageKind::Assembly => Ok(SUCCESS),
        _ => Ok(FAILURE),
    }
}

fn open_endpoint(args: &SendArgs, ctx: RunContext) -> CliResult<Endpoint> {
    let config = ctx.client_config::<CompilerMessage>("send");
    if let Some(path) = &args.socket {
        let client = connect_with_config(path, config)
            .map_err(|err| client_error("connect failed", err))?;
        return Ok(Endpoint::Socket(client));
    }

    let Some((program, rest)) = args.command.split_first() else {
        return Err(CliError::new(
            USAGE,
            "either --socket or a worker command after `--` is required",
        ));
    };
    let mut command = Command::new(program);
    command.args(rest);
    let worker = spawn_worker_with_config(command, config)
        .map_err(|err| client_error("spawn failed", err))?;
    Ok(Endpoint::Worker(worker))
}

fn read_sources(paths: &[PathBuf]) -> CliResult<Vec<SourceFile>> {
    paths
        .iter()
        .map(|path| {
            let data = fs::read(path)
                .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
            let name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());
            Ok(SourceFile::new(name, data))
        })
        .collect()
}

trait EventSource {
    fn next_event(&self, timeout: Duration) -> Result<Event, RecvTimeoutError>;
}

impl EventSource for mpsc::Receiver<Event> {
    fn next_event(&self, timeout: Duration) -> Result<Event, RecvTimeoutError> {
        self.recv_timeout(timeout)
    }
}

/// Wait for the reply to `request`, skipping unrelated messages such as the
/// worker's `Ready` announcement.
fn wait_for_reply<S: EventSource>(
    events: &S,
    request: &CompilerMessage,
    timeout: Duration,
) -> CliResult<CompilerMessage> {
    let deadline = Instant::now() + timeout;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match events.next_event(remaining) {
            Ok(Event::Message(msg)) if msg.answers(request) => return Ok(msg),
            Ok(Event::Message(msg)) => {
                tracing::debug!(id = msg.id, kind = msg.kind.as_str(), "skipping message");
            }
            Ok(Event::Failed(message)) => {
                return Err(CliError::new(FAILURE, format!("receive failed: {message}")));
            }
            Err(RecvTimeoutError::Timeout) => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no reply to request {} within {timeout:?}", request.id),
                ));
            }
            Err(RecvTimeoutError::Disconnected) => {
                return Err(CliError::new(
                    FAILURE,
                    format!("connection closed before reply to request {}", request.id),
                ));
            }
        }
    }
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
