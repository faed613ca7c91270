use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugwire_client::{
    Client, ClientError, ClientListener, CompilerMessage, ConnectionState, MessageKind,
};

use crate::cmd::{worker, ListenArgs, RunContext};
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::print_message;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

enum Event {
    Message(CompilerMessage),
    Failed(String),
}

/// Why a session with one client ended.
enum SessionEnd {
    Disconnected,
    CountReached,
    Interrupted,
}

pub fn run(args: ListenArgs, ctx: RunContext) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone(), args.path.clone())?;

    let listener = ClientListener::bind(&args.path)
        .map_err(|err| client_error("bind failed", err))?
        .with_config(ctx.client_config::<CompilerMessage>("listen"));
    tracing::info!(path = %listener.path().display(), "listening");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        let client: Client<CompilerMessage> = listener
            .accept()
            .map_err(|err| client_error("accept failed", err))?;
        if !running.load(Ordering::SeqCst) {
            // The interrupt handler's own wake-up connection.
            break;
        }
        tracing::info!(client = client.name(), "client connected");

        match serve(Arc::new(client), &args, ctx, &running, &mut printed)? {
            SessionEnd::Disconnected => continue,
            SessionEnd::CountReached | SessionEnd::Interrupted => break,
        }
    }

    Ok(SUCCESS)
}

fn serve(
    client: Arc<Client<CompilerMessage>>,
    args: &ListenArgs,
    ctx: RunContext,
    running: &AtomicBool,
    printed: &mut usize,
) -> CliResult<SessionEnd> {
    let (tx, rx) = mpsc::channel();
    register_handlers(&client, tx, args.reply);
    client
        .start()
        .map_err(|err| client_error("start failed", err))?;

    let end = loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Event::Message(message)) => {
                print_message(&message, client.name(), ctx.format);
                *printed = printed.saturating_add(1);
                if args.count.is_some_and(|count| *printed >= count) {
                    break SessionEnd::CountReached;
                }
                if message.kind == MessageKind::Exit {
                    break SessionEnd::Disconnected;
                }
            }
            Ok(Event::Failed(message)) => {
                tracing::warn!(client = client.name(), "{message}");
            }
            Err(RecvTimeoutError::Timeout) => {
                if client.state() == ConnectionState::Closed {
                    break SessionEnd::Disconnected;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break SessionEnd::Disconnected,
        }

        if !running.load(Ordering::SeqCst) {
            break SessionEnd::Interrupted;
        }
    };

    if let Err(err) = client.stop_after_drain(Duration::from_secs(1)) {
        tracing::debug!(client = client.name(), error = %err, "reply queue not drained");
    }
    tracing::info!(client = client.name(), "client disconnected");
    Ok(end)
}

fn register_handlers(
    client: &Arc<Client<CompilerMessage>>,
    tx: mpsc::Sender<Event>,
    reply: bool,
) {
    let messages = Mutex::new(tx.clone());
    let replier = Arc::downgrade(client);
    client.on_message(move |message: &CompilerMessage| {
        if reply && message.kind == MessageKind::Compile {
            if let Some(client) = replier.upgrade() {
                client.push_message(worker::compile(message));
            }
        }
        if let Ok(tx) = messages.lock() {
            let _ = tx.send(Event::Message(message.clone()));
        }
    });

    let errors = Mutex::new(tx);
    client.on_error(move |err: &ClientError| {
        if let Ok(tx) = errors.lock() {
            let _ = tx.send(Event::Failed(format!("connection failed: {err}")));
        }
    });
}

/// On interrupt, clear `running` and connect to `wake_path` once so a
/// blocked `accept` returns.
fn install_ctrlc_handler(running: Arc<AtomicBool>, wake_path: PathBuf) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
        if let Err(err) = UnixStream::connect(&wake_path) {
            tracing::debug!(error = %err, "accept wake-up connection failed");
        }
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
