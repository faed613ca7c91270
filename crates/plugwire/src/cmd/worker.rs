use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use plugwire_client::{
    connect_with_config, Client, CompilerMessage, ConnectionState, MessageKind, Payload,
};

use crate::cmd::{RunContext, WorkerArgs};
use crate::exit::{client_error, CliError, CliResult, FAILURE, INTERNAL, SUCCESS};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

enum Outcome {
    Exit,
    Failed(String),
}

pub fn run(args: WorkerArgs, ctx: RunContext) -> CliResult<i32> {
    let config = ctx.client_config::<CompilerMessage>("worker");
    let client = match &args.socket {
        Some(path) => {
            connect_with_config(path, config).map_err(|err| client_error("connect failed", err))?
        }
        None => Client::with_config(std::io::stdin(), std::io::stdout(), config),
    };
    let client = Arc::new(client);

    let (tx, rx) = mpsc::channel();
    register_handlers(&client, tx);

    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    client
        .start()
        .map_err(|err| client_error("start failed", err))?;
    client.push_message(CompilerMessage::ready());
    tracing::info!("worker ready");

    loop {
        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(Outcome::Exit) => {
                tracing::info!("exit requested by host");
                return finish(&client);
            }
            Ok(Outcome::Failed(message)) => {
                client.stop();
                return Err(CliError::new(FAILURE, message));
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return finish(&client),
        }

        if client.state() == ConnectionState::Closed {
            // An error is reported before the connection closes.
            if let Ok(Outcome::Failed(message)) = rx.try_recv() {
                return Err(CliError::new(FAILURE, message));
            }
            tracing::info!("host closed the connection");
            return Ok(SUCCESS);
        }
        if !running.load(Ordering::SeqCst) {
            return finish(&client);
        }
    }
}

fn register_handlers(client: &Arc<Client<CompilerMessage>>, tx: mpsc::Sender<Outcome>) {
    let tx = Arc::new(Mutex::new(tx));
    let notify = move |outcome: Outcome| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(outcome);
        }
    };

    let replier = Arc::downgrade(client);
    let on_exit = notify.clone();
    client.on_message(move |message: &CompilerMessage| match message.kind {
        MessageKind::Compile => {
            let reply = compile(message);
            tracing::debug!(
                id = message.id,
                kind = reply.kind.as_str(),
                "answering compile request"
            );
            if let Some(client) = replier.upgrade() {
                client.push_message(reply);
            }
        }
        MessageKind::Exit => on_exit(Outcome::Exit),
        other => tracing::debug!(id = message.id, kind = other.as_str(), "ignoring message"),
    });

    client.on_error(move |err| notify(Outcome::Failed(format!("connection failed: {err}"))));
}

fn finish(client: &Client<CompilerMessage>) -> CliResult<i32> {
    match client.stop_after_drain(DRAIN_TIMEOUT) {
        Ok(()) => Ok(SUCCESS),
        Err(err) => Err(client_error("shutdown failed", err)),
    }
}

/// Reference compile: bundle the sources into one image, each preceded by a
/// `// <name>` line. Sources must be UTF-8.
pub(crate) fn compile(request: &CompilerMessage) -> CompilerMessage {
    let files = match request.sources() {
        Some(files) if !files.is_empty() => files,
        _ => return CompilerMessage::error(request.id, "compile request carries no sources"),
    };

    let mut image = Vec::new();
    for file in files {
        if std::str::from_utf8(&file.data).is_err() {
            return CompilerMessage::error(
                request.id,
                format!("{}: source is not valid UTF-8", file.name),
            );
        }
        image.extend_from_slice(format!("// {}\n", file.name).as_bytes());
        image.extend_from_slice(&file.data);
        if !file.data.ends_with(b"\n") {
            image.push(b'\n');
        }
    }

    CompilerMessage::assembly(request.id, image)
        .with_extra(Payload::Text(format!("{} files", files.len())))
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

#[cfg(test)]
mod tests {
    use plugwire_client::SourceFile;

    use super::*;

    #[test]
    fn compile_bundles_sources_in_order() {
        let request = CompilerMessage::compile(
            42,
            vec![
                SourceFile::new("Kits.cs", "class Kits {}"),
                SourceFile::new("Util.cs", "static class Util {}\n"),
            ],
        );

        let reply = compile(&request);
        assert!(reply.answers(&request));
        assert_eq!(reply.kind, MessageKind::Assembly);
        assert_eq!(
            reply.data,
            Some(Payload::Binary(
                b"// Kits.cs\nclass Kits {}\n// Util.cs\nstatic class Util {}\n".to_vec()
            ))
        );
        assert_eq!(reply.extra_data, Some(Payload::Text("2 files".to_string())));
    }

    #[test]
    fn compile_without_sources_is_an_error_reply() {
        let request = CompilerMessage::compile(3, Vec::new());
        let reply = compile(&request);
        assert_eq!(reply.kind, MessageKind::Error);
        assert_eq!(reply.id, 3);
    }

    #[test]
    fn non_utf8_source_is_an_error_reply() {
        let request = CompilerMessage::compile(4, vec![SourceFile::new("Bad.cs", vec![0xFFu8])]);
        let reply = compile(&request);
        assert_eq!(
            reply.data,
            Some(Payload::Text("Bad.cs: source is not valid UTF-8".to_string()))
        );
    }
}
