//! Host and worker talking over a Unix domain socket in one process.
//!
//! Run with:
//!   cargo run --example socket-host
//!
//! The host accepts one worker, sends a compile request, and prints the
//! reply. The same exchange works across processes with
//! `plugwire listen <path> --reply` and `plugwire worker --socket <path>`.

use std::fs;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use plugwire::client::{
    connect, Client, ClientError, ClientListener, CompilerMessage, ConnectionState, MessageKind,
    RequestIds, SourceFile,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let sock_dir = std::env::temp_dir().join(format!("plugwire-host-{}", std::process::id()));
    fs::create_dir_all(&sock_dir)?;
    let sock_path = sock_dir.join("host.sock");
    let _ = fs::remove_file(&sock_path);

    let listener = ClientListener::bind(&sock_path)?;
    eprintln!("Listening on {}", listener.path().display());

    let worker_path = sock_path.clone();
    let worker = thread::spawn(move || -> Result<(), ClientError> {
        let client: Arc<Client<CompilerMessage>> = Arc::new(connect(&worker_path)?);
        let replier = Arc::downgrade(&client);
        client.on_message(move |msg: &CompilerMessage| {
            if msg.kind != MessageKind::Compile {
                return;
            }
            let Some(client) = replier.upgrade() else {
                return;
            };
            let size: usize = msg
                .sources()
                .unwrap_or_default()
                .iter()
                .map(|file| file.data.len())
                .sum();
            let image = format!("{size} source bytes").into_bytes();
            client.push_message(CompilerMessage::assembly(msg.id, image));
        });
        client.start()?;

        // Serve until the host hangs up.
        while client.state() != ConnectionState::Closed {
            thread::sleep(Duration::from_millis(20));
        }
        Ok(())
    });

    let host: Client<CompilerMessage> = listener.accept()?;
    eprintln!("Worker connected: {}", host.name());

    let (tx, rx) = mpsc::channel();
    let tx = Mutex::new(tx);
    host.on_message(move |msg: &CompilerMessage| {
        if let Ok(tx) = tx.lock() {
            let _ = tx.send(msg.clone());
        }
    });
    host.on_error(|err| eprintln!("Connection error: {err}"));
    host.start()?;

    let ids = RequestIds::new();
    let request = CompilerMessage::compile(
        ids.next_id(),
        vec![SourceFile::new("Kits.cs", "class Kits {}")],
    );
    host.push_message(request.clone());

    let reply = rx.recv_timeout(Duration::from_secs(5))?;
    eprintln!("Reply to request {}: {:?}", request.id, reply);

    host.stop_after_drain(Duration::from_secs(1))?;
    let _ = worker.join();
    let _ = fs::remove_dir_all(&sock_dir);
    Ok(())
}
