//! Threaded client connection for the plugwire plugin transport.
//!
//! A [`Client`] owns one [`Connection`]: a framed channel driven by a
//! dedicated read thread and a dedicated write thread, with a FIFO outgoing
//! queue in between. Callers push messages from any thread and observe
//! received messages and faults through registered handlers.
//!
//! Endpoints come from [`connect`] (Unix socket), [`ClientListener`] (accepted
//! socket) or [`spawn_worker`] (child process over stdio), or from any pair
//! of streams via [`Client::new`].

pub mod client;
pub mod connection;
pub mod connector;
pub mod envelope;
pub mod error;
pub mod event;
#[cfg(unix)]
pub mod listener;
pub mod process;
pub mod signal;
pub mod worker;

pub use client::{Client, ClientConfig};
pub use connection::{Connection, ConnectionState};
pub use connector::{connect, connect_with_config};
pub use envelope::{CompilerMessage, MessageKind, Payload, RequestIds, SourceFile};
pub use error::{ClientError, Result};
pub use event::EventHub;
#[cfg(unix)]
pub use listener::ClientListener;
pub use process::{spawn_worker, spawn_worker_with_config, WorkerProcess};
pub use signal::WakeSignal;
pub use worker::run_in_background;
