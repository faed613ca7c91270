use std::fmt;
use std::io::{Read, Write};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use plugwire_frame::{ChannelConfig, FramedChannel, Message};
use plugwire_transport::StreamHalf;
use tracing::debug;

use crate::connection::{Connection, ConnectionState, DEFAULT_CONNECTION_NAME};
use crate::error::{ClientError, Result};
use crate::event::EventHub;

/// Client behavior config.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix for the connection's loop thread names.
    pub name: String,
    /// Channel framing and binder. `None` binds only the client's message type.
    pub channel: Option<ChannelConfig>,
}

impl ClientConfig {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            channel: None,
        }
    }

    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = Some(channel);
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::named(DEFAULT_CONNECTION_NAME)
    }
}

enum Slot<M: Message> {
    Pending(FramedChannel<M>),
    Started(Arc<Connection<M>>),
    Stopped,
}

/// Public handle over one connection: register handlers, `start`, push
/// messages, `stop`.
///
/// Nothing runs until [`start`](Self::start). Handlers may be registered at
/// any time before the client stops; they fire zero or more times and should
/// not assume a single error per failure.
pub struct Client<M: Message> {
    name: String,
    events: Arc<EventHub<M>>,
    slot: Mutex<Slot<M>>,
}

impl<M: Message> Client<M> {
    /// Client that reads from `input` and writes to `output`.
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: Read + StreamHalf,
        W: Write + StreamHalf,
    {
        Self::with_config(input, output, ClientConfig::default())
    }

    pub fn with_config<R, W>(input: R, output: W, config: ClientConfig) -> Self
    where
        R: Read + StreamHalf,
        W: Write + StreamHalf,
    {
        let channel_config = config
            .channel
            .unwrap_or_else(ChannelConfig::for_message::<M>);
        Self {
            name: config.name,
            events: Arc::new(EventHub::new()),
            slot: Mutex::new(Slot::Pending(FramedChannel::with_config(
                input,
                output,
                channel_config,
            ))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a handler for received messages.
    pub fn on_message(&self, handler: impl Fn(&M) + Send + Sync + 'static) {
        self.events.on_message(handler);
    }

    /// Register a handler for read/write loop faults.
    pub fn on_error(&self, handler: impl Fn(&ClientError) + Send + Sync + 'static) {
        self.events.on_error(handler);
    }

    /// Create and open the connection. Never blocks on I/O.
    pub fn start(&self) -> Result<()> {
        let mut slot = self.lock_slot();
        let channel = match std::mem::replace(&mut *slot, Slot::Stopped) {
            Slot::Pending(channel) => channel,
            Slot::Started(connection) => {
                *slot = Slot::Started(connection);
                return Err(ClientError::AlreadyStarted);
            }
            Slot::Stopped => return Err(ClientError::Stopped),
        };

        let connection = Arc::new(Connection::named(
            self.name.clone(),
            channel,
            Arc::clone(&self.events),
        ));
        *slot = Slot::Started(Arc::clone(&connection));
        drop(slot);

        connection.open()
    }

    /// Queue a message. A no-op before [`start`](Self::start) or after stop.
    pub fn push_message(&self, message: M) {
        match self.connection() {
            Some(connection) => connection.push_message(message),
            None => debug!(client = %self.name, "push_message before start ignored"),
        }
    }

    /// Close the connection immediately. Idempotent.
    ///
    /// Stopping a client that never started releases its streams, and a
    /// later [`start`](Self::start) fails with [`ClientError::Stopped`].
    pub fn stop(&self) {
        if let Some(connection) = self.release() {
            connection.close();
        }
    }

    /// Let queued messages go out (bounded by `timeout`), signal end of
    /// stream, then close.
    pub fn stop_after_drain(&self, timeout: Duration) -> Result<()> {
        match self.release() {
            Some(connection) => connection.close_after_drain(timeout),
            None => Ok(()),
        }
    }

    /// State of the underlying connection: `Created` until started, `Closed`
    /// once stopped.
    pub fn state(&self) -> ConnectionState {
        match &*self.lock_slot() {
            Slot::Pending(_) => ConnectionState::Created,
            Slot::Started(connection) => connection.state(),
            Slot::Stopped => ConnectionState::Closed,
        }
    }

    fn connection(&self) -> Option<Arc<Connection<M>>> {
        match &*self.lock_slot() {
            Slot::Started(connection) => Some(Arc::clone(connection)),
            Slot::Pending(_) | Slot::Stopped => None,
        }
    }

    /// The started connection, if any. A pending channel is dropped so its
    /// streams close.
    fn release(&self) -> Option<Arc<Connection<M>>> {
        let pending = {
            let mut slot = self.lock_slot();
            match std::mem::replace(&mut *slot, Slot::Stopped) {
                Slot::Started(connection) => {
                    *slot = Slot::Started(Arc::clone(&connection));
                    return Some(connection);
                }
                Slot::Stopped => return None,
                pending @ Slot::Pending(_) => pending,
            }
        };
        drop(pending);
        debug!(client = %self.name, "stopped before start; streams released");
        None
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot<M>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M: Message> Drop for Client<M> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<M: Message> fmt::Debug for Client<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("events", &self.events)
            .finish()
    }
}
