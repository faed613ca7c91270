use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use plugwire_frame::{FramedChannel, Message};
use tracing::{debug, trace};

use crate::error::{ClientError, Result};
use crate::event::EventHub;
use crate::signal::WakeSignal;
use crate::worker::run_in_background;

/// Name used for loop threads when none is given.
pub const DEFAULT_CONNECTION_NAME: &str = "plugwire";

/// Lifecycle of a [`Connection`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Created,
    Open,
    Closed,
}

struct Outgoing<M> {
    queue: VecDeque<M>,
    in_flight: bool,
}

impl<M> Outgoing<M> {
    fn is_idle(&self) -> bool {
        self.queue.is_empty() && !self.in_flight
    }
}

struct Shared<M> {
    name: String,
    channel: FramedChannel<M>,
    state: Mutex<ConnectionState>,
    outgoing: Mutex<Outgoing<M>>,
    idle: Condvar,
    wake: WakeSignal,
    events: Arc<EventHub<M>>,
}

/// A framed channel plus a reader thread, a writer thread and an outgoing
/// FIFO queue.
///
/// Received messages are delivered to the [`EventHub`] in arrival order on the
/// read thread. Any fault in either loop reports an error and then closes the
/// whole connection.
pub struct Connection<M: Message> {
    shared: Arc<Shared<M>>,
}

impl<M: Message> Connection<M> {
    pub fn new(channel: FramedChannel<M>, events: Arc<EventHub<M>>) -> Self {
        Self::named(DEFAULT_CONNECTION_NAME, channel, events)
    }

    /// Connection whose loop threads are called `<name>-read` and
    /// `<name>-write`.
    pub fn named(
        name: impl Into<String>,
        channel: FramedChannel<M>,
        events: Arc<EventHub<M>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                name: name.into(),
                channel,
                state: Mutex::new(ConnectionState::Created),
                outgoing: Mutex::new(Outgoing {
                    queue: VecDeque::new(),
                    in_flight: false,
                }),
                idle: Condvar::new(),
                wake: WakeSignal::new(),
                events,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.lock_state()
    }

    pub fn events(&self) -> &EventHub<M> {
        &self.shared.events
    }

    /// Start the read and write loops. Returns immediately.
    pub fn open(&self) -> Result<()> {
        {
            let mut state = self.shared.lock_state();
            if *state != ConnectionState::Created {
                return Err(ClientError::AlreadyOpen);
            }
            *state = ConnectionState::Open;
        }

        if let Err(err) = self.spawn_loops() {
            self.close();
            return Err(err);
        }
        debug!(connection = %self.shared.name, "connection opened");
        Ok(())
    }

    fn spawn_loops(&self) -> Result<()> {
        let name = &self.shared.name;

        let reader = Arc::clone(&self.shared);
        run_in_background(
            format!("{name}-read"),
            move || reader.read_loop(),
            fault_handler(&self.shared),
        )?;

        let writer = Arc::clone(&self.shared);
        run_in_background(
            format!("{name}-write"),
            move || writer.write_loop(),
            fault_handler(&self.shared),
        )?;
        Ok(())
    }

    /// Queue `message` for the write loop. Dropped if the connection is closed.
    ///
    /// Messages pushed before [`open`](Self::open) are sent once it runs.
    pub fn push_message(&self, message: M) {
        {
            let mut outgoing = self.shared.lock_outgoing();
            if self.shared.is_closed() {
                trace!(connection = %self.shared.name, "dropping message pushed after close");
                return;
            }
            outgoing.queue.push_back(message);
        }
        self.shared.wake.set();
    }

    /// Number of messages waiting for the write loop.
    pub fn queued(&self) -> usize {
        self.shared.lock_outgoing().queue.len()
    }

    /// Block until the queue is empty and no write is in progress.
    ///
    /// Returns false if `timeout` elapsed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let outgoing = self.shared.lock_outgoing();
        let (outgoing, _) = self
            .shared
            .idle
            .wait_timeout_while(outgoing, timeout, |outgoing| !outgoing.is_idle())
            .unwrap_or_else(PoisonError::into_inner);
        outgoing.is_idle()
    }

    /// Close immediately. Queued messages that have not been written are lost.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Wait up to `timeout` for queued messages to be written, send the
    /// end-of-stream marker, then close.
    ///
    /// The connection is closed even when the deadline passes, in which case
    /// [`ClientError::DrainTimeout`] is returned.
    pub fn close_after_drain(&self, timeout: Duration) -> Result<()> {
        if self.state() != ConnectionState::Open {
            self.close();
            return Ok(());
        }

        if !self.wait_idle(timeout) {
            self.close();
            return Err(ClientError::DrainTimeout(timeout));
        }

        let result = self.shared.channel.write_end_of_stream();
        self.close();
        result.map_err(ClientError::from)
    }
}

impl<M: Message> Drop for Connection<M> {
    fn drop(&mut self) {
        self.shared.close();
    }
}

impl<M: Message> fmt::Debug for Connection<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .field("channel", &self.shared.channel)
            .finish_non_exhaustive()
    }
}

/// Report a loop fault, then close the connection.
fn fault_handler<M: Message>(
    shared: &Arc<Shared<M>>,
) -> impl FnOnce(ClientError) + Send + 'static {
    let shared = Arc::clone(shared);
    move |err| {
        shared.events.emit_error(&err, || !shared.is_closed());
        shared.close();
    }
}

impl<M: Message> Shared<M> {
    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outgoing(&self) -> MutexGuard<'_, Outgoing<M>> {
        self.outgoing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_closed(&self) -> bool {
        *self.lock_state() == ConnectionState::Closed
    }

    fn read_loop(&self) -> Result<()> {
        while self.channel.can_read() {
            match self.channel.read_message() {
                Ok(Some(message)) => self.events.emit_message(&message, || !self.is_closed()),
                Ok(None) => break,
                // Closing the channel may surface as a read error.
                Err(_) if self.is_closed() => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }

        debug!(connection = %self.name, "read loop reached end of stream");
        self.close();
        Ok(())
    }

    fn write_loop(&self) -> Result<()> {
        while self.channel.can_write() {
            self.wake.wait();

            while let Some(message) = self.next_outgoing() {
                let written = self.channel.write_message(&message);
                self.finish_outgoing();
                match written {
                    Ok(()) => {}
                    Err(_) if self.is_closed() => return Ok(()),
                    Err(err) => return Err(err.into()),
                }
            }
        }
        Ok(())
    }

    fn next_outgoing(&self) -> Option<M> {
        let mut outgoing = self.lock_outgoing();
        let message = outgoing.queue.pop_front()?;
        outgoing.in_flight = true;
        Some(message)
    }

    fn finish_outgoing(&self) {
        let mut outgoing = self.lock_outgoing();
        outgoing.in_flight = false;
        if outgoing.is_idle() {
            self.idle.notify_all();
        }
    }

    fn close(&self) {
        {
            let mut state = self.lock_state();
            if *state == ConnectionState::Closed {
                return;
            }
            *state = ConnectionState::Closed;
        }

        self.events.clear();
        self.channel.close();

        let abandoned = {
            let mut outgoing = self.lock_outgoing();
            let abandoned = outgoing.queue.len();
            outgoing.queue.clear();
            self.idle.notify_all();
            abandoned
        };
        self.wake.set();
        debug!(connection = %self.name, abandoned, "connection closed");
    }
}
