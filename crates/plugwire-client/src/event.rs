//! Observer lists for connection events.
//!
//! Handlers run on the thread that produced the event: message handlers on
//! the read loop, error handlers on a loop's notifier thread. Dispatch works
//! on a snapshot of the handler list, so a handler may register more
//! handlers or stop its own client without deadlocking.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::ClientError;

type MessageHandler<M> = Arc<dyn Fn(&M) + Send + Sync>;
type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

pub struct EventHub<M> {
    message: Mutex<Vec<MessageHandler<M>>>,
    error: Mutex<Vec<ErrorHandler>>,
}

impl<M> EventHub<M> {
    pub fn new() -> Self {
        Self {
            message: Mutex::new(Vec::new()),
            error: Mutex::new(Vec::new()),
        }
    }

    pub fn on_message(&self, handler: impl Fn(&M) + Send + Sync + 'static) {
        lock(&self.message).push(Arc::new(handler));
    }

    pub fn on_error(&self, handler: impl Fn(&ClientError) + Send + Sync + 'static) {
        lock(&self.error).push(Arc::new(handler));
    }

    /// Deliver `message` to every handler while `live()` holds.
    ///
    /// `live` is rechecked before each call; a handler that closes the
    /// connection stops delivery to the remaining ones.
    pub fn emit_message(&self, message: &M, live: impl Fn() -> bool) {
        let handlers = lock(&self.message).clone();
        for handler in handlers {
            if !live() {
                return;
            }
            handler(message);
        }
    }

    pub fn emit_error(&self, err: &ClientError, live: impl Fn() -> bool) {
        let handlers = lock(&self.error).clone();
        for handler in handlers {
            if !live() {
                return;
            }
            handler(err);
        }
    }

    /// Drop every registered handler.
    pub fn clear(&self) {
        lock(&self.message).clear();
        lock(&self.error).clear();
    }

    pub fn handler_count(&self) -> (usize, usize) {
        (lock(&self.message).len(), lock(&self.error).len())
    }
}

impl<M> Default for EventHub<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for EventHub<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (message, error) = self.handler_count();
        f.debug_struct("EventHub")
            .field("message_handlers", &message)
            .field("error_handlers", &error)
            .finish()
    }
}

fn lock<T>(list: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    list.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn zero_handlers_is_fine() {
        let hub = EventHub::<u32>::new();
        hub.emit_message(&1, || true);
        hub.emit_error(&ClientError::AlreadyStarted, || true);
    }

    #[test]
    fn every_handler_sees_every_message() {
        let hub = EventHub::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let total = Arc::clone(&total);
            hub.on_message(move |n| {
                total.fetch_add(*n as usize, Ordering::SeqCst);
            });
        }

        hub.emit_message(&2, || true);
        hub.emit_message(&5, || true);
        assert_eq!(total.load(Ordering::SeqCst), 21);
        assert_eq!(hub.handler_count(), (3, 0));
    }

    #[test]
    fn liveness_is_rechecked_between_handlers() {
        let hub = Arc::new(EventHub::<u32>::new());
        let live = Arc::new(AtomicBool::new(true));
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let live = Arc::clone(&live);
            let calls = Arc::clone(&calls);
            hub.on_message(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                live.store(false, Ordering::SeqCst);
            });
        }

        let check = Arc::clone(&live);
        hub.emit_message(&0, move || check.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn handler_may_register_and_clear_during_dispatch() {
        let hub = Arc::new(EventHub::<u32>::new());
        let inner = Arc::clone(&hub);
        hub.on_error(move |_| {
            inner.on_error(|_| {});
            inner.clear();
        });

        hub.emit_error(&ClientError::AlreadyOpen, || true);
        assert_eq!(hub.handler_count(), (0, 0));
        assert!(format!("{hub:?}").contains("error_handlers: 0"));
    }
}
