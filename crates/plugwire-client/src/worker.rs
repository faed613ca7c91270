//! Runs connection loops on named background threads.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Run `action` on a new thread called `name`.
///
/// If `action` returns an error or panics, `on_error` receives the error on a
/// separate notifier thread, so the callback may take locks the faulting loop
/// would otherwise be competing for. If the notifier cannot be spawned the
/// callback runs inline on the faulting thread.
pub fn run_in_background<A, E>(
    name: impl Into<String>,
    action: A,
    on_error: E,
) -> Result<JoinHandle<()>>
where
    A: FnOnce() -> Result<()> + Send + 'static,
    E: FnOnce(ClientError) + Send + 'static,
{
    let name = name.into();
    let thread_name = name.clone();

    let handle = thread::Builder::new().name(name).spawn(move || {
        let err = match panic::catch_unwind(AssertUnwindSafe(action)) {
            Ok(Ok(())) => {
                debug!(thread = %thread_name, "background loop finished");
                return;
            }
            Ok(Err(err)) => err,
            Err(payload) => ClientError::Panicked {
                thread: thread_name.clone(),
                message: panic_message(payload.as_ref()),
            },
        };

        warn!(thread = %thread_name, error = %err, "background loop failed");
        notify(&thread_name, err, on_error);
    })?;

    Ok(handle)
}

fn notify<E>(thread_name: &str, err: ClientError, on_error: E)
where
    E: FnOnce(ClientError) + Send + 'static,
{
    let slot = Arc::new(Mutex::new(Some((on_error, err))));
    let remote = Arc::clone(&slot);

    let spawned = thread::Builder::new()
        .name(format!("{thread_name}-notify"))
        .spawn(move || {
            if let Some((on_error, err)) = take(&remote) {
                on_error(err);
            }
        });

    if let Err(spawn_err) = spawned {
        debug!(thread = %thread_name, error = %spawn_err, "notifier spawn failed; reporting inline");
        if let Some((on_error, err)) = take(&slot) {
            on_error(err);
        }
    }
}

fn take<T>(slot: &Mutex<Option<T>>) -> Option<T> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
