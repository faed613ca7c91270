use std::fmt;
use std::io::{Cursor, Stdin, Stdout};
use std::process::{ChildStdin, ChildStdout};
use std::sync::Arc;

type CloseFn = dyn Fn() -> std::io::Result<()> + Send + Sync;

/// Closes a stream half from a thread that does not own it.
///
/// A read loop blocked inside `read()` owns its stream, so the only way to
/// wake it is to close the underlying descriptor from the outside. A `Closer`
/// captures whatever is needed to do that (typically a cloned socket handle).
#[derive(Clone)]
pub struct Closer {
    inner: Arc<CloseFn>,
}

impl Closer {
    /// Wrap a close action.
    pub fn new(close: impl Fn() -> std::io::Result<()> + Send + Sync + 'static) -> Self {
        Self {
            inner: Arc::new(close),
        }
    }

    /// Close the stream. Calling this more than once is allowed; later calls
    /// may return an error from the OS, which callers are expected to ignore.
    pub fn close(&self) -> std::io::Result<()> {
        (self.inner)()
    }
}

impl fmt::Debug for Closer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closer").finish_non_exhaustive()
    }
}

/// One direction of a byte stream that a framed channel can own.
///
/// Implementors are `Send + 'static` so they can move onto a dedicated loop
/// thread. Streams that can be interrupted from another thread return a
/// [`Closer`]; streams that cannot (pipes, stdio) return `None` and simply
/// end when the peer goes away.
pub trait StreamHalf: Send + 'static {
    /// A handle that closes this stream from another thread, if supported.
    fn closer(&self) -> Option<Closer> {
        None
    }
}

#[cfg(unix)]
impl StreamHalf for std::os::unix::net::UnixStream {
    fn closer(&self) -> Option<Closer> {
        let handle = self.try_clone().ok()?;
        Some(Closer::new(move || {
            handle.shutdown(std::net::Shutdown::Both)
        }))
    }
}

impl StreamHalf for std::net::TcpStream {
    fn closer(&self) -> Option<Closer> {
        let handle = self.try_clone().ok()?;
        Some(Closer::new(move || {
            handle.shutdown(std::net::Shutdown::Both)
        }))
    }
}

impl StreamHalf for ChildStdin {}

impl StreamHalf for ChildStdout {}

impl StreamHalf for Stdin {}

impl StreamHalf for Stdout {}

impl StreamHalf for std::fs::File {}

impl StreamHalf for Vec<u8> {}

impl<T: Send + 'static> StreamHalf for Cursor<T> {}
