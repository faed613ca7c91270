//! Blocking byte-stream endpoints for the plugwire plugin transport.
//!
//! Everything above this crate speaks in terms of two independent stream
//! halves: one the host reads from, one it writes to. This crate provides:
//! - [`StreamHalf`] and [`Closer`]: a way to close a stream half that another
//!   thread may be blocked on
//! - [`IpcStream`] over Unix domain sockets, with [`UnixDomainSocket`] for
//!   bind/accept/connect
//! - [`PipedChild`] for talking to a worker process over its stdin/stdout

pub mod error;
pub mod process;
pub mod stream;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use process::PipedChild;
pub use stream::IpcStream;
pub use traits::{Closer, StreamHalf};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
