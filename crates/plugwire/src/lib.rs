//! Out-of-process plugin transport.
//!
//! A host and its worker processes exchange typed messages over a pair of
//! byte streams: 4-byte big-endian length prefixes, bincode bodies tagged
//! with their type name, one reader thread and one writer thread per
//! connection.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte streams (Unix sockets, child-process pipes)
//! - [`frame`]: length-prefixed framing, type binder, typed channel
//! - [`client`]: threaded connection and client (behind `client` feature)

/// Re-export transport types.
pub mod transport {
    pub use plugwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use plugwire_frame::*;
}

/// Re-export client types (requires `client` feature).
#[cfg(feature = "client")]
pub mod client {
    pub use plugwire_client::*;
}
