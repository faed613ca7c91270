/// Errors surfaced by connections and clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] plugwire_transport::TransportError),

    /// Frame-level error: framing, decoding or type resolution.
    #[error("frame error: {0}")]
    Frame(#[from] plugwire_frame::FrameError),

    /// An I/O error outside the framed channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A read or write loop panicked.
    #[error("{thread} panicked: {message}")]
    Panicked { thread: String, message: String },

    /// `start()` was called on a client that already started.
    #[error("client already started")]
    AlreadyStarted,

    /// `start()` was called after the client was stopped.
    #[error("client already stopped")]
    Stopped,

    /// `open()` was called on a connection that is not freshly created.
    #[error("connection already opened")]
    AlreadyOpen,

    /// The connection did not go idle before the drain deadline.
    #[error("outgoing queue did not drain within {0:?}")]
    DrainTimeout(std::time::Duration),
}

pub type Result<T> = std::result::Result<T, ClientError>;
