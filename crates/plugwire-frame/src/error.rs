/// Errors that can occur while framing, encoding or decoding messages.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A zero-length payload cannot be framed; length 0 marks end of stream.
    #[error("empty payload cannot be framed (length 0 is the end-of-stream marker)")]
    EmptyPayload,

    /// The stream ended inside a length prefix or payload.
    #[error("stream ended mid-frame ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream accepted zero bytes on write.
    #[error("connection closed")]
    ConnectionClosed,

    /// The channel was closed locally.
    #[error("channel closed")]
    ChannelClosed,

    /// The payload body could not be encoded or decoded.
    #[error("payload codec error: {0}")]
    Codec(#[from] bincode::Error),

    /// The payload type header is malformed.
    #[error("invalid type name in payload: {0}")]
    InvalidTypeName(String),

    /// No locally registered type matches the sender's type name.
    #[error("cannot resolve type '{0}' in this process")]
    UnresolvedType(String),

    /// The sender's type resolved to a different local type than expected.
    #[error("type mismatch: expected '{expected}', payload resolved to '{found}'")]
    TypeMismatch { expected: String, found: String },
}

pub type Result<T> = std::result::Result<T, FrameError>;
