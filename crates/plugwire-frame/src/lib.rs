//! Length-prefixed object framing for the plugwire plugin transport.
//!
//! Every message travels as:
//! - A 4-byte big-endian payload length (0 means the sender is done)
//! - A payload of `[u16 name length][type name][bincode body]`
//!
//! A UTF-8 byte-order mark in front of a length prefix is skipped. Incoming
//! type names are mapped to local types by a [`TypeBinder`], so host and
//! worker can be built from different crates.

pub mod binder;
pub mod channel;
pub mod codec;
pub mod error;
pub mod reader;
pub mod serializer;
pub mod writer;

pub use binder::{wire_name, BindPolicy, TypeBinder};
pub use channel::{ChannelConfig, FramedChannel};
pub use codec::{
    decode_frame, encode_frame, Decoded, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::FrameReader;
pub use serializer::{Message, ObjectCodec};
pub use writer::FrameWriter;
