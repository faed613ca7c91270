use std::sync::Arc;

use bincode::Options;
use bytes::{Buf, BufMut};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::binder::{wire_name, TypeBinder, MAX_TYPE_NAME_LEN};
use crate::error::{FrameError, Result};

/// Anything that can travel over a framed channel.
pub trait Message: Serialize + DeserializeOwned + Send + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Send + 'static {}

/// Fixed-width integers, and the body must fill the rest of the payload.
fn body_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes()
}

/// Turns messages into frame payloads and back.
///
/// Payload layout:
///
/// ```text
/// ┌────────────────┬──────────────────┬──────────────────┐
/// │ Name len (2B)  │ Type name        │ bincode body     │
/// │ big-endian     │ (UTF-8)          │                  │
/// └────────────────┴──────────────────┴──────────────────┘
/// ```
#[derive(Debug, Clone)]
pub struct ObjectCodec {
    binder: Arc<TypeBinder>,
}

impl ObjectCodec {
    pub fn new(binder: Arc<TypeBinder>) -> Self {
        Self { binder }
    }

    pub fn binder(&self) -> &TypeBinder {
        &self.binder
    }

    /// Serialize `message`, tagged with this process's name for `M`.
    pub fn encode<M: Message>(&self, message: &M) -> Result<Vec<u8>> {
        let name = wire_name::<M>();
        if name.len() > MAX_TYPE_NAME_LEN {
            return Err(FrameError::InvalidTypeName(name.to_string()));
        }

        let body_len = body_options().serialized_size(message)? as usize;
        let mut out = Vec::with_capacity(2 + name.len() + body_len);
        out.put_u16(name.len() as u16);
        out.put_slice(name.as_bytes());
        body_options().serialize_into(&mut out, message)?;
        Ok(out)
    }

    /// Resolve the payload's type through the binder and decode it as `M`.
    pub fn decode<M: Message>(&self, payload: &[u8]) -> Result<M> {
        let mut cursor = payload;
        if cursor.remaining() < 2 {
            return Err(FrameError::InvalidTypeName(
                "payload shorter than type header".to_string(),
            ));
        }
        let name_len = cursor.get_u16() as usize;
        if cursor.remaining() < name_len {
            return Err(FrameError::InvalidTypeName(format!(
                "type name length {name_len} exceeds payload"
            )));
        }
        let (name, body) = cursor.split_at(name_len);
        let name = std::str::from_utf8(name)
            .map_err(|err| FrameError::InvalidTypeName(format!("type name is not UTF-8: {err}")))?;

        let local = self.binder.resolve(name)?;
        let expected = wire_name::<M>();
        if local != expected {
            return Err(FrameError::TypeMismatch {
                expected: expected.to_string(),
                found: local.to_string(),
            });
        }

        Ok(body_options().deserialize(body)?)
    }
}
