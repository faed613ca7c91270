use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: a single big-endian `u32` payload length.
pub const HEADER_SIZE: usize = 4;

/// UTF-8 byte-order mark some producers write before their first frame.
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Length prefix value that marks a graceful end of stream.
pub const END_OF_STREAM: [u8; HEADER_SIZE] = [0, 0, 0, 0];

/// Default maximum payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// Largest payload whose length prefix cannot be mistaken for a BOM.
///
/// A prefix starting with `EF BB BF` is always treated as a byte-order mark,
/// so lengths from `0xEFBB_BF00` upward are not representable.
pub const MAX_REPRESENTABLE_PAYLOAD: usize = 0xEFBB_BEFF;

/// One framed payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// The serialized message bytes. Never empty.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }
}

/// Result of decoding one unit from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A complete data frame.
    Frame(Frame),
    /// A zero-length prefix: the peer finished sending.
    EndOfStream,
}

/// Encode a payload into the wire format.
///
/// ```text
/// ┌──────────────────┬─────────────────────┐
/// │ Length (4B BE)   │ Payload             │
/// │ N, never 0       │ (N bytes)           │
/// └──────────────────┴─────────────────────┘
/// ```
pub fn encode_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.is_empty() {
        return Err(FrameError::EmptyPayload);
    }
    if payload.len() > MAX_REPRESENTABLE_PAYLOAD {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_REPRESENTABLE_PAYLOAD,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32(payload.len() as u32);
    dst.put_slice(payload);
    Ok(())
}

/// Encode the end-of-stream marker.
pub fn encode_end_of_stream(dst: &mut BytesMut) {
    dst.put_slice(&END_OF_STREAM);
}

/// Decode one unit from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete unit yet.
/// A leading byte-order mark is consumed and skipped. On success the unit's
/// bytes are consumed from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Decoded>> {
    skip_bom(src);

    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    let mut prefix = [0u8; HEADER_SIZE];
    prefix.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = u32::from_be_bytes(prefix) as usize;

    if payload_len == 0 {
        src.advance(HEADER_SIZE);
        return Ok(Some(Decoded::EndOfStream));
    }

    if payload_len > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload_len,
            max: max_payload,
        });
    }

    if src.len() < HEADER_SIZE + payload_len {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(payload_len).freeze();

    Ok(Some(Decoded::Frame(Frame { payload })))
}

/// How many more bytes the buffered partial unit needs, for error reporting.
pub(crate) fn pending_unit(src: &[u8]) -> (usize, usize) {
    if src.len() < HEADER_SIZE {
        return (HEADER_SIZE, src.len());
    }
    let mut prefix = [0u8; HEADER_SIZE];
    prefix.copy_from_slice(&src[..HEADER_SIZE]);
    let payload_len = u32::from_be_bytes(prefix) as usize;
    (payload_len, src.len() - HEADER_SIZE)
}

fn skip_bom(src: &mut BytesMut) {
    while src.starts_with(&UTF8_BOM) {
        tracing::trace!("skipping UTF-8 byte-order mark before length prefix");
        src.advance(UTF8_BOM.len());
    }
}

/// Configuration for the frame codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum payload size in bytes. Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(decoded: Option<Decoded>) -> Bytes {
        match decoded {
            Some(Decoded::Frame(frame)) => frame.payload,
            other => panic!("expected data frame, got {other:?}"),
        }
    }

    #[test]
    fn encode_writes_big_endian_prefix() {
        let mut buf = BytesMut::new();
        encode_frame(b"plugin", &mut buf).unwrap();

        assert_eq!(&buf[..HEADER_SIZE], &[0, 0, 0, 6]);
        assert_eq!(&buf[HEADER_SIZE..], b"plugin");
    }

    #[test]
    fn encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello, worker!", &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE + 14);

        let payload = data(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap());
        assert_eq!(payload.as_ref(), b"hello, worker!");
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_payload_is_rejected() {
        let mut buf = BytesMut::new();
        let err = encode_frame(b"", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::EmptyPayload));
        assert!(buf.is_empty());
    }

    #[test]
    fn zero_length_prefix_is_end_of_stream() {
        let mut buf = BytesMut::new();
        encode_end_of_stream(&mut buf);
        encode_frame(b"after", &mut buf).unwrap();

        let first = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap();
        assert_eq!(first, Some(Decoded::EndOfStream));
        assert_eq!(buf.len(), HEADER_SIZE + 5);
    }

    #[test]
    fn incomplete_header_needs_more() {
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x01][..]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn incomplete_payload_needs_more() {
        let mut buf = BytesMut::new();
        encode_frame(b"hello", &mut buf).unwrap();
        buf.truncate(HEADER_SIZE + 2);

        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(pending_unit(&buf), (5, 2));
    }

    #[test]
    fn oversized_prefix_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u32(32 * 1024 * 1024);

        let result = decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge { size, .. }) if size == 32 * 1024 * 1024
        ));
    }

    #[test]
    fn leading_bom_is_skipped() {
        let mut buf = BytesMut::from(&UTF8_BOM[..]);
        encode_frame(b"ready", &mut buf).unwrap();

        let payload = data(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap());
        assert_eq!(payload.as_ref(), b"ready");
        assert!(buf.is_empty());
    }

    #[test]
    fn bom_between_frames_is_skipped() {
        let mut buf = BytesMut::new();
        encode_frame(b"one", &mut buf).unwrap();
        buf.put_slice(&UTF8_BOM);
        encode_frame(b"two", &mut buf).unwrap();

        assert_eq!(
            data(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap()).as_ref(),
            b"one"
        );
        assert_eq!(
            data(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap()).as_ref(),
            b"two"
        );
    }

    #[test]
    fn partial_bom_waits_for_more() {
        let mut buf = BytesMut::from(&UTF8_BOM[..2]);
        assert!(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap().is_none());
        assert_eq!(buf.len(), 2);

        buf.put_u8(UTF8_BOM[2]);
        encode_frame(b"late", &mut buf).unwrap();
        let payload = data(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap());
        assert_eq!(payload.as_ref(), b"late");
    }

    #[test]
    fn multiple_frames_decode_in_order() {
        let mut buf = BytesMut::new();
        encode_frame(b"first", &mut buf).unwrap();
        encode_frame(b"second", &mut buf).unwrap();

        let f1 = data(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap());
        let f2 = data(decode_frame(&mut buf, DEFAULT_MAX_PAYLOAD).unwrap());
        assert_eq!(f1.as_ref(), b"first");
        assert_eq!(f2.as_ref(), b"second");
        assert!(buf.is_empty());
    }

    #[test]
    fn frame_wire_size() {
        let frame = Frame::new(Bytes::from_static(b"test"));
        assert_eq!(frame.wire_size(), HEADER_SIZE + 4);
    }
}
