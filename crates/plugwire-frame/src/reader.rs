use std::io::{ErrorKind, Read};

use bytes::BytesMut;

use crate::codec::{decode_frame, pending_unit, Decoded, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from any `Read` stream.
///
/// Handles partial reads internally; callers always get complete frames.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next complete frame (blocking).
    ///
    /// Returns `Ok(None)` at a graceful end of stream: a zero-length prefix,
    /// or EOF on a frame boundary. EOF inside a frame is
    /// [`FrameError::Truncated`].
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            match decode_frame(&mut self.buf, self.config.max_payload_size)? {
                Some(Decoded::Frame(frame)) => return Ok(Some(frame)),
                Some(Decoded::EndOfStream) => return Ok(None),
                None => {}
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                if self.buf.is_empty() {
                    return Ok(None);
                }
                let (expected, received) = pending_unit(&self.buf);
                return Err(FrameError::Truncated { expected, received });
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::codec::{encode_end_of_stream, encode_frame, HEADER_SIZE, UTF8_BOM};

    fn wire(payloads: &[&[u8]]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for payload in payloads {
            encode_frame(payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    fn payload(frame: Option<Frame>) -> Vec<u8> {
        frame.expect("expected a frame").payload.to_vec()
    }

    #[test]
    fn read_single_frame() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"hello"])));
        assert_eq!(payload(reader.read_frame().unwrap()), b"hello");
    }

    #[test]
    fn read_multiple_frames() {
        let mut reader = FrameReader::new(Cursor::new(wire(&[b"one", b"two", b"three"])));

        assert_eq!(payload(reader.read_frame().unwrap()), b"one");
        assert_eq!(payload(reader.read_frame().unwrap()), b"two");
        assert_eq!(payload(reader.read_frame().unwrap()), b"three");
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn read_frame_with_large_payload() {
        let big = vec![0xAB; 64 * 1024];
        let mut reader = FrameReader::new(Cursor::new(wire(&[&big])));
        assert_eq!(payload(reader.read_frame().unwrap()), big);
    }

    #[test]
    fn byte_by_byte_reads_keep_boundaries() {
        let mut reader = FrameReader::new(ChunkedReader::new(wire(&[b"m1", b"m22", b"m333"]), 1));

        assert_eq!(payload(reader.read_frame().unwrap()), b"m1");
        assert_eq!(payload(reader.read_frame().unwrap()), b"m22");
        assert_eq!(payload(reader.read_frame().unwrap()), b"m333");
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn odd_sized_chunks_keep_boundaries() {
        let frames: Vec<Vec<u8>> = (0..20u8).map(|i| vec![i; 1 + i as usize * 7]).collect();
        let refs: Vec<&[u8]> = frames.iter().map(Vec::as_slice).collect();

        for chunk in [2, 3, 5, 11] {
            let mut reader = FrameReader::new(ChunkedReader::new(wire(&refs), chunk));
            for expected in &frames {
                assert_eq!(&payload(reader.read_frame().unwrap()), expected);
            }
        }
    }

    #[test]
    fn clean_eof_is_end_of_stream() {
        let mut reader = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn zero_length_marker_is_end_of_stream() {
        let mut buf = BytesMut::new();
        encode_frame(b"last", &mut buf).unwrap();
        encode_end_of_stream(&mut buf);

        let mut reader = FrameReader::new(Cursor::new(buf.to_vec()));
        assert_eq!(payload(reader.read_frame().unwrap()), b"last");
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn eof_mid_payload_is_truncated() {
        let mut partial = BytesMut::new();
        partial.put_u32(16);
        partial.put_slice(b"only-part");

        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: 16,
                received: 9
            }
        ));
    }

    #[test]
    fn eof_mid_prefix_is_truncated() {
        let mut reader = FrameReader::new(Cursor::new(vec![0x00, 0x01]));
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(
            err,
            FrameError::Truncated {
                expected: HEADER_SIZE,
                received: 2
            }
        ));
    }

    #[test]
    fn stream_starting_with_bom_is_read() {
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend(wire(&[b"after-bom"]));

        let mut reader = FrameReader::new(ChunkedReader::new(bytes, 1));
        assert_eq!(payload(reader.read_frame().unwrap()), b"after-bom");
    }

    #[test]
    fn lone_bom_then_eof_is_end_of_stream() {
        let mut reader = FrameReader::new(Cursor::new(UTF8_BOM.to_vec()));
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn oversized_frame_in_stream() {
        let mut buf = BytesMut::new();
        buf.put_u32(1024);

        let cfg = FrameConfig {
            max_payload_size: 16,
        };
        let mut reader = FrameReader::with_config(Cursor::new(buf.to_vec()), cfg);
        let err = reader.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert_eq!(reader.config().max_payload_size, 16);
    }

    #[test]
    fn mismatched_length_is_an_error_not_a_hang() {
        // Prefix claims 100 bytes, stream only carries 3 and then ends.
        let mut buf = BytesMut::new();
        buf.put_u32(100);
        buf.put_slice(b"abc");

        let mut reader = FrameReader::new(ChunkedReader::new(buf.to_vec(), 2));
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::Truncated { .. })
        ));
    }

    #[test]
    fn roundtrip_over_socket_pair() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        writer.send(b"ping").unwrap();
        assert_eq!(payload(reader.read_frame().unwrap()), b"ping");

        drop(writer);
        assert!(reader.read_frame().unwrap().is_none());
    }

    #[test]
    fn concurrent_reader_writer_threads() {
        let (left, right) = std::os::unix::net::UnixStream::pair().unwrap();
        let mut writer = crate::writer::FrameWriter::new(left);
        let mut reader = FrameReader::new(right);

        let reader_thread = std::thread::spawn(move || {
            for expected in 0..64u16 {
                let frame = reader.read_frame().unwrap().unwrap();
                assert_eq!(frame.payload.as_ref(), format!("msg-{expected}").as_bytes());
            }
            assert!(reader.read_frame().unwrap().is_none());
        });

        for i in 0..64u16 {
            writer.send(format!("msg-{i}").as_bytes()).unwrap();
        }
        writer.send_end_of_stream().unwrap();

        reader_thread.join().unwrap();
    }

    #[test]
    fn interrupted_read_retries() {
        let reader = InterruptedThenData {
            interrupted: false,
            inner: Cursor::new(wire(&[b"ok"])),
        };
        let mut framed = FrameReader::new(reader);
        assert_eq!(payload(framed.read_frame().unwrap()), b"ok");
    }

    #[test]
    fn would_block_propagates_io_error() {
        let mut framed = FrameReader::new(WouldBlockReader);
        let err = framed.read_frame().unwrap_err();
        assert!(matches!(err, FrameError::Io(e) if e.kind() == ErrorKind::WouldBlock));
    }

    #[test]
    fn accessors_and_into_inner() {
        let reader = FrameReader::new(Cursor::new(vec![1u8, 2, 3]));
        assert_eq!(reader.get_ref().get_ref().len(), 3);
        let inner = reader.into_inner();
        assert_eq!(inner.into_inner(), vec![1, 2, 3]);
    }

    /// Serves at most `chunk` bytes per `read` call.
    struct ChunkedReader {
        bytes: Vec<u8>,
        pos: usize,
        chunk: usize,
    }

    impl ChunkedReader {
        fn new(bytes: Vec<u8>, chunk: usize) -> Self {
            Self {
                bytes,
                pos: 0,
                chunk,
            }
        }
    }

    impl Read for ChunkedReader {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let remaining = self.bytes.len() - self.pos;
            let n = remaining.min(buf.len()).min(self.chunk);
            buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    struct InterruptedThenData {
        interrupted: bool,
        inner: Cursor<Vec<u8>>,
    }

    impl Read for InterruptedThenData {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(std::io::Error::from(ErrorKind::Interrupted));
            }
            self.inner.read(buf)
        }
    }

    struct WouldBlockReader;

    impl Read for WouldBlockReader {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::WouldBlock))
        }
    }
}
