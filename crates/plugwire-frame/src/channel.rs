//! A bidirectional, typed object stream over two byte-stream halves.

use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use plugwire_transport::{Closer, StreamHalf};

use crate::binder::TypeBinder;
use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};
use crate::reader::FrameReader;
use crate::serializer::{Message, ObjectCodec};
use crate::writer::FrameWriter;

type BoxedReader = FrameReader<Box<dyn Read + Send>>;
type BoxedWriter = FrameWriter<Box<dyn Write + Send>>;

/// Framing limits plus the binder used to resolve incoming payload types.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub frame: FrameConfig,
    pub binder: Arc<TypeBinder>,
}

impl ChannelConfig {
    pub fn new(binder: TypeBinder) -> Self {
        Self {
            frame: FrameConfig::default(),
            binder: Arc::new(binder),
        }
    }

    /// Config whose binder knows exactly one type, `M`.
    pub fn for_message<M: Message>() -> Self {
        Self::new(TypeBinder::new().register::<M>())
    }

    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.frame.max_payload_size = max_payload_size;
        self
    }
}

/// Reads and writes whole messages of type `M`.
///
/// Reads and writes may happen concurrently from two different threads, but
/// each direction has a single owner: the connection's read loop calls
/// [`read_message`](Self::read_message), its write loop calls
/// [`write_message`](Self::write_message). [`close`](Self::close) may be
/// called from anywhere.
pub struct FramedChannel<M> {
    reader: Mutex<BoxedReader>,
    writer: Mutex<Option<BoxedWriter>>,
    codec: ObjectCodec,
    closers: Vec<Closer>,
    closed: AtomicBool,
    read_open: AtomicBool,
    write_open: AtomicBool,
    _message: PhantomData<fn() -> M>,
}

impl<M: Message> FramedChannel<M> {
    /// Channel that binds only `M`, with default frame limits.
    pub fn new<R, W>(input: R, output: W) -> Self
    where
        R: Read + StreamHalf,
        W: Write + StreamHalf,
    {
        Self::with_config(input, output, ChannelConfig::for_message::<M>())
    }

    pub fn with_config<R, W>(input: R, output: W, config: ChannelConfig) -> Self
    where
        R: Read + StreamHalf,
        W: Write + StreamHalf,
    {
        let closers = input.closer().into_iter().chain(output.closer()).collect();
        let input: Box<dyn Read + Send> = Box::new(input);
        let output: Box<dyn Write + Send> = Box::new(output);

        Self {
            reader: Mutex::new(FrameReader::with_config(input, config.frame)),
            writer: Mutex::new(Some(FrameWriter::with_config(output, config.frame))),
            codec: ObjectCodec::new(config.binder),
            closers,
            closed: AtomicBool::new(false),
            read_open: AtomicBool::new(true),
            write_open: AtomicBool::new(true),
            _message: PhantomData,
        }
    }

    /// True while the channel is open and the peer has not ended its stream.
    pub fn can_read(&self) -> bool {
        !self.is_closed() && self.read_open.load(Ordering::Acquire)
    }

    /// True while the channel is open and no write has failed.
    pub fn can_write(&self) -> bool {
        !self.is_closed() && self.write_open.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Block until the next message arrives.
    ///
    /// `Ok(None)` means the peer ended the stream gracefully.
    pub fn read_message(&self) -> Result<Option<M>> {
        if !self.can_read() {
            return Err(FrameError::ChannelClosed);
        }

        let mut reader = self.reader.lock().unwrap_or_else(PoisonError::into_inner);
        let frame = match reader.read_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!("peer ended stream");
                self.read_open.store(false, Ordering::Release);
                return Ok(None);
            }
            Err(err) => {
                self.read_open.store(false, Ordering::Release);
                return Err(err);
            }
        };
        drop(reader);

        tracing::trace!(len = frame.payload.len(), "frame received");
        self.codec.decode(&frame.payload).map(Some).inspect_err(|_| {
            self.read_open.store(false, Ordering::Release);
        })
    }

    /// Serialize and send one message, flushing before returning.
    pub fn write_message(&self, message: &M) -> Result<()> {
        let payload = self.codec.encode(message)?;
        self.with_writer(|writer| writer.send(&payload))?;
        tracing::trace!(len = payload.len(), "frame sent");
        Ok(())
    }

    /// Send the zero-length end-of-stream marker.
    pub fn write_end_of_stream(&self) -> Result<()> {
        self.with_writer(FrameWriter::send_end_of_stream)
    }

    fn with_writer(&self, op: impl FnOnce(&mut BoxedWriter) -> Result<()>) -> Result<()> {
        if !self.can_write() {
            return Err(FrameError::ChannelClosed);
        }

        let mut guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let writer = guard.as_mut().ok_or(FrameError::ChannelClosed)?;
        op(writer).inspect_err(|_| {
            self.write_open.store(false, Ordering::Release);
        })
    }

    /// Close both directions. Safe to call more than once and from any thread.
    ///
    /// Socket halves are shut down, which wakes a reader blocked in `read()`.
    /// The write half is dropped if no write is in progress, so a pipe peer
    /// sees EOF.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        for closer in &self.closers {
            if let Err(err) = closer.close() {
                tracing::trace!(error = %err, "ignoring error while closing stream");
            }
        }

        if let Ok(mut writer) = self.writer.try_lock() {
            writer.take();
        }
        tracing::debug!("framed channel closed");
    }
}

impl<M> fmt::Debug for FramedChannel<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FramedChannel")
            .field("type", &std::any::type_name::<M>())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("read_open", &self.read_open.load(Ordering::Relaxed))
            .field("write_open", &self.write_open.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
