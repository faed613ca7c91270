//! The compiler-worker envelope carried over a plugwire connection.
//!
//! Host and worker exchange [`CompilerMessage`]s. Requests carry an id and
//! the worker echoes it on the matching reply, so one duplex connection can
//! hold any number of outstanding requests.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// What a [`CompilerMessage`] is asking for or answering with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Worker is up and accepting requests.
    Ready,
    /// Host asks for a set of sources to be compiled.
    Compile,
    /// Worker answers a compile request with the built assembly.
    Assembly,
    /// Worker could not satisfy the request with the same id.
    Error,
    /// Host asks the worker to shut down.
    Exit,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Compile => "compile",
            Self::Assembly => "assembly",
            Self::Error => "error",
            Self::Exit => "exit",
        }
    }
}

/// One named source file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub name: String,
    pub data: Vec<u8>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

/// Envelope body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
    Sources(Vec<SourceFile>),
}

impl Payload {
    /// Size of the carried data in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
            Self::Sources(files) => files.iter().map(|file| file.data.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompilerMessage {
    /// Request id; replies reuse the id of the request they answer.
    pub id: u32,
    pub kind: MessageKind,
    pub data: Option<Payload>,
    pub extra_data: Option<Payload>,
}

impl CompilerMessage {
    pub fn new(id: u32, kind: MessageKind) -> Self {
        Self {
            id,
            kind,
            data: None,
            extra_data: None,
        }
    }

    pub fn ready() -> Self {
        Self::new(0, MessageKind::Ready)
    }

    pub fn compile(id: u32, sources: Vec<SourceFile>) -> Self {
        Self::new(id, MessageKind::Compile).with_data(Payload::Sources(sources))
    }

    pub fn assembly(id: u32, image: Vec<u8>) -> Self {
        Self::new(id, MessageKind::Assembly).with_data(Payload::Binary(image))
    }

    pub fn error(id: u32, message: impl Into<String>) -> Self {
        Self::new(id, MessageKind::Error).with_data(Payload::Text(message.into()))
    }

    pub fn exit() -> Self {
        Self::new(0, MessageKind::Exit)
    }

    pub fn with_data(mut self, data: Payload) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_extra(mut self, extra: Payload) -> Self {
        self.extra_data = Some(extra);
        self
    }

    /// True if `self` answers `request`.
    pub fn answers(&self, request: &CompilerMessage) -> bool {
        request.kind == MessageKind::Compile
            && matches!(self.kind, MessageKind::Assembly | MessageKind::Error)
            && self.id == request.id
    }

    /// Sources carried by a compile request.
    pub fn sources(&self) -> Option<&[SourceFile]> {
        match &self.data {
            Some(Payload::Sources(files)) => Some(files),
            _ => None,
        }
    }
}

/// Hands out request ids. Starts at 1; 0 is used by `Ready` and `Exit`.
#[derive(Debug)]
pub struct RequestIds {
    next: AtomicU32,
}

impl RequestIds {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    /// Next id. Wraps past `u32::MAX`, skipping 0.
    pub fn next_id(&self) -> u32 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for RequestIds {
    fn default() -> Self {
        Self::new()
    }
}
