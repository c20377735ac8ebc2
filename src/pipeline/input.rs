//! Input values: every representation a document can arrive in.
//!
//! The set is closed. A host that hands us documents (an editor shell, a web
//! server, the CLI) picks the variant that matches what it actually holds;
//! [`crate::pipeline::classify`] then refines strings into URL kinds and
//! [`crate::pipeline::materialize`] turns any of them into canonical bytes.

use bytes::Bytes;
use std::fmt;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::io::AsyncRead;

/// Element type of a fixed-width numeric buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericKind {
    Int8,
    Uint8Clamped,
    Int16,
    Uint16,
    Int32,
    Uint32,
    Float32,
    Float64,
    BigInt64,
    BigUint64,
}

impl NumericKind {
    /// Width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            NumericKind::Int8 | NumericKind::Uint8Clamped => 1,
            NumericKind::Int16 | NumericKind::Uint16 => 2,
            NumericKind::Int32 | NumericKind::Uint32 | NumericKind::Float32 => 4,
            NumericKind::Float64 | NumericKind::BigInt64 | NumericKind::BigUint64 => 8,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            NumericKind::Int8 => "Int8Array",
            NumericKind::Uint8Clamped => "Uint8ClampedArray",
            NumericKind::Int16 => "Int16Array",
            NumericKind::Uint16 => "Uint16Array",
            NumericKind::Int32 => "Int32Array",
            NumericKind::Uint32 => "Uint32Array",
            NumericKind::Float32 => "Float32Array",
            NumericKind::Float64 => "Float64Array",
            NumericKind::BigInt64 => "BigInt64Array",
            NumericKind::BigUint64 => "BigUint64Array",
        }
    }
}

/// A typed view over shared storage: `len` elements of `kind` starting at
/// `byte_offset`.
#[derive(Debug, Clone)]
pub struct TypedBuffer {
    kind: NumericKind,
    storage: Bytes,
    byte_offset: usize,
    len: usize,
}

impl TypedBuffer {
    /// Create a view. Returns `None` when the view would run past the end
    /// of `storage` or the offset is not aligned to the element width.
    pub fn new(kind: NumericKind, storage: Bytes, byte_offset: usize, len: usize) -> Option<Self> {
        let end = len
            .checked_mul(kind.width())
            .and_then(|n| n.checked_add(byte_offset))?;
        if end > storage.len() || byte_offset % kind.width() != 0 {
            return None;
        }
        Some(Self {
            kind,
            storage,
            byte_offset,
            len,
        })
    }

    /// View over all of `storage`, truncated to whole elements.
    pub fn whole(kind: NumericKind, storage: Bytes) -> Self {
        let len = storage.len() / kind.width();
        Self {
            kind,
            storage,
            byte_offset: 0,
            len,
        }
    }

    pub fn from_u16(values: &[u16]) -> Self {
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::whole(NumericKind::Uint16, Bytes::from(raw))
    }

    pub fn from_f32(values: &[f32]) -> Self {
        let raw: Vec<u8> = values.iter().flat_map(|v| v.to_ne_bytes()).collect();
        Self::whole(NumericKind::Float32, Bytes::from(raw))
    }

    pub fn kind(&self) -> NumericKind {
        self.kind
    }

    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len * self.kind.width()
    }

    /// Zero-copy byte view over the same storage.
    pub fn as_bytes(&self) -> Bytes {
        self.storage
            .slice(self.byte_offset..self.byte_offset + self.byte_len())
    }
}

/// A file on the local file system with the size recorded when the handle
/// was opened.
#[derive(Debug, Clone)]
pub struct FileHandle {
    path: PathBuf,
    size: u64,
}

impl FileHandle {
    /// Open a handle, recording the file size from its metadata.
    pub async fn open(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let meta = tokio::fs::metadata(&path).await?;
        Ok(Self {
            path,
            size: meta.len(),
        })
    }

    /// Build a handle with an explicit recorded size.
    pub fn with_size(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// File name component, if any.
    pub fn name(&self) -> Option<&str> {
        self.path.file_name().and_then(|n| n.to_str())
    }
}

/// Boxed async byte source backing a [`BlobHandle`].
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// An opaque blob: an async reader plus its declared size and MIME type.
pub struct BlobHandle {
    size: u64,
    mime: Option<String>,
    reader: BlobReader,
}

impl BlobHandle {
    pub fn new(reader: BlobReader, size: u64) -> Self {
        Self {
            size,
            mime: None,
            reader,
        }
    }

    /// A blob backed by bytes already in memory.
    pub fn from_bytes(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let size = data.len() as u64;
        Self::new(Box::pin(std::io::Cursor::new(data)), size)
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = Some(mime.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub(crate) fn into_reader(self) -> BlobReader {
        self.reader
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("size", &self.size)
            .field("mime", &self.mime)
            .field("reader", &"<dyn AsyncRead>")
            .finish()
    }
}

/// A document source in one of the supported representations.
#[derive(Debug)]
pub enum Input {
    /// Canonical byte buffer.
    Bytes(Bytes),
    /// Fixed-width numeric buffer other than plain bytes.
    Numeric(TypedBuffer),
    /// Contiguous memory region (whole backing store, no element type).
    Memory(Bytes),
    File(FileHandle),
    Blob(BlobHandle),
    /// A string: URL of some kind or literal text.
    Text(String),
    /// A string as UTF-16 code units; may contain lone surrogates.
    WideText(Vec<u16>),
    /// Anything else; `type_name` is reported in errors.
    Unknown { type_name: String },
}

impl Input {
    pub fn unknown(type_name: impl Into<String>) -> Self {
        Input::Unknown {
            type_name: type_name.into(),
        }
    }
}

impl From<Bytes> for Input {
    fn from(b: Bytes) -> Self {
        Input::Bytes(b)
    }
}

impl From<Vec<u8>> for Input {
    fn from(v: Vec<u8>) -> Self {
        Input::Bytes(Bytes::from(v))
    }
}

impl From<&'static [u8]> for Input {
    fn from(v: &'static [u8]) -> Self {
        Input::Bytes(Bytes::from_static(v))
    }
}

impl From<TypedBuffer> for Input {
    fn from(t: TypedBuffer) -> Self {
        Input::Numeric(t)
    }
}

impl From<FileHandle> for Input {
    fn from(f: FileHandle) -> Self {
        Input::File(f)
    }
}

impl From<BlobHandle> for Input {
    fn from(b: BlobHandle) -> Self {
        Input::Blob(b)
    }
}

impl From<String> for Input {
    fn from(s: String) -> Self {
        Input::Text(s)
    }
}

impl From<&str> for Input {
    fn from(s: &str) -> Self {
        Input::Text(s.to_string())
    }
}
