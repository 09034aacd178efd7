//! Error types for the grapharc-core library.
//!
//! Every failure the engine can observe maps onto one [`ErrorKind`]. The
//! archive latches the first error it sees (see [`crate::Archive::is_error`]),
//! which is why [`Error`] is `Clone`: the latched value is handed back from
//! every later call on the same session.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for grapharc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Broad classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The transport moved fewer bytes than requested, or failed outright
    Io,
    /// Unknown or incompatible type in the stream
    Type,
    /// Count or capacity violation
    Size,
    /// Writer and reader disagree about the stream contents
    Desync,
    /// The archive has no direction to serialize in
    Mode,
}

/// Comprehensive error type for all grapharc operations
#[derive(Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The transport returned a short count
    #[error("short {op}: requested {requested} bytes, transport moved {transferred}")]
    ShortTransfer {
        /// `"save"` or `"load"`
        op: &'static str,
        /// Number of bytes the engine asked for
        requested: usize,
        /// Number of bytes the transport reported
        transferred: usize,
    },

    /// The transport itself reported an I/O error
    #[error("transport {op} failed: {source}")]
    Transport {
        /// `"save"`, `"load"`, `"flush"`, `"connect"`, ...
        op: &'static str,
        /// Underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// Failed to open an archive file
    #[error("failed to open archive '{path}': {source}")]
    FileOpen {
        /// Path to the file that failed to open
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The stream names a type that is not in the registry
    #[error("unknown type {id:016x} in stream")]
    UnknownType {
        /// Stable identifier read from the stream
        id: u64,
    },

    /// The stream names a type that is not compatible with the destination
    #[error("type mismatch: expected {expected}, stream holds {found}")]
    TypeMismatch {
        /// What the destination can hold
        expected: String,
        /// What the stream described
        found: String,
    },

    /// Two different tags hash to the same stable identifier
    #[error("type id collision: '{existing}' and '{incoming}' share id {id:016x}")]
    TypeCollision {
        /// The colliding stable identifier
        id: u64,
        /// Tag registered first
        existing: &'static str,
        /// Tag that tried to register second
        incoming: &'static str,
    },

    /// An object id was bound to an owner that cannot accept it
    #[error("object {id} cannot be bound here: {reason}")]
    Ownership {
        /// Archive-local object id
        id: u32,
        /// Why the binding was refused
        reason: &'static str,
    },

    /// A shared object is mutably borrowed elsewhere while being saved
    #[error("object at {address:#x} is already borrowed")]
    ObjectBusy {
        /// Address of the busy object
        address: usize,
    },

    /// A string payload is not valid UTF-8
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,

    /// A `char` payload is not a Unicode scalar value
    #[error("invalid char value {value:#x}")]
    InvalidChar {
        /// Raw 32-bit value read from the stream
        value: u32,
    },

    /// A fixed-size container count does not match the destination
    #[error("element count mismatch: destination holds {expected}, stream declares {found}")]
    CountMismatch {
        /// Declared capacity of the destination
        expected: usize,
        /// Count read from the stream
        found: u32,
    },

    /// A length does not fit the destination buffer
    #[error("length {length} exceeds capacity {capacity}")]
    CapacityExceeded {
        /// Length of the payload
        length: usize,
        /// Room available at the destination
        capacity: usize,
    },

    /// A declared length exceeds the configured limit
    #[error("declared length {length} exceeds the configured limit {limit}")]
    LengthLimit {
        /// Length read from the stream
        length: u32,
        /// Configured maximum
        limit: u32,
    },

    /// A fixed-width value does not fit the host integer type
    #[error("stream value does not fit host type {target}")]
    IntegerRange {
        /// Name of the destination type
        target: &'static str,
    },

    /// Checkpoint mismatch
    #[error("checkpoint mismatch: computed {computed:#010x}, stream holds {stored:#010x}")]
    ChecksumMismatch {
        /// Checksum accumulated by the reader
        computed: u32,
        /// Checksum stored by the writer
        stored: u32,
    },

    /// A varint does not terminate within 32 bits
    #[error("varint does not terminate within 5 bytes")]
    VarintOverflow,

    /// A first-use id is not the next sequential id
    #[error("unexpected {what} id {found}, expected {expected}")]
    UnexpectedId {
        /// `"object"` or `"type"`
        what: &'static str,
        /// Next id the writer would have assigned
        expected: u32,
        /// Id read from the stream
        found: u32,
    },

    /// `serialize()` was called on an archive with no direction
    #[error("archive mode is unknown; call set_save() or set_load() first")]
    NoMode,
}

impl Error {
    /// Creates a new short transfer error
    pub fn short_transfer(op: &'static str, requested: usize, transferred: usize) -> Self {
        Self::ShortTransfer {
            op,
            requested,
            transferred,
        }
    }

    /// Creates a new transport error
    pub fn transport(op: &'static str, source: std::io::Error) -> Self {
        Self::Transport {
            op,
            source: Arc::new(source),
        }
    }

    /// Creates a new file open error
    pub fn file_open(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileOpen {
            path: path.into(),
            source: Arc::new(source),
        }
    }

    /// Creates a new unknown type error
    pub fn unknown_type(id: u64) -> Self {
        Self::UnknownType { id }
    }

    /// Creates a new type mismatch error
    pub fn type_mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Creates a new ownership error
    pub fn ownership(id: u32, reason: &'static str) -> Self {
        Self::Ownership { id, reason }
    }

    /// Creates a new count mismatch error
    pub fn count_mismatch(expected: usize, found: u32) -> Self {
        Self::CountMismatch { expected, found }
    }

    /// Creates a new capacity error
    pub fn capacity_exceeded(length: usize, capacity: usize) -> Self {
        Self::CapacityExceeded { length, capacity }
    }

    /// Returns the broad category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ShortTransfer { .. } | Self::Transport { .. } | Self::FileOpen { .. } => {
                ErrorKind::Io
            }
            Self::UnknownType { .. }
            | Self::TypeMismatch { .. }
            | Self::TypeCollision { .. }
            | Self::Ownership { .. }
            | Self::ObjectBusy { .. }
            | Self::InvalidUtf8
            | Self::InvalidChar { .. } => ErrorKind::Type,
            Self::CountMismatch { .. }
            | Self::CapacityExceeded { .. }
            | Self::LengthLimit { .. }
            | Self::IntegerRange { .. } => ErrorKind::Size,
            Self::ChecksumMismatch { .. }
            | Self::VarintOverflow
            | Self::UnexpectedId { .. } => ErrorKind::Desync,
            Self::NoMode => ErrorKind::Mode,
        }
    }

    /// Returns true for transport failures
    pub fn is_io(&self) -> bool {
        self.kind() == ErrorKind::Io
    }

    /// Returns true for unknown or incompatible types
    pub fn is_type(&self) -> bool {
        self.kind() == ErrorKind::Type
    }

    /// Returns true for count and capacity violations
    pub fn is_size(&self) -> bool {
        self.kind() == ErrorKind::Size
    }

    /// Returns true when writer and reader fell out of step
    pub fn is_desync(&self) -> bool {
        self.kind() == ErrorKind::Desync
    }
}
