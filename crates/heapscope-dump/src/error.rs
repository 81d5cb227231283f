//! Error types for heap-dump reading and resolution.

use std::fmt;
use std::io;

/// Errors that can occur while reading, writing, or resolving a dump.
#[derive(Debug)]
pub enum DumpError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// The stream does not start with a `JAVA PROFILE 1.0.x` header.
    InvalidHeader {
        /// The header string found.
        found: String,
    },
    /// Identifiers are neither 4 nor 8 bytes wide.
    UnsupportedIdSize {
        /// The id size found in the header.
        size: u32,
    },
    /// A record could not be decoded (truncated or corrupt data).
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// A heap-dump sub-record tag is not recognized.
    UnknownSubRecord {
        /// The unrecognized tag.
        tag: u8,
        /// Byte offset of the tag within its heap-dump segment.
        offset: usize,
    },
    /// A field or array element type tag is not recognized.
    UnknownBasicType {
        /// The unrecognized tag.
        tag: u8,
    },
    /// A pointer names an object id that is not in the dump, and the
    /// resolver runs in strict mode.
    UnresolvedObject {
        /// Raw id of the object holding the pointer, or 0 for a root.
        from: u64,
        /// The unknown raw id.
        target: u64,
    },
    /// Resolution was cancelled through its
    /// [`CancelFlag`](heapscope_core::CancelFlag).
    Cancelled,
}

impl fmt::Display for DumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::InvalidHeader { found } => {
                write!(f, "invalid header {found:?} (expected \"JAVA PROFILE 1.0.x\")")
            }
            Self::UnsupportedIdSize { size } => {
                write!(f, "unsupported identifier size {size} (expected 4 or 8)")
            }
            Self::Malformed { detail } => write!(f, "malformed record: {detail}"),
            Self::UnknownSubRecord { tag, offset } => {
                write!(f, "unknown heap-dump sub-record tag {tag:#04x} at offset {offset}")
            }
            Self::UnknownBasicType { tag } => write!(f, "unknown basic type tag {tag}"),
            Self::UnresolvedObject { from, target } => {
                write!(f, "object {from:#x} points to unknown object {target:#x}")
            }
            Self::Cancelled => write!(f, "heap-dump resolution cancelled"),
        }
    }
}

impl std::error::Error for DumpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DumpError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
