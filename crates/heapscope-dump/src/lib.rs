//! HPROF heap-dump support for Heapscope.
//!
//! Reads and writes the `JAVA PROFILE 1.0.x` binary format and resolves a
//! whole dump into dense, index-aligned arrays:
//!
//! ```text
//! HprofReader ──records──▶ DumpIngest ──into_index()──▶ SortedIndex ──resolve()──▶ ResolvedHeap
//!                           (native ids)                 (sorted ids)              (dense indices)
//! ```
//!
//! [`HeapDumpResolver`] runs the whole pipeline in one call. Ids that name
//! no object either fail the resolution or are kept as
//! [`PointerTarget::Unresolved`], depending on [`ResolverConfig`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod reader;
pub mod resolver;
pub mod types;
pub mod writer;

pub use config::ResolverConfig;
pub use error::DumpError;
pub use handler::RecordHandler;
pub use reader::HprofReader;
pub use resolver::{DumpIngest, HeapDumpResolver, PointerTarget, ResolvedHeap, SortedIndex};
pub use types::{
    BasicType, ClassDump, ConstantEntry, FieldDecl, FieldValue, HeapSummary, HprofHeader,
    InstanceDump, LoadClass, ObjectArrayDump, PrimitiveArrayDump, StackFrame, StackTrace,
    StartThread, StaticField, SubRecord,
};
pub use writer::HprofWriter;
