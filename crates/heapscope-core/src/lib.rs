//! Core types and traits for the Heapscope heap-trace analyzer.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the Heapscope workspace:
//! epoch and address ids, type and site metadata, the per-object
//! [`ObjectRecord`], root pointers, the filter trait used by heap walks,
//! and the [`AnomalySink`] consistency problems are reported through.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod anomaly;
pub mod bits;
pub mod cancel;
pub mod error;
pub mod id;
pub mod info;
pub mod record;
pub mod root;
pub mod traits;

pub use anomaly::{Anomaly, AnomalySink, LogSink};
pub use bits::IndexBitSet;
pub use cancel::CancelFlag;
pub use error::{FilterError, RecordError, SymbolsError};
pub use id::{Address, DenseIndex, GcId, ObjectId, SiteId, SpaceId, TypeId};
pub use info::{AllocatedType, AllocationSite, EventKind, ObjectInfo, Symbols};
pub use record::{pointer_count_of, ObjectRecord};
pub use root::{RootKind, RootPtr};
pub use traits::{accepts_all, ObjectFilter, ObjectView};
