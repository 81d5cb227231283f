//! Heap evolution tracking for Heapscope.
//!
//! Replays an ordered stream of [`HeapEvent`]s into a
//! [`HeapSnapshot`](heapscope_arena::HeapSnapshot) and classifies objects
//! relative to a window of GC epochs:
//!
//! - **PERM:** alive at window start and at window end.
//! - **BORN:** allocated inside the window and alive at its end.
//! - **DIED:** alive at window start, collected before its end.
//! - **TEMP:** allocated and collected inside the window.
//!
//! DIED and TEMP objects are recorded in [`ObjectAgeCollection`]s keyed by
//! identity, with the number of GCs each object survived. PERM and BORN
//! objects keep their window-start and window-end positions as
//! [`StartEnd`] pairs.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──(boundary at/after start_time)──▶ Open
//! Open ──(GcStart ⇄ GcEnd)*──▶ Open
//! Open ──(boundary at/after end_time, or finish())──▶ Finished
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod age;
pub mod config;
pub mod data;
pub mod error;
pub mod event;
pub mod listener;
pub mod tracker;

pub use age::ObjectAgeCollection;
pub use config::{ConfigError, TrackingActions, WindowConfig};
pub use data::{EvolutionData, ObjectBytes, StartEnd, TrackedObject};
pub use error::EvolutionError;
pub use event::{BoundaryKind, GcBoundary, HeapEvent};
pub use listener::EvolutionListener;
pub use tracker::{EvolutionTracker, WindowPhase};
