//! Lab-based heap reconstruction for Heapscope.
//!
//! A trace reports allocations as addresses inside thread-local
//! allocation buffers. This crate rebuilds that layout so objects can be
//! looked up by address and followed across GCs.
//!
//! # Architecture
//!
//! ```text
//! HeapSnapshot (orchestrator)
//! ├── Space × N (eden, survivor, old, regions)
//! │   ├── front: BTreeMap<Address, Lab>   current state
//! │   └── back:  BTreeMap<Address, Lab>   pre-GC state during a transition
//! │       └── Lab → ObjectRecord[] (bump-allocated, address-ordered)
//! ├── RootMap (target address → root pointers)
//! └── active GCs (epoch → spaces evacuated)
//! ```
//!
//! # GC transitions
//!
//! - **Accumulative:** the space keeps its objects; survivors moved in are
//!   added on top.
//! - **ReplaceAll:** the space is evacuated; objects not moved out before
//!   the GC ends are dead.
//!
//! [`HeapSnapshot::to_indexed`] freezes the current state into an
//! [`IndexedHeap`] with dense, address-ordered indices.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod heap;
pub mod index;
pub mod lab;
pub mod space;
pub mod walk;

pub use config::{ArenaConfig, ConfigError};
pub use error::{ArenaError, LabContext};
pub use heap::HeapSnapshot;
pub use index::{IndexedHeap, IndexedObject};
pub use lab::{Lab, LabCapacity, LabKind, TryAllocate};
pub use space::{Space, Transition};
pub use walk::{RootMap, WalkContext};

const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<HeapSnapshot>();
    assert::<IndexedHeap>();
};
