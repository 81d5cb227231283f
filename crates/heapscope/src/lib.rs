//! Heapscope: heap-trace analysis for garbage-collected runtimes.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Heapscope sub-crates. For most users, adding `heapscope` as a single
//! dependency is sufficient.
//!
//! # Quick start
//!
//! Track which objects of a two-space heap survive a young GC:
//!
//! ```rust
//! use std::sync::Arc;
//! use heapscope::prelude::*;
//!
//! let mut symbols = Symbols::new(true, 8).unwrap();
//! let ty = symbols.add_type(AllocatedType {
//!     id: TypeId(1),
//!     internal_name: "LNode;".into(),
//!     size: 16,
//!     pointers_per_object: Some(1),
//! });
//! let site = symbols.add_site(AllocationSite {
//!     id: SiteId(1),
//!     label: "Node.<init>".into(),
//!     allocated_type: Some(TypeId(1)),
//! });
//! let info = Arc::new(ObjectInfo::instance("main".into(), EventKind::C2Fast, site, ty, 8));
//!
//! let mut heap = HeapSnapshot::new(symbols, ArenaConfig::default());
//! heap.add_space(Space::new(SpaceId(0), "eden", Address(0x1000), 0x1000));
//! heap.add_space(Space::new(SpaceId(1), "old", Address(0x8000), 0x1000));
//!
//! let mut tracker = EvolutionTracker::new(heap, WindowConfig::new(10, i64::MAX)).unwrap();
//! for addr in [0x1000, 0x1010] {
//!     tracker
//!         .apply(HeapEvent::Allocate {
//!             space: SpaceId(0),
//!             thread: "main".into(),
//!             kind: LabKind::Tlab,
//!             address: Some(Address(addr)),
//!             info: Arc::clone(&info),
//!             may_be_filler: false,
//!         })
//!         .unwrap();
//! }
//! tracker
//!     .apply(GcBoundary::start(GcId(1), 10).collecting([SpaceId(0)]).into())
//!     .unwrap();
//! tracker
//!     .apply(HeapEvent::Move {
//!         from: Address(0x1000),
//!         to_space: SpaceId(1),
//!         to: Address(0x8000),
//!         thread: "gc".into(),
//!     })
//!     .unwrap();
//! tracker.apply(GcBoundary::end(GcId(1), 11).into()).unwrap();
//!
//! let data = tracker.finish().unwrap();
//! assert_eq!(data.perm_object_count(), 1);
//! assert_eq!(data.died_object_count(), 1);
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `heapscope-core` | Ids, object identity, records, roots, anomalies |
//! | [`arena`] | `heapscope-arena` | Spaces, labs, and the GC-aware heap snapshot |
//! | [`evolution`] | `heapscope-evolution` | PERM/BORN/DIED/TEMP window tracking |
//! | [`dump`] | `heapscope-dump` | HPROF reading, writing, and batch resolution |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core ids, object identity, and shared traits (`heapscope-core`).
///
/// Contains [`types::ObjectRecord`], the [`types::Symbols`] table, root
/// pointers, and the [`types::AnomalySink`] reporting seam.
pub use heapscope_core as types;

/// Spaces, labs, and the heap snapshot (`heapscope-arena`).
///
/// [`arena::HeapSnapshot`] replays allocations and moves and applies GC
/// transitions to its spaces.
pub use heapscope_arena as arena;

/// Window tracking (`heapscope-evolution`).
///
/// Feed [`evolution::HeapEvent`]s to an [`evolution::EvolutionTracker`]
/// and collect its [`evolution::EvolutionData`].
pub use heapscope_evolution as evolution;

/// HPROF heap dumps (`heapscope-dump`).
///
/// Read with [`dump::HprofReader`], write with [`dump::HprofWriter`], and
/// resolve whole dumps with [`dump::HeapDumpResolver`].
pub use heapscope_dump as dump;

/// Common imports for typical Heapscope usage.
///
/// ```rust
/// use heapscope::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use heapscope_core::{
        Address, AllocatedType, AllocationSite, Anomaly, AnomalySink, CancelFlag, DenseIndex,
        EventKind, GcId, ObjectFilter, ObjectId, ObjectInfo, ObjectRecord, RootKind, RootPtr,
        SiteId, SpaceId, Symbols, TypeId,
    };

    // Heap
    pub use heapscope_arena::{
        ArenaConfig, ArenaError, HeapSnapshot, IndexedHeap, LabKind, Space, WalkContext,
    };

    // Evolution
    pub use heapscope_evolution::{
        EvolutionData, EvolutionError, EvolutionListener, EvolutionTracker, GcBoundary,
        HeapEvent, TrackingActions, WindowConfig, WindowPhase,
    };

    // Dumps
    pub use heapscope_dump::{
        DumpError, HeapDumpResolver, HprofReader, HprofWriter, PointerTarget, ResolvedHeap,
        ResolverConfig,
    };
}
