//! Events the trace reader hands to the tracker.

use std::sync::Arc;

use heapscope_arena::{Lab, LabKind, Space};
use heapscope_core::{Address, GcId, ObjectInfo, RootPtr, SpaceId};

/// Whether a boundary opens or closes a GC.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundaryKind {
    /// The GC pause begins.
    Start,
    /// The GC pause ends.
    End,
}

/// A GC start or end as reported by the trace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GcBoundary {
    /// Epoch of the GC.
    pub id: GcId,
    /// Trace time in milliseconds.
    pub time: i64,
    /// Start or end.
    pub kind: BoundaryKind,
    /// Whether the GC collects every space.
    pub full: bool,
    /// Spaces a minor GC evacuates. Only read on [`BoundaryKind::Start`].
    pub collected_spaces: Vec<SpaceId>,
    /// Synthesized by the tracker rather than reported by the trace.
    pub synthetic: bool,
}

impl GcBoundary {
    /// Start of a minor GC that evacuates nothing yet.
    pub fn start(id: GcId, time: i64) -> Self {
        Self {
            id,
            time,
            kind: BoundaryKind::Start,
            full: false,
            collected_spaces: Vec::new(),
            synthetic: false,
        }
    }

    /// End of GC `id`.
    pub fn end(id: GcId, time: i64) -> Self {
        Self {
            kind: BoundaryKind::End,
            ..Self::start(id, time)
        }
    }

    /// Mark the GC as full.
    pub fn full(mut self) -> Self {
        self.full = true;
        self
    }

    /// Spaces the GC evacuates.
    pub fn collecting(mut self, spaces: impl IntoIterator<Item = SpaceId>) -> Self {
        self.collected_spaces.extend(spaces);
        self
    }

    /// Whether this is a GC start.
    pub fn is_start(&self) -> bool {
        self.kind == BoundaryKind::Start
    }
}

/// One step of the trace, applied to the heap in order.
#[derive(Clone, Debug)]
pub enum HeapEvent {
    /// A heap space came into existence.
    Space(Space),
    /// A thread obtained a lab.
    Lab {
        /// Space holding the lab.
        space: SpaceId,
        /// The lab.
        lab: Lab,
    },
    /// A mutator allocation.
    Allocate {
        /// Target space.
        space: SpaceId,
        /// Allocating thread.
        thread: Arc<str>,
        /// Kind of lab opened if the address is not yet claimed.
        kind: LabKind,
        /// Reported address, or `None` to bump the thread's current lab.
        address: Option<Address>,
        /// Identity of the new object.
        info: Arc<ObjectInfo>,
        /// Whether the allocation site may produce filler objects.
        may_be_filler: bool,
    },
    /// A GC relocated an object.
    Move {
        /// Old address.
        from: Address,
        /// Destination space.
        to_space: SpaceId,
        /// New address.
        to: Address,
        /// GC worker thread.
        thread: Arc<str>,
    },
    /// Outgoing pointers of the object at `addr`.
    Pointers {
        /// The object.
        addr: Address,
        /// Pointer values; `None` is a null slot.
        values: Vec<Option<Address>>,
    },
    /// A root pointer.
    Root(RootPtr<Address>),
    /// A GC started or ended.
    Gc(GcBoundary),
}

impl From<GcBoundary> for HeapEvent {
    fn from(boundary: GcBoundary) -> Self {
        Self::Gc(boundary)
    }
}
