//! Window state: classification maps, histograms, and span metrics.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use heapscope_arena::IndexedHeap;
use heapscope_core::{
    Address, Anomaly, DenseIndex, GcId, IndexBitSet, ObjectId, ObjectInfo,
};

use crate::age::ObjectAgeCollection;
use crate::event::{BoundaryKind, GcBoundary};

/// Where an object sat in the window-start and window-end heaps.
///
/// Start fields are `None` for BORN objects; end fields stay `None`
/// until the window is finalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StartEnd {
    /// Address at window start.
    pub start_address: Option<Address>,
    /// Dense index in the window-start heap.
    pub start_index: Option<DenseIndex>,
    /// Address at window end.
    pub end_address: Option<Address>,
    /// Dense index in the window-end heap.
    pub end_index: Option<DenseIndex>,
}

/// A PERM or BORN object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedObject {
    /// Identity class.
    pub info: Arc<ObjectInfo>,
    /// Birth epoch.
    pub born_at: GcId,
    /// Start and end positions.
    pub positions: StartEnd,
}

/// Objects and bytes, summed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ObjectBytes {
    /// Object count.
    pub objects: u64,
    /// Byte count.
    pub bytes: u64,
}

impl ObjectBytes {
    /// Count one object of `size` bytes.
    pub fn add(&mut self, size: u64) {
        self.objects += 1;
        self.bytes += size;
    }
}

/// Everything the tracker learned about one window.
///
/// Handed to [`EvolutionListener`](crate::EvolutionListener)s while the
/// window is open and returned by
/// [`EvolutionTracker::finish`](crate::EvolutionTracker::finish).
#[derive(Clone, Debug, Default)]
pub struct EvolutionData {
    /// Epoch of the boundary that opened the window.
    pub start_gc: Option<GcId>,
    /// Kind of the boundary that opened the window.
    pub start_kind: Option<BoundaryKind>,
    /// Every boundary observed inside the window, in order.
    pub gc_infos: Vec<GcBoundary>,
    /// Objects alive at window start and not (yet) seen dying.
    pub perm: IndexMap<ObjectId, TrackedObject>,
    /// Objects allocated inside the window and alive at its end.
    /// Filled in at finalization.
    pub born: IndexMap<ObjectId, TrackedObject>,
    /// Window-start indices of PERM objects that died.
    pub died: IndexBitSet,
    /// PERM objects that died, summed whether or not ages are tracked.
    pub died_totals: ObjectBytes,
    /// Ages of PERM objects that died.
    pub died_ages: ObjectAgeCollection,
    /// Objects born and collected inside the window, summed whether or
    /// not ages are tracked.
    pub temp_totals: ObjectBytes,
    /// Ages of objects born and collected inside the window.
    pub temp_ages: ObjectAgeCollection,
    /// BORN objects per birth epoch. Filled in at finalization.
    pub born_per_gc: BTreeMap<GcId, ObjectBytes>,
    /// Window-start index to window-end index of every surviving PERM object.
    pub perm_end_index_map: IndexMap<DenseIndex, DenseIndex>,
    /// Window-end index to object of every BORN object.
    pub born_end_index_map: IndexMap<DenseIndex, ObjectId>,
    /// Dense view of the heap when the window opened.
    pub start_heap: IndexedHeap,
    /// Dense view of the heap when the window closed.
    pub end_heap: IndexedHeap,
    /// Consistency problems seen while tracking.
    pub anomalies: Vec<Anomaly>,
    pub(crate) finalized: bool,
}

impl EvolutionData {
    /// Whether the window has been finalized.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// PERM objects still tracked.
    pub fn perm_object_count(&self) -> usize {
        self.perm.len()
    }

    /// Bytes of the PERM objects still tracked.
    pub fn perm_byte_count(&self) -> u64 {
        self.perm.values().map(|o| o.info.size).sum()
    }

    /// BORN objects found at finalization.
    pub fn born_object_count(&self) -> usize {
        self.born.len()
    }

    /// Bytes of the BORN objects.
    pub fn born_byte_count(&self) -> u64 {
        self.born.values().map(|o| o.info.size).sum()
    }

    /// PERM objects that died.
    pub fn died_object_count(&self) -> u64 {
        self.died_totals.objects
    }

    /// Bytes of the PERM objects that died.
    pub fn died_byte_count(&self) -> u64 {
        self.died_totals.bytes
    }

    /// Objects born and collected inside the window.
    pub fn temp_object_count(&self) -> u64 {
        self.temp_totals.objects
    }

    /// Bytes of the TEMP objects.
    pub fn temp_byte_count(&self) -> u64 {
        self.temp_totals.bytes
    }

    /// Time of the most recent boundary, if any.
    pub fn current_time(&self) -> Option<i64> {
        self.gc_infos.last().map(|g| g.time)
    }

    /// Time of the most recent GC start, if any.
    pub fn latest_gc_start_time(&self) -> Option<i64> {
        self.gc_infos
            .iter()
            .rev()
            .find(|g| g.is_start())
            .map(|g| g.time)
    }

    /// Time at which the window opened.
    pub fn start_time(&self) -> Option<i64> {
        self.gc_infos.first().map(|g| g.time)
    }

    /// Epochs between the first and last boundary.
    pub fn span_gcs(&self) -> i32 {
        match (self.gc_infos.first(), self.gc_infos.last()) {
            (Some(first), Some(last)) => i32::from(last.id.0) - i32::from(first.id.0),
            _ => 0,
        }
    }

    /// Milliseconds between the first and last boundary.
    pub fn span_millis(&self) -> i64 {
        match (self.gc_infos.first(), self.gc_infos.last()) {
            (Some(first), Some(last)) => last.time - first.time,
            _ => 0,
        }
    }

    /// Heap growth in bytes from window start to window end.
    pub fn absolute_heap_growth(&self) -> i64 {
        self.end_heap.byte_count() as i64 - self.start_heap.byte_count() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_follow_boundaries() {
        let mut data = EvolutionData::default();
        assert_eq!(data.span_gcs(), 0);
        assert_eq!(data.current_time(), None);

        data.gc_infos.push(GcBoundary::start(GcId(3), 100));
        data.gc_infos.push(GcBoundary::end(GcId(3), 120));
        data.gc_infos.push(GcBoundary::start(GcId(5), 400));
        data.gc_infos.push(GcBoundary::end(GcId(5), 410));

        assert_eq!(data.span_gcs(), 2);
        assert_eq!(data.span_millis(), 310);
        assert_eq!(data.start_time(), Some(100));
        assert_eq!(data.current_time(), Some(410));
        assert_eq!(data.latest_gc_start_time(), Some(400));
    }
}
