//! The evolution tracker state machine.

use std::sync::Arc;

use crossbeam_channel::Receiver;

use heapscope_arena::{HeapSnapshot, WalkContext};
use heapscope_core::{
    Anomaly, AnomalySink, CancelFlag, GcId, IndexBitSet, LogSink, ObjectRecord,
};

use crate::config::WindowConfig;
use crate::data::{EvolutionData, StartEnd, TrackedObject};
use crate::error::EvolutionError;
use crate::event::{BoundaryKind, GcBoundary, HeapEvent};
use crate::listener::EvolutionListener;

/// Where the tracker is relative to its window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowPhase {
    /// No boundary has reached the window start yet.
    Uninitialized,
    /// The window is open; boundaries update the classification.
    Open,
    /// The window closed and its data is finalized.
    Finished,
}

/// Replays heap events and classifies objects over one window.
///
/// Events must arrive in trace order. At the boundary that opens the
/// window every live object becomes PERM. At each GC end inside the
/// window, objects left behind in evacuated spaces are classified as
/// DIED (if PERM) or TEMP. At the boundary that closes the window, the
/// surviving non-PERM objects become BORN.
///
/// # Example
///
/// ```
/// use heapscope_arena::{ArenaConfig, HeapSnapshot};
/// use heapscope_core::{GcId, Symbols};
/// use heapscope_evolution::{EvolutionTracker, GcBoundary, WindowConfig};
///
/// let heap = HeapSnapshot::new(Symbols::new(true, 8).unwrap(), ArenaConfig::default());
/// let mut tracker = EvolutionTracker::new(heap, WindowConfig::new(0, 100)).unwrap();
/// tracker.apply(GcBoundary::start(GcId(1), 10).into()).unwrap();
/// tracker.apply(GcBoundary::end(GcId(1), 12).into()).unwrap();
/// let data = tracker.finish().unwrap();
/// assert!(data.is_finalized());
/// assert_eq!(data.gc_infos.len(), 3);
/// ```
pub struct EvolutionTracker {
    heap: HeapSnapshot,
    config: WindowConfig,
    phase: WindowPhase,
    data: EvolutionData,
    listeners: Vec<Box<dyn EvolutionListener + Send>>,
    sink: Box<dyn AnomalySink + Send>,
    cancel: Option<CancelFlag>,
    latest_time: Option<i64>,
}

impl EvolutionTracker {
    /// Create a tracker over `heap`, reporting anomalies to the log.
    pub fn new(heap: HeapSnapshot, config: WindowConfig) -> Result<Self, EvolutionError> {
        config.validate()?;
        Ok(Self {
            heap,
            config,
            phase: WindowPhase::Uninitialized,
            data: EvolutionData::default(),
            listeners: Vec::new(),
            sink: Box::new(LogSink),
            cancel: None,
            latest_time: None,
        })
    }

    /// Register a listener.
    pub fn with_listener(mut self, listener: impl EvolutionListener + Send + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Report anomalies to `sink` instead of the log.
    pub fn with_sink(mut self, sink: impl AnomalySink + Send + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Stop with [`EvolutionError::Cancelled`] once `flag` is set.
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// The heap being replayed.
    pub fn heap(&self) -> &HeapSnapshot {
        &self.heap
    }

    /// Window state so far.
    pub fn data(&self) -> &EvolutionData {
        &self.data
    }

    /// Current phase.
    pub fn phase(&self) -> WindowPhase {
        self.phase
    }

    /// Apply one trace event.
    pub fn apply(&mut self, event: HeapEvent) -> Result<(), EvolutionError> {
        if self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled) {
            return Err(EvolutionError::Cancelled);
        }
        match event {
            HeapEvent::Space(space) => self.heap.add_space(space),
            HeapEvent::Lab { space, lab } => self.heap.add_lab(space, lab)?,
            HeapEvent::Allocate {
                space,
                thread,
                kind,
                address,
                info,
                may_be_filler,
            } => {
                self.heap
                    .allocate(space, &thread, kind, address, info, may_be_filler)?;
            }
            HeapEvent::Move {
                from,
                to_space,
                to,
                thread,
            } => {
                self.heap.move_object(from, to_space, to, &thread)?;
            }
            HeapEvent::Pointers { addr, values } => self.heap.set_pointers(addr, &values)?,
            HeapEvent::Root(root) => self.heap.add_root(root),
            HeapEvent::Gc(boundary) => {
                if let Some(previous) = self.latest_time.filter(|&t| t > boundary.time) {
                    return Err(EvolutionError::OutOfOrder {
                        previous,
                        time: boundary.time,
                    });
                }
                self.latest_time = Some(boundary.time);
                match boundary.kind {
                    BoundaryKind::Start => self.gc_start(boundary)?,
                    BoundaryKind::End => self.gc_end(boundary)?,
                }
            }
        }
        Ok(())
    }

    /// Apply every event from `events` until the sender side disconnects.
    ///
    /// Returns the number of events applied.
    pub fn drain(&mut self, events: &Receiver<HeapEvent>) -> Result<usize, EvolutionError> {
        let mut applied = 0;
        for event in events.iter() {
            self.apply(event)?;
            applied += 1;
        }
        log::debug!("drained {applied} heap events");
        Ok(applied)
    }

    /// Close the window and return its data.
    ///
    /// A window still open when the trace ends is closed by a synthetic
    /// GC start at the configured end time (or the last boundary's time
    /// when the window is unbounded).
    pub fn finish(mut self) -> Result<EvolutionData, EvolutionError> {
        match self.phase {
            WindowPhase::Uninitialized => {
                return Err(EvolutionError::WindowNotOpened {
                    start_time: self.config.start_time,
                })
            }
            WindowPhase::Open => {
                let time = match self.config.end_time {
                    i64::MAX => self.latest_time.unwrap_or(self.config.start_time),
                    end => end,
                };
                let boundary = GcBoundary {
                    synthetic: true,
                    ..GcBoundary::start(self.heap.latest_gc_id(), time)
                };
                self.data.gc_infos.push(boundary);
                self.finalize();
                self.notify(|l, d| l.gc_start(d));
                self.notify(|l, d| l.window_end(d));
                self.phase = WindowPhase::Finished;
            }
            WindowPhase::Finished => {}
        }
        Ok(self.data)
    }

    // ── GC boundaries ──────────────────────────────────────────────

    fn gc_start(&mut self, boundary: GcBoundary) -> Result<(), EvolutionError> {
        let opens = self.opens_window(&boundary);
        if opens {
            self.open_window(&boundary);
        }
        if self.phase == WindowPhase::Open {
            self.data.gc_infos.push(boundary.clone());
            if opens {
                self.notify(|l, d| l.window_start(d));
            }
            self.notify(|l, d| l.gc_start(d));
            if boundary.time >= self.config.end_time {
                self.close_window();
            }
        }

        self.heap.start_gc(boundary.id, boundary.full)?;
        for &space in &boundary.collected_spaces {
            self.heap.mark_space_for_collection(space, boundary.id)?;
        }
        Ok(())
    }

    fn gc_end(&mut self, boundary: GcBoundary) -> Result<(), EvolutionError> {
        if self.phase == WindowPhase::Open {
            // Evacuated spaces are dropped by stop_gc, so classify first.
            self.classify_collected()?;
            self.heap.stop_gc(boundary.id)?;
            let closes = boundary.time >= self.config.end_time;
            self.data.gc_infos.push(boundary);
            self.notify(|l, d| l.gc_end(d));
            if closes {
                self.close_window();
            }
            return Ok(());
        }

        self.heap.stop_gc(boundary.id)?;
        if self.opens_window(&boundary) {
            self.open_window(&boundary);
            let closes = boundary.time >= self.config.end_time;
            self.data.gc_infos.push(boundary);
            self.notify(|l, d| l.window_start(d));
            self.notify(|l, d| l.gc_end(d));
            if closes {
                self.close_window();
            }
        }
        Ok(())
    }

    fn opens_window(&self, boundary: &GcBoundary) -> bool {
        self.phase == WindowPhase::Uninitialized && boundary.time >= self.config.start_time
    }

    fn open_window(&mut self, boundary: &GcBoundary) {
        // Classification of the start heap needs roots to live objects only.
        let dropped = self.heap.resolve_root_ptrs();
        let start = self.heap.to_indexed();
        let data = &mut self.data;
        data.start_gc = Some(boundary.id);
        data.start_kind = Some(boundary.kind);
        data.died = IndexBitSet::with_capacity(start.len());
        data.perm = start
            .iter()
            .map(|(index, obj)| {
                let tracked = TrackedObject {
                    info: Arc::clone(&obj.info),
                    born_at: obj.born_at,
                    positions: StartEnd {
                        start_address: Some(obj.address),
                        start_index: Some(index),
                        ..StartEnd::default()
                    },
                };
                (obj.id, tracked)
            })
            .collect();
        data.start_heap = start;
        self.phase = WindowPhase::Open;
        log::info!(
            "window opened at GC {} ({:?}, time {}) with {} PERM objects, {dropped} stale roots dropped",
            boundary.id,
            boundary.kind,
            boundary.time,
            self.data.perm.len()
        );
    }

    fn close_window(&mut self) {
        self.finalize();
        self.phase = WindowPhase::Finished;
        self.notify(|l, d| l.window_end(d));
    }

    // ── Classification ─────────────────────────────────────────────

    fn classify_collected(&mut self) -> Result<(), EvolutionError> {
        let Self {
            heap,
            config,
            data,
            sink,
            cancel,
            ..
        } = self;
        let Some(start_gc) = data.start_gc else {
            return Ok(());
        };
        let gc = heap.latest_gc_id();
        let opened_at_gc_start = data.start_kind == Some(BoundaryKind::Start);
        let actions = config.actions;
        let symbols = heap.symbols();
        let ctx = WalkContext {
            cancel: cancel.as_ref(),
            ..WalkContext::default()
        };

        let mut died = 0usize;
        let mut temp = 0usize;
        heap.iterate_collected(&ctx, &mut |_, _, record| {
            if record.last_moved_at == Some(gc) {
                return;
            }
            let in_perm = data.perm.contains_key(&record.id);
            if in_perm && opened_at_gc_start && record.born_at == start_gc {
                if symbols.may_be_filler(&record.info.site) {
                    data.perm.swap_remove(&record.id);
                } else {
                    flag(
                        &mut **sink,
                        data,
                        Anomaly::UnexpectedStartObject {
                            object: record.id,
                            born_at: record.born_at,
                        },
                    );
                }
            } else if in_perm {
                if let Some(index) = data
                    .perm
                    .swap_remove(&record.id)
                    .and_then(|p| p.positions.start_index)
                {
                    data.died.insert(index);
                }
                died += 1;
                data.died_totals.add(record.size());
                if actions.died {
                    let age = survived_gcs(record, gc, &mut **sink, data);
                    data.died_ages.put(&record.info, age);
                }
            } else if record.born_at < start_gc {
                flag(
                    &mut **sink,
                    data,
                    Anomaly::MissingPerm {
                        object: record.id,
                        born_at: record.born_at,
                    },
                );
            } else {
                temp += 1;
                data.temp_totals.add(record.size());
                if actions.temp {
                    let age = survived_gcs(record, gc, &mut **sink, data);
                    data.temp_ages.put(&record.info, age);
                }
            }
        })?;
        log::debug!("GC {gc} ended: {died} PERM objects died, {temp} TEMP objects");
        Ok(())
    }

    fn finalize(&mut self) {
        if self.data.finalized {
            return;
        }
        let end = self.heap.to_indexed();
        let actions = self.config.actions;
        let data = &mut self.data;

        let mut born = 0usize;
        for (index, obj) in end.iter() {
            if let Some(perm) = data.perm.get_mut(&obj.id) {
                if actions.perm {
                    perm.positions.end_address = Some(obj.address);
                    perm.positions.end_index = Some(index);
                    if let Some(start) = perm.positions.start_index {
                        data.perm_end_index_map.insert(start, index);
                    }
                }
                continue;
            }
            born += 1;
            if !actions.born {
                continue;
            }
            let (end_address, end_index) = match obj.forward {
                None => (obj.address, index),
                Some(forward) => match end.to_index(forward) {
                    Some(forwarded) => (forward, forwarded),
                    None => {
                        flag(
                            &mut *self.sink,
                            data,
                            Anomaly::UnresolvedForward {
                                object: obj.id,
                                forward,
                            },
                        );
                        (obj.address, index)
                    }
                },
            };
            data.born.insert(
                obj.id,
                TrackedObject {
                    info: Arc::clone(&obj.info),
                    born_at: obj.born_at,
                    positions: StartEnd {
                        end_address: Some(end_address),
                        end_index: Some(end_index),
                        ..StartEnd::default()
                    },
                },
            );
            data.born_end_index_map.insert(end_index, obj.id);
            data.born_per_gc.entry(obj.born_at).or_default().add(obj.size);
        }

        let (perm, objects) = (data.perm.len(), end.len());
        if perm + born != objects {
            flag(
                &mut *self.sink,
                data,
                Anomaly::CountMismatch {
                    perm,
                    born,
                    objects,
                },
            );
        }
        data.end_heap = end;
        data.finalized = true;
        log::info!(
            "window finalized: {perm} PERM, {born} BORN, {} DIED, {} TEMP",
            data.died_object_count(),
            data.temp_object_count()
        );
    }

    fn notify(&mut self, event: impl Fn(&mut dyn EvolutionListener, &EvolutionData)) {
        for listener in &mut self.listeners {
            event(listener.as_mut(), &self.data);
        }
    }
}

fn flag(sink: &mut dyn AnomalySink, data: &mut EvolutionData, anomaly: Anomaly) {
    sink.report(&anomaly);
    data.anomalies.push(anomaly);
}

/// GCs `record` survived before dying in `gc`. Negative ages are flagged
/// and recorded as 0.
fn survived_gcs(
    record: &ObjectRecord,
    gc: GcId,
    sink: &mut dyn AnomalySink,
    data: &mut EvolutionData,
) -> u32 {
    let survived = record.born_at.survived_until(gc);
    u32::try_from(survived).unwrap_or_else(|_| {
        flag(
            sink,
            data,
            Anomaly::NegativeAge {
                object: record.id,
                born_at: record.born_at,
                gc,
            },
        );
        0
    })
}

const _: fn() = || {
    fn assert<T: Send>() {}
    assert::<EvolutionTracker>();
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackingActions;
    use heapscope_arena::{ArenaConfig, Lab, LabCapacity, LabKind, Space, TryAllocate};
    use heapscope_core::{
        Address, AllocatedType, AllocationSite, DenseIndex, EventKind, ObjectId, ObjectInfo,
        SiteId, SpaceId, Symbols, TypeId,
    };

    const EDEN: SpaceId = SpaceId(0);
    const OLD: SpaceId = SpaceId(1);

    fn info() -> Arc<ObjectInfo> {
        let ty = Arc::new(AllocatedType {
            id: TypeId(1),
            internal_name: "LItem;".into(),
            size: 16,
            pointers_per_object: Some(0),
        });
        let site = Arc::new(AllocationSite {
            id: SiteId(1),
            label: "Item.<init>".into(),
            allocated_type: Some(TypeId(1)),
        });
        Arc::new(ObjectInfo::instance("main".into(), EventKind::C1Fast, site, ty, 8))
    }

    fn tracker(start: i64, end: i64) -> EvolutionTracker {
        let mut heap = HeapSnapshot::new(Symbols::new(true, 8).unwrap(), ArenaConfig::default());
        heap.add_space(Space::new(EDEN, "eden", Address(0x1000), 0x1000));
        heap.add_space(Space::new(OLD, "old", Address(0x8000), 0x1000));
        EvolutionTracker::new(heap, WindowConfig::new(start, end)).unwrap()
    }

    fn alloc(t: &mut EvolutionTracker, space: SpaceId, addr: u64) {
        t.apply(HeapEvent::Allocate {
            space,
            thread: "main".into(),
            kind: LabKind::Tlab,
            address: Some(Address(addr)),
            info: info(),
            may_be_filler: false,
        })
        .unwrap();
    }

    fn moved(t: &mut EvolutionTracker, from: u64, to: u64) {
        t.apply(HeapEvent::Move {
            from: Address(from),
            to_space: OLD,
            to: Address(to),
            thread: "gc".into(),
        })
        .unwrap();
    }

    #[test]
    fn boundaries_before_window_only_update_heap() {
        let mut t = tracker(100, 200);
        alloc(&mut t, EDEN, 0x1000);
        t.apply(GcBoundary::start(GcId(1), 10).collecting([EDEN]).into())
            .unwrap();
        t.apply(GcBoundary::end(GcId(1), 11).into()).unwrap();
        assert_eq!(t.phase(), WindowPhase::Uninitialized);
        assert!(t.data().gc_infos.is_empty());
        assert_eq!(t.heap().object_count(), 0);
    }

    #[test]
    fn temp_object_recorded_with_age() {
        let mut t = tracker(0, 1000);
        t.apply(GcBoundary::start(GcId(1), 10).into()).unwrap();
        t.apply(GcBoundary::end(GcId(1), 11).into()).unwrap();
        // Born at epoch 1, inside the window.
        alloc(&mut t, EDEN, 0x1000);
        t.apply(GcBoundary::start(GcId(2), 20).into()).unwrap();
        t.apply(GcBoundary::end(GcId(2), 21).into()).unwrap();
        t.apply(GcBoundary::start(GcId(3), 30).collecting([EDEN]).into())
            .unwrap();
        t.apply(GcBoundary::end(GcId(3), 31).into()).unwrap();

        let data = t.finish().unwrap();
        assert_eq!(data.temp_object_count(), 1);
        assert_eq!(data.temp_ages.get_age(&info(), 1), Some(1));
        assert_eq!(data.born_object_count(), 0);
        assert!(data.anomalies.is_empty());
    }

    #[test]
    fn perm_object_moved_survives() {
        let mut t = tracker(0, 1000);
        alloc(&mut t, EDEN, 0x1000);
        t.apply(GcBoundary::start(GcId(1), 10).collecting([EDEN]).into())
            .unwrap();
        moved(&mut t, 0x1000, 0x8000);
        t.apply(GcBoundary::end(GcId(1), 11).into()).unwrap();

        let data = t.finish().unwrap();
        assert_eq!(data.perm_object_count(), 1);
        assert_eq!(data.died_object_count(), 0);
        let perm = data.perm.values().next().unwrap();
        assert_eq!(perm.positions.start_address, Some(Address(0x1000)));
        assert_eq!(perm.positions.end_address, Some(Address(0x8000)));
        assert_eq!(data.perm_end_index_map.len(), 1);
    }

    #[test]
    fn died_count_kept_without_died_ages() {
        let mut heap = HeapSnapshot::new(Symbols::new(true, 8).unwrap(), ArenaConfig::default());
        heap.add_space(Space::new(EDEN, "eden", Address(0x1000), 0x1000));
        heap.add_space(Space::new(OLD, "old", Address(0x8000), 0x1000));
        let config = WindowConfig {
            actions: TrackingActions {
                died: false,
                temp: false,
                ..TrackingActions::ALL
            },
            ..WindowConfig::new(0, 1000)
        };
        let mut t = EvolutionTracker::new(heap, config).unwrap();
        alloc(&mut t, EDEN, 0x1000);
        alloc(&mut t, EDEN, 0x1010);
        t.apply(GcBoundary::start(GcId(1), 10).collecting([EDEN]).into())
            .unwrap();
        moved(&mut t, 0x1000, 0x8000);
        t.apply(GcBoundary::end(GcId(1), 11).into()).unwrap();
        // Born at epoch 1 and collected in GC 2.
        alloc(&mut t, EDEN, 0x1000);
        t.apply(GcBoundary::start(GcId(2), 20).collecting([EDEN]).into())
            .unwrap();
        t.apply(GcBoundary::end(GcId(2), 21).into()).unwrap();

        let data = t.finish().unwrap();
        assert_eq!(data.died.len(), 1);
        assert_eq!(data.died_object_count(), 1);
        assert_eq!(data.died_byte_count(), 16);
        assert_eq!(data.died_object_count() + data.perm_object_count() as u64, 2);
        assert_eq!(data.temp_object_count(), 1);
        assert!(data.died_ages.is_empty());
        assert!(data.temp_ages.is_empty());
    }

    #[test]
    fn dangling_forward_on_born_object_is_flagged() {
        let mut t = tracker(0, 1000);
        t.apply(GcBoundary::start(GcId(1), 10).into()).unwrap();
        t.apply(GcBoundary::end(GcId(1), 11).into()).unwrap();

        let mut lab = Lab::new("main", LabKind::Tlab, Address(0x1000), LabCapacity::Fixed(0x100));
        let mut record = ObjectRecord::with_pointer_count(ObjectId(42), info(), GcId(1), Some(0));
        record.tag = Some(Address(0x8800));
        assert!(matches!(
            lab.try_allocate(None, record),
            Ok(TryAllocate::Assigned(Address(0x1000)))
        ));
        t.apply(HeapEvent::Lab { space: EDEN, lab }).unwrap();

        let data = t.finish().unwrap();
        assert_eq!(
            data.anomalies,
            vec![Anomaly::UnresolvedForward {
                object: ObjectId(42),
                forward: Address(0x8800)
            }]
        );
        let born = &data.born[&ObjectId(42)];
        assert_eq!(born.positions.end_address, Some(Address(0x1000)));
        assert_eq!(born.positions.end_index, Some(DenseIndex(0)));
    }

    #[test]
    fn out_of_order_boundary_rejected() {
        let mut t = tracker(0, 1000);
        t.apply(GcBoundary::start(GcId(1), 10).into()).unwrap();
        assert_eq!(
            t.apply(GcBoundary::end(GcId(1), 5).into()),
            Err(EvolutionError::OutOfOrder {
                previous: 10,
                time: 5
            })
        );
    }

    #[test]
    fn finish_without_window_fails() {
        let t = tracker(100, 200);
        assert!(matches!(
            t.finish(),
            Err(EvolutionError::WindowNotOpened { start_time: 100 })
        ));
    }

    #[test]
    fn cancelled_tracker_stops() {
        let flag = CancelFlag::new();
        let mut t = tracker(0, 100).with_cancel(flag.clone());
        flag.cancel();
        assert_eq!(
            t.apply(GcBoundary::start(GcId(1), 1).into()),
            Err(EvolutionError::Cancelled)
        );
    }

    #[test]
    fn invalid_config_rejected() {
        let heap = HeapSnapshot::new(Symbols::new(true, 8).unwrap(), ArenaConfig::default());
        assert!(matches!(
            EvolutionTracker::new(heap, WindowConfig::new(5, 1)),
            Err(EvolutionError::Config(_))
        ));
    }
}
