//! The reconstructed heap a trace is replayed into.

use std::sync::Arc;

use indexmap::IndexMap;

use heapscope_core::{
    Address, GcId, ObjectId, ObjectInfo, ObjectRecord, RootPtr, SpaceId, Symbols,
};

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::index::{IndexedHeap, IndexedObject};
use crate::lab::{Lab, LabCapacity, LabKind};
use crate::space::{Space, Transition};
use crate::walk::{RootMap, WalkContext};

/// Spaces, labs, roots, and GC bookkeeping of one traced heap.
///
/// The snapshot models the state an external GC produced. Objects are
/// never freed here; a GC that evacuates a space drops the space's old
/// labs when it ends, and anything not moved out of them is gone.
#[derive(Clone, Debug)]
pub struct HeapSnapshot {
    symbols: Symbols,
    config: ArenaConfig,
    spaces: IndexMap<SpaceId, Space>,
    roots: RootMap,
    clear_roots_on_add: bool,
    active_gcs: IndexMap<GcId, Vec<SpaceId>>,
    latest_gc: GcId,
    next_object_id: u64,
}

impl HeapSnapshot {
    /// Create an empty heap at epoch 0.
    pub fn new(symbols: Symbols, config: ArenaConfig) -> Self {
        Self {
            symbols,
            config,
            spaces: IndexMap::new(),
            roots: RootMap::new(),
            clear_roots_on_add: false,
            active_gcs: IndexMap::new(),
            latest_gc: GcId(0),
            next_object_id: 0,
        }
    }

    /// Type and site registry.
    pub fn symbols(&self) -> &Symbols {
        &self.symbols
    }

    /// Mutable type and site registry.
    pub fn symbols_mut(&mut self) -> &mut Symbols {
        &mut self.symbols
    }

    /// Lab sizing configuration.
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    /// Register a space, replacing any space with the same id.
    pub fn add_space(&mut self, space: Space) {
        self.spaces.insert(space.id(), space);
    }

    /// Look up a space.
    pub fn space(&self, id: SpaceId) -> Option<&Space> {
        self.spaces.get(&id)
    }

    /// All spaces, in registration order.
    pub fn spaces(&self) -> impl Iterator<Item = &Space> + '_ {
        self.spaces.values()
    }

    fn space_mut(&mut self, id: SpaceId) -> Result<&mut Space, ArenaError> {
        self.spaces
            .get_mut(&id)
            .ok_or(ArenaError::UnknownSpace { space: id })
    }

    /// The space covering `addr`.
    pub fn space_for(&self, addr: Address) -> Option<&Space> {
        self.spaces.values().find(|s| s.contains(addr))
    }

    fn space_for_mut(&mut self, addr: Address) -> Result<&mut Space, ArenaError> {
        self.spaces
            .values_mut()
            .find(|s| s.contains(addr))
            .ok_or(ArenaError::NoSpaceForAddress { addr })
    }

    /// Epoch of the most recent GC start or end.
    pub fn latest_gc_id(&self) -> GcId {
        self.latest_gc
    }

    /// Whether any GC is running.
    pub fn is_gc_active(&self) -> bool {
        !self.active_gcs.is_empty()
    }

    /// Create a record born in the current epoch, with a fresh id.
    pub fn new_record(&mut self, info: Arc<ObjectInfo>, may_be_filler: bool) -> ObjectRecord {
        let id = ObjectId(self.next_object_id);
        self.next_object_id += 1;
        ObjectRecord::new(id, info, self.latest_gc, &self.symbols, may_be_filler)
    }

    /// Register a lab (typically a TLAB announced by the trace).
    pub fn add_lab(&mut self, space: SpaceId, lab: Lab) -> Result<(), ArenaError> {
        self.space_mut(space)?.add_lab(lab)
    }

    /// Allocate a new object.
    ///
    /// With an address the object goes to the lab claiming it, or to a new
    /// extendable lab of `kind` opened at that address. Without one it is
    /// bumped into `thread`'s highest lab in `space`.
    pub fn allocate(
        &mut self,
        space: SpaceId,
        thread: &str,
        kind: LabKind,
        requested: Option<Address>,
        info: Arc<ObjectInfo>,
        may_be_filler: bool,
    ) -> Result<(ObjectId, Address), ArenaError> {
        let record = self.new_record(info, may_be_filler);
        let id = record.id;
        let config = &self.config;
        let space = self
            .spaces
            .get_mut(&space)
            .ok_or(ArenaError::UnknownSpace { space })?;
        let addr = space.assign(thread, requested, record, |at| {
            Lab::with_config(thread, kind, at, LabCapacity::Unknown, config)
        })?;
        Ok((id, addr))
    }

    /// Relocate the object at `from` to `to` in `to_space` during a GC.
    ///
    /// The old copy keeps its place in the pre-GC labs with `last_moved_at`
    /// set to the running epoch and its forwarding `tag` set to `to`.
    pub fn move_object(
        &mut self,
        from: Address,
        to_space: SpaceId,
        to: Address,
        thread: &str,
    ) -> Result<Address, ArenaError> {
        let gc = self.latest_gc;
        if !self.active_gcs.contains_key(&gc) {
            return Err(ArenaError::NoActiveGc { gc });
        }
        let source = self.space_for_mut(from)?;
        if source.transition() != Some(Transition::ReplaceAll) {
            return Err(ArenaError::SourceNotCollected {
                addr: from,
                space: source.id(),
            });
        }
        let record = source
            .find_previous_lab_mut(from)
            .ok_or(ArenaError::ObjectNotFound { addr: from })?
            .get_object_mut(from)?;
        record.last_moved_at = Some(gc);
        record.tag = Some(to);
        let mut copy = record.clone();
        copy.tag = None;

        let config = &self.config;
        let dest = self
            .spaces
            .get_mut(&to_space)
            .ok_or(ArenaError::UnknownSpace { space: to_space })?;
        dest.assign(thread, Some(to), copy, |at| {
            Lab::with_config(thread, LabKind::Virtual, at, LabCapacity::Unknown, config)
        })
    }

    /// Fill the pointer slots of the current-state object at `addr`.
    pub fn set_pointers(&mut self, addr: Address, values: &[Option<Address>]) -> Result<(), ArenaError> {
        self.space_for_mut(addr)?
            .get_object_mut(addr)?
            .fill_pointers(values)?;
        Ok(())
    }

    /// Begin GC `gc`.
    ///
    /// A full GC evacuates every space; otherwise spaces keep their
    /// objects until [`mark_space_for_collection`](Self::mark_space_for_collection)
    /// says otherwise.
    pub fn start_gc(&mut self, gc: GcId, full: bool) -> Result<(), ArenaError> {
        if full && !self.active_gcs.is_empty() {
            return Err(ArenaError::FullGcWhileActive { gc });
        }
        if self.active_gcs.contains_key(&gc) {
            return Err(ArenaError::GcAlreadyActive { gc });
        }
        self.active_gcs.insert(gc, Vec::new());
        let transition = if full {
            Transition::ReplaceAll
        } else {
            Transition::Accumulative
        };
        for space in self.spaces.values_mut() {
            space.reset_forwarding_addresses();
            if !space.is_being_collected() {
                space.start_transition(transition)?;
            }
        }
        self.clear_roots_on_add = true;
        self.latest_gc = gc;
        log::debug!("GC {gc} started (full: {full})");
        Ok(())
    }

    /// Mark `space` as evacuated by GC `gc`: everything not moved out of
    /// it before the GC ends dies.
    pub fn mark_space_for_collection(&mut self, space: SpaceId, gc: GcId) -> Result<(), ArenaError> {
        let collected = self
            .active_gcs
            .get_mut(&gc)
            .ok_or(ArenaError::NoActiveGc { gc })?;
        if collected.contains(&space) {
            return Err(ArenaError::SpaceAlreadyCollected { space });
        }
        let target = self
            .spaces
            .get_mut(&space)
            .ok_or(ArenaError::UnknownSpace { space })?;
        if target.is_being_collected() {
            return Err(ArenaError::SpaceAlreadyCollected { space });
        }
        collected.push(space);
        target.start_transition(Transition::ReplaceAll)
    }

    /// End GC `gc` and commit its spaces' transitions.
    ///
    /// When no other GC is running, every space's transition commits.
    /// Empty labs and roots to vanished objects are dropped.
    pub fn stop_gc(&mut self, gc: GcId) -> Result<(), ArenaError> {
        let collected = self
            .active_gcs
            .shift_remove(&gc)
            .ok_or(ArenaError::NoActiveGc { gc })?;
        let any_active = !self.active_gcs.is_empty();
        for id in collected {
            let space = self.space_mut(id)?;
            if space.transition().is_some() {
                space.commit_transition()?;
                if any_active {
                    space.start_transition(Transition::Accumulative)?;
                }
            }
        }
        if !any_active {
            for space in self.spaces.values_mut() {
                if space.transition().is_some() {
                    space.commit_transition()?;
                }
            }
        }
        for space in self.spaces.values_mut() {
            space.remove_empty_labs();
        }
        let dropped = self.resolve_root_ptrs();
        log::debug!("GC {gc} ended, {dropped} stale roots dropped");
        Ok(())
    }

    /// Record a root pointer.
    ///
    /// The first root reported after a GC start replaces the previous set.
    pub fn add_root(&mut self, root: RootPtr<Address>) {
        if self.clear_roots_on_add {
            self.roots.clear();
            self.clear_roots_on_add = false;
        }
        self.roots.entry(root.target).or_default().push(root);
    }

    /// Root pointers by target address.
    pub fn roots(&self) -> &RootMap {
        &self.roots
    }

    /// Drop roots whose target is not a current-state object.
    ///
    /// Returns the number of roots removed.
    pub fn resolve_root_ptrs(&mut self) -> usize {
        let before: usize = self.roots.values().map(Vec::len).sum();
        let stale: Vec<Address> = self
            .roots
            .keys()
            .copied()
            .filter(|&addr| self.get_object(addr).is_err())
            .collect();
        for addr in stale {
            self.roots.shift_remove(&addr);
        }
        let after: usize = self.roots.values().map(Vec::len).sum();
        before - after
    }

    /// The current-state object at `addr`.
    pub fn get_object(&self, addr: Address) -> Result<&ObjectRecord, ArenaError> {
        self.space_for(addr)
            .ok_or(ArenaError::NoSpaceForAddress { addr })?
            .get_object(addr)
    }

    /// Number of objects in the current state.
    pub fn object_count(&self) -> usize {
        self.spaces.values().map(Space::object_count).sum()
    }

    /// Bytes allocated in the current state.
    pub fn byte_count(&self) -> u64 {
        self.spaces.values().map(Space::fill).sum()
    }

    /// Visit every current-state object that passes `ctx`'s filters.
    pub fn iterate(
        &self,
        ctx: &WalkContext<'_>,
        visitor: &mut dyn FnMut(SpaceId, Address, &ObjectRecord),
    ) -> Result<usize, ArenaError> {
        let ctx = WalkContext {
            roots: ctx.roots.or(Some(&self.roots)),
            ..*ctx
        };
        let mut visited = 0;
        for space in self.spaces.values() {
            ctx.check_cancelled()?;
            let id = space.id();
            visited += space.iterate(&ctx, &mut |addr, record| visitor(id, addr, record))?;
        }
        Ok(visited)
    }

    /// Visit the pre-GC objects of every space the running GC evacuates.
    ///
    /// Must run before [`stop_gc`](Self::stop_gc), which drops those labs.
    pub fn iterate_collected(
        &self,
        ctx: &WalkContext<'_>,
        visitor: &mut dyn FnMut(SpaceId, Address, &ObjectRecord),
    ) -> Result<usize, ArenaError> {
        let mut visited = 0;
        for space in self.spaces.values().filter(|s| s.is_being_collected()) {
            ctx.check_cancelled()?;
            let id = space.id();
            visited += space.iterate_previous(ctx, &mut |addr, record| visitor(id, addr, record))?;
        }
        Ok(visited)
    }

    /// Clear every forwarding address.
    pub fn reset_forwarding_addresses(&mut self) {
        for space in self.spaces.values_mut() {
            space.reset_forwarding_addresses();
        }
    }

    /// Release unused lab storage.
    pub fn reduce_size(&mut self) {
        for space in self.spaces.values_mut() {
            space.reduce_size();
        }
    }

    /// Build the dense address-ordered index of the current state.
    pub fn to_indexed(&self) -> IndexedHeap {
        let mut objects = Vec::with_capacity(self.object_count());
        for space in self.spaces.values() {
            for lab in space.current_labs() {
                objects.extend(lab.objects().map(|(address, r)| IndexedObject {
                    address,
                    id: r.id,
                    born_at: r.born_at,
                    size: r.size(),
                    forward: r.tag,
                    info: Arc::clone(&r.info),
                }));
            }
        }
        IndexedHeap::from_objects(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapscope_core::{
        AllocatedType, AllocationSite, EventKind, RootKind, SiteId, TypeId,
    };

    fn info() -> Arc<ObjectInfo> {
        let ty = Arc::new(AllocatedType {
            id: TypeId(1),
            internal_name: "LNode;".into(),
            size: 16,
            pointers_per_object: Some(1),
        });
        let site = Arc::new(AllocationSite {
            id: SiteId(1),
            label: "Node.<init>".into(),
            allocated_type: Some(TypeId(1)),
        });
        Arc::new(ObjectInfo::instance("main".into(), EventKind::C2Fast, site, ty, 8))
    }

    fn heap() -> HeapSnapshot {
        let mut heap = HeapSnapshot::new(Symbols::new(true, 8).unwrap(), ArenaConfig::default());
        heap.add_space(Space::new(SpaceId(0), "eden", Address(0x1000), 0x1000));
        heap.add_space(Space::new(SpaceId(1), "old", Address(0x8000), 0x1000));
        heap
    }

    fn alloc(heap: &mut HeapSnapshot, addr: u64) -> ObjectId {
        heap.allocate(SpaceId(0), "main", LabKind::Tlab, Some(Address(addr)), info(), false)
            .unwrap()
            .0
    }

    #[test]
    fn allocate_and_lookup() {
        let mut heap = heap();
        let a = alloc(&mut heap, 0x1000);
        let b = alloc(&mut heap, 0x1010);
        assert_ne!(a, b);
        assert_eq!(heap.get_object(Address(0x1010)).unwrap().id, b);
        assert_eq!(heap.object_count(), 2);
        assert_eq!(heap.byte_count(), 32);
        assert!(matches!(
            heap.get_object(Address(0x0010)),
            Err(ArenaError::NoSpaceForAddress { .. })
        ));
    }

    #[test]
    fn minor_gc_kills_unmoved_objects_in_collected_space() {
        let mut heap = heap();
        let survivor = alloc(&mut heap, 0x1000);
        alloc(&mut heap, 0x1010);

        heap.start_gc(GcId(1), false).unwrap();
        heap.mark_space_for_collection(SpaceId(0), GcId(1)).unwrap();
        heap.move_object(Address(0x1000), SpaceId(1), Address(0x8000), "gc")
            .unwrap();

        let mut unmoved = Vec::new();
        heap.iterate_collected(&WalkContext::default(), &mut |_, addr, r| {
            if r.last_moved_at != Some(GcId(1)) {
                unmoved.push(addr);
            }
        })
        .unwrap();
        assert_eq!(unmoved, vec![Address(0x1010)]);

        heap.stop_gc(GcId(1)).unwrap();
        assert_eq!(heap.object_count(), 1);
        let moved = heap.get_object(Address(0x8000)).unwrap();
        assert_eq!(moved.id, survivor);
        assert_eq!(moved.born_at, GcId(0));
        assert_eq!(moved.last_moved_at, Some(GcId(1)));
    }

    #[test]
    fn gc_bookkeeping_errors() {
        let mut heap = heap();
        assert_eq!(heap.stop_gc(GcId(3)), Err(ArenaError::NoActiveGc { gc: GcId(3) }));
        heap.start_gc(GcId(3), false).unwrap();
        assert_eq!(
            heap.start_gc(GcId(3), false),
            Err(ArenaError::GcAlreadyActive { gc: GcId(3) })
        );
        assert_eq!(
            heap.start_gc(GcId(4), true),
            Err(ArenaError::FullGcWhileActive { gc: GcId(4) })
        );
        heap.mark_space_for_collection(SpaceId(0), GcId(3)).unwrap();
        assert_eq!(
            heap.mark_space_for_collection(SpaceId(0), GcId(3)),
            Err(ArenaError::SpaceAlreadyCollected { space: SpaceId(0) })
        );
        assert_eq!(
            heap.mark_space_for_collection(SpaceId(1), GcId(9)),
            Err(ArenaError::NoActiveGc { gc: GcId(9) })
        );
    }

    #[test]
    fn move_requires_evacuated_source() {
        let mut heap = heap();
        alloc(&mut heap, 0x1000);
        heap.start_gc(GcId(1), false).unwrap();
        assert_eq!(
            heap.move_object(Address(0x1000), SpaceId(1), Address(0x8000), "gc"),
            Err(ArenaError::SourceNotCollected {
                addr: Address(0x1000),
                space: SpaceId(0)
            })
        );
    }

    #[test]
    fn roots_are_replaced_after_gc_start_and_pruned_at_end() {
        let mut heap = heap();
        alloc(&mut heap, 0x1000);
        alloc(&mut heap, 0x1010);
        heap.add_root(RootPtr::new(RootKind::JavaFrame, Address(0x1000)));
        heap.add_root(RootPtr::new(RootKind::StaticField, Address(0x1010)));
        assert_eq!(heap.resolve_root_ptrs(), 0);

        heap.start_gc(GcId(1), true).unwrap();
        heap.add_root(RootPtr::new(RootKind::JniGlobal, Address(0x1010)));
        assert_eq!(heap.roots().len(), 1);
        heap.move_object(Address(0x1000), SpaceId(1), Address(0x8000), "gc")
            .unwrap();
        heap.stop_gc(GcId(1)).unwrap();
        // 0x1010 was not moved, so its root is gone.
        assert!(heap.roots().is_empty());
    }

    #[test]
    fn indexed_heap_orders_by_address() {
        let mut heap = heap();
        heap.allocate(SpaceId(1), "main", LabKind::Tlab, Some(Address(0x8000)), info(), false)
            .unwrap();
        alloc(&mut heap, 0x1000);
        let indexed = heap.to_indexed();
        assert_eq!(indexed.len(), 2);
        assert_eq!(indexed.address(heapscope_core::DenseIndex(0)), Some(Address(0x1000)));
        assert_eq!(
            indexed.to_index(Address(0x8000)),
            Some(heapscope_core::DenseIndex(1))
        );
        assert_eq!(indexed.byte_count(), 32);
    }

    #[test]
    fn pointers_set_through_heap() {
        let mut heap = heap();
        alloc(&mut heap, 0x1000);
        alloc(&mut heap, 0x1010);
        heap.set_pointers(Address(0x1000), &[Some(Address(0x1010))])
            .unwrap();
        let r = heap.get_object(Address(0x1000)).unwrap();
        assert_eq!(r.pointers().collect::<Vec<_>>(), vec![Address(0x1010)]);
        assert!(matches!(
            heap.set_pointers(Address(0x1000), &[None, None]),
            Err(ArenaError::Record(_))
        ));
    }
}
