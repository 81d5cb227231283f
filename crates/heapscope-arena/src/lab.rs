//! Bump-pointer allocation labs.
//!
//! A [`Lab`] is a contiguous address range owned by one thread and kind.
//! It stores its objects densely, in address order, alongside a parallel
//! array of byte offsets from the lab's base. Offsets are strictly
//! increasing and each equals the summed size of the records before it,
//! so address lookup is a binary search over the offsets.

use std::sync::Arc;

use heapscope_core::{Address, ObjectRecord};

use crate::config::ArenaConfig;
use crate::error::{ArenaError, LabContext};
use crate::walk::WalkContext;

/// What kind of buffer a lab models.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LabKind {
    /// Thread-local allocation buffer.
    Tlab,
    /// Promotion-local allocation buffer used during GC.
    Plab,
    /// Synthesized lab for objects allocated outside any buffer.
    Virtual,
    /// Synthesized lab covering a whole heap region.
    RegionVirtual,
}

/// Capacity of a lab in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LabCapacity {
    /// Bounded; allocation past it is a protocol violation.
    Fixed(u64),
    /// Unbounded; the lab grows with every allocation until frozen.
    Unknown,
}

/// Outcome of [`Lab::try_allocate`].
#[derive(Debug)]
pub enum TryAllocate {
    /// The record was placed at this address.
    Assigned(Address),
    /// The requested address is outside this lab; the record is handed back.
    NotAssigned(ObjectRecord),
}

/// A bump-pointer allocation region.
#[derive(Clone, Debug, PartialEq)]
pub struct Lab {
    thread: Arc<str>,
    kind: LabKind,
    addr: Address,
    capacity: LabCapacity,
    position: u64,
    records: Vec<ObjectRecord>,
    offsets: Vec<u64>,
}

impl Lab {
    /// Create an empty lab, reserving storage per the default [`ArenaConfig`].
    pub fn new(thread: impl Into<Arc<str>>, kind: LabKind, addr: Address, capacity: LabCapacity) -> Self {
        Self::with_config(thread, kind, addr, capacity, &ArenaConfig::default())
    }

    /// Create an empty lab, reserving storage per `config`.
    pub fn with_config(
        thread: impl Into<Arc<str>>,
        kind: LabKind,
        addr: Address,
        capacity: LabCapacity,
        config: &ArenaConfig,
    ) -> Self {
        let slots = config.initial_slots(match capacity {
            LabCapacity::Fixed(c) => Some(c),
            LabCapacity::Unknown => None,
        });
        Self {
            thread: thread.into(),
            kind,
            addr,
            capacity,
            position: 0,
            records: Vec::with_capacity(slots),
            offsets: Vec::with_capacity(slots),
        }
    }

    /// Owning thread.
    pub fn thread(&self) -> &str {
        &self.thread
    }

    /// Lab kind.
    pub fn kind(&self) -> LabKind {
        self.kind
    }

    /// Base address.
    pub fn bottom(&self) -> Address {
        self.addr
    }

    /// Next free address.
    pub fn top(&self) -> Address {
        self.addr.add(self.position)
    }

    /// End of the lab's extent.
    pub fn end(&self) -> Address {
        self.addr.add(self.capacity())
    }

    /// Capacity in bytes; for extendable labs, the bytes used so far.
    pub fn capacity(&self) -> u64 {
        match self.capacity {
            LabCapacity::Fixed(c) => c,
            LabCapacity::Unknown => self.position,
        }
    }

    /// The capacity setting.
    pub fn capacity_kind(&self) -> LabCapacity {
        self.capacity
    }

    /// Bytes allocated so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether `addr` lies in `[bottom, end)`.
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.addr && addr < self.end()
    }

    /// Whether a fixed-capacity lab has no room left.
    pub fn is_full(&self) -> bool {
        matches!(self.capacity, LabCapacity::Fixed(c) if self.position == c)
    }

    /// Whether the lab grows on demand.
    pub fn is_extendable(&self) -> bool {
        self.capacity == LabCapacity::Unknown
    }

    /// Number of objects.
    pub fn object_count(&self) -> usize {
        self.records.len()
    }

    /// Whether the lab holds no objects.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn context(&self) -> LabContext {
        LabContext {
            thread: self.thread.to_string(),
            kind: self.kind,
            bottom: self.bottom(),
            end: self.end(),
            capacity: self.capacity(),
        }
    }

    fn claims(&self, addr: Address) -> bool {
        match self.capacity {
            LabCapacity::Unknown => addr == self.top(),
            LabCapacity::Fixed(c) => addr >= self.addr && addr < self.addr.add(c),
        }
    }

    /// Place `record` in this lab if `requested` belongs here.
    ///
    /// `None` means the trace did not report an address; the record then
    /// always goes to the current top. Otherwise the address must lie in
    /// the lab's range (fixed capacity) or equal its top (unknown
    /// capacity), and any address other than the top is a protocol
    /// violation.
    pub fn try_allocate(
        &mut self,
        requested: Option<Address>,
        record: ObjectRecord,
    ) -> Result<TryAllocate, ArenaError> {
        let Some(addr) = requested else {
            let offset = self.allocate(record)?;
            return Ok(TryAllocate::Assigned(self.addr.add(offset)));
        };
        if !self.claims(addr) {
            return Ok(TryAllocate::NotAssigned(record));
        }
        let expected = self.top();
        if addr != expected {
            return Err(ArenaError::NotConsecutive {
                lab: self.context(),
                actual: addr,
                expected,
                size: record.size(),
                object: format!("{} {}", record.id, record.info),
            });
        }
        let offset = self.allocate(record)?;
        Ok(TryAllocate::Assigned(self.addr.add(offset)))
    }

    /// Append `record` at the current position and return its offset.
    ///
    /// Fails without modifying the lab if a fixed capacity would be exceeded.
    fn allocate(&mut self, record: ObjectRecord) -> Result<u64, ArenaError> {
        let offset = self.position;
        let size = record.size();
        // The new top must stay addressable even in extendable labs.
        let new_position = offset
            .checked_add(size)
            .filter(|&p| self.addr.checked_add(p).is_some())
            .filter(|&p| !matches!(self.capacity, LabCapacity::Fixed(c) if p > c));
        let Some(new_position) = new_position else {
            return Err(ArenaError::CapacityExceeded {
                lab: self.context(),
                addr: self.addr.add(offset),
                size,
                position: offset,
                object: format!("{} {}", record.id, record.info),
            });
        };
        self.records.push(record);
        self.offsets.push(offset);
        self.position = new_position;
        Ok(offset)
    }

    /// Freeze an extendable lab's capacity at its current position.
    ///
    /// Called once the owning thread is known to have stopped allocating.
    pub fn reset_capacity(&mut self) -> Result<(), ArenaError> {
        match self.capacity {
            LabCapacity::Unknown => {
                self.capacity = LabCapacity::Fixed(self.position);
                Ok(())
            }
            LabCapacity::Fixed(capacity) => Err(ArenaError::CapacityAlreadyFixed {
                bottom: self.addr,
                capacity,
            }),
        }
    }

    /// Make the lab extendable again.
    pub fn variable_capacity(&mut self) {
        self.capacity = LabCapacity::Unknown;
    }

    /// Index of the object starting exactly at `addr`.
    pub fn get_address_index(&self, addr: Address) -> Result<usize, ArenaError> {
        if self.records.is_empty() {
            return Err(ArenaError::EmptyLab { bottom: self.addr });
        }
        let key = addr
            .offset_from(self.addr)
            .ok_or(ArenaError::ObjectNotFound { addr })?;
        self.offsets
            .binary_search(&key)
            .map_err(|_| ArenaError::ObjectNotFound { addr })
    }

    /// The object starting exactly at `addr`.
    pub fn get_object(&self, addr: Address) -> Result<&ObjectRecord, ArenaError> {
        let index = self.get_address_index(addr)?;
        Ok(&self.records[index])
    }

    /// Mutable access to the object starting exactly at `addr`.
    pub fn get_object_mut(&mut self, addr: Address) -> Result<&mut ObjectRecord, ArenaError> {
        let index = self.get_address_index(addr)?;
        Ok(&mut self.records[index])
    }

    /// The `index`-th object in address order.
    pub fn object_at_index(&self, index: usize) -> Option<&ObjectRecord> {
        self.records.get(index)
    }

    /// Address of the `index`-th object.
    pub fn address_at_index(&self, index: usize) -> Option<Address> {
        self.offsets.get(index).map(|&o| self.addr.add(o))
    }

    /// Objects with their addresses, in address order.
    pub fn objects(&self) -> impl Iterator<Item = (Address, &ObjectRecord)> + '_ {
        self.offsets
            .iter()
            .zip(&self.records)
            .map(|(&o, r)| (self.addr.add(o), r))
    }

    /// Mutable objects with their addresses, in address order.
    pub fn objects_mut(&mut self) -> impl Iterator<Item = (Address, &mut ObjectRecord)> + '_ {
        let base = self.addr;
        self.offsets
            .iter()
            .zip(self.records.iter_mut())
            .map(move |(&o, r)| (base.add(o), r))
    }

    /// Visit every object that passes the filter chain, in address order.
    ///
    /// Returns the number of objects visited. A failing filter rejects
    /// only the object it failed on.
    pub fn iterate(
        &self,
        ctx: &WalkContext<'_>,
        visitor: &mut dyn FnMut(Address, &ObjectRecord),
    ) -> Result<usize, ArenaError> {
        let mut visited = 0;
        for (addr, record) in self.objects() {
            ctx.check_cancelled()?;
            if ctx.accepts(addr, record) {
                visitor(addr, record);
                visited += 1;
            }
        }
        Ok(visited)
    }

    /// Clear the forwarding address of every object.
    pub fn reset_forwarding_addresses(&mut self) {
        for record in &mut self.records {
            record.tag = None;
        }
    }

    /// Release unused record storage.
    pub fn reduce_size(&mut self) {
        self.records.shrink_to_fit();
        self.offsets.shrink_to_fit();
    }

    /// Copy the objects in `[bottom, end)` into a new fixed-capacity lab.
    ///
    /// Returns `None` for an empty range. `end` is clipped to the lab's
    /// top, so slicing a partly filled lab yields a full sublab. `bottom`
    /// must be an object start.
    pub fn sublab(&self, bottom: Address, end: Address) -> Result<Option<Lab>, ArenaError> {
        if bottom == end {
            return Ok(None);
        }
        if bottom == self.bottom() && end == self.end() {
            return Ok(Some(self.clone()));
        }
        let in_range = self.bottom() <= bottom
            && bottom < self.end()
            && end <= self.end()
            && bottom < end;
        if !in_range {
            return Err(ArenaError::InvalidSublab {
                bottom,
                end,
                lab: self.context(),
            });
        }
        let end = end.min(self.top());
        if end <= bottom {
            return Ok(None);
        }
        let mut sublab = Lab::new(
            Arc::clone(&self.thread),
            self.kind,
            bottom,
            LabCapacity::Fixed(end.0 - bottom.0),
        );
        let mut index = self.get_address_index(bottom)?;
        while let Some(record) = self.records.get(index) {
            let addr = self.addr.add(self.offsets[index]);
            if addr >= end {
                break;
            }
            sublab.allocate(record.clone())?;
            index += 1;
        }
        Ok(Some(sublab))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapscope_core::{
        AllocatedType, AllocationSite, EventKind, GcId, ObjectId, ObjectInfo, SiteId, TypeId,
    };

    fn record(id: u64, size: u32) -> ObjectRecord {
        let ty = Arc::new(AllocatedType {
            id: TypeId(1),
            internal_name: "LThing;".into(),
            size,
            pointers_per_object: Some(0),
        });
        let site = Arc::new(AllocationSite {
            id: SiteId(1),
            label: "Thing.<init>".into(),
            allocated_type: Some(TypeId(1)),
        });
        let info = ObjectInfo::instance("main".into(), EventKind::C1Fast, site, ty, 8);
        ObjectRecord::with_pointer_count(ObjectId(id), Arc::new(info), GcId(1), Some(0))
    }

    fn assigned(result: Result<TryAllocate, ArenaError>) -> Address {
        match result {
            Ok(TryAllocate::Assigned(addr)) => addr,
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    fn fixed(capacity: u64) -> Lab {
        Lab::new("main", LabKind::Tlab, Address(0x1000), LabCapacity::Fixed(capacity))
    }

    #[test]
    fn undefined_address_bumps_top() {
        let mut lab = fixed(64);
        assert_eq!(assigned(lab.try_allocate(None, record(1, 16))), Address(0x1000));
        assert_eq!(assigned(lab.try_allocate(None, record(2, 24))), Address(0x1010));
        assert_eq!(lab.top(), Address(0x1028));
        assert_eq!(lab.object_count(), 2);
    }

    #[test]
    fn address_outside_lab_is_not_assigned() {
        let mut lab = fixed(64);
        let result = lab.try_allocate(Some(Address(0x2000)), record(1, 16)).unwrap();
        assert!(matches!(result, TryAllocate::NotAssigned(r) if r.id == ObjectId(1)));
        assert!(lab.is_empty());
    }

    #[test]
    fn non_consecutive_address_is_fatal() {
        let mut lab = fixed(64);
        assigned(lab.try_allocate(Some(Address(0x1000)), record(1, 16)));
        let err = lab
            .try_allocate(Some(Address(0x1018)), record(2, 16))
            .unwrap_err();
        match &err {
            ArenaError::NotConsecutive {
                actual, expected, ..
            } => {
                assert_eq!(*actual, Address(0x1018));
                assert_eq!(*expected, Address(0x1010));
            }
            other => panic!("unexpected error {other:?}"),
        }
        let message = err.to_string();
        assert!(message.contains("thread main"));
        assert!(message.contains("offset 8"));
    }

    #[test]
    fn extendable_lab_accepts_only_top() {
        let mut lab = Lab::new("gc", LabKind::Plab, Address(0x4000), LabCapacity::Unknown);
        assert!(lab.is_extendable());
        assigned(lab.try_allocate(Some(Address(0x4000)), record(1, 16)));
        assigned(lab.try_allocate(Some(Address(0x4010)), record(2, 16)));
        let result = lab.try_allocate(Some(Address(0x5000)), record(3, 16)).unwrap();
        assert!(matches!(result, TryAllocate::NotAssigned(_)));
        assert_eq!(lab.capacity(), 32);
        assert_eq!(lab.end(), Address(0x4020));
    }

    #[test]
    fn overflow_leaves_no_partial_record() {
        let mut lab = fixed(32);
        assigned(lab.try_allocate(None, record(1, 24)));
        let err = lab.try_allocate(None, record(2, 16)).unwrap_err();
        assert!(matches!(err, ArenaError::CapacityExceeded { position: 24, .. }));
        assert_eq!(lab.object_count(), 1);
        assert_eq!(lab.position(), 24);
        assert!(lab.get_object(Address(0x1018)).is_err());
    }

    #[test]
    fn allocation_past_address_space_end_is_rejected() {
        let top = Address(u64::MAX - 7);
        let mut lab = Lab::new("main", LabKind::Tlab, top, LabCapacity::Unknown);
        let err = lab.try_allocate(Some(top), record(1, 16)).unwrap_err();
        assert!(matches!(
            err,
            ArenaError::CapacityExceeded {
                size: 16,
                position: 0,
                ..
            }
        ));
        assert!(lab.is_empty());
        assert_eq!(lab.top(), top);
        assert_eq!(lab.end(), top);
    }

    #[test]
    fn reset_capacity_freezes_extendable_lab() {
        let mut lab = Lab::new("gc", LabKind::Plab, Address(0x4000), LabCapacity::Unknown);
        assigned(lab.try_allocate(None, record(1, 16)));
        lab.reset_capacity().unwrap();
        assert_eq!(lab.capacity_kind(), LabCapacity::Fixed(16));
        assert!(lab.is_full());
        assert_eq!(
            lab.reset_capacity(),
            Err(ArenaError::CapacityAlreadyFixed {
                bottom: Address(0x4000),
                capacity: 16
            })
        );
        lab.variable_capacity();
        assert!(lab.is_extendable());
    }

    #[test]
    fn lookup_requires_exact_object_start() {
        let mut lab = fixed(64);
        assert_eq!(
            lab.get_object(Address(0x1000)),
            Err(ArenaError::EmptyLab {
                bottom: Address(0x1000)
            })
        );
        assigned(lab.try_allocate(None, record(1, 16)));
        assigned(lab.try_allocate(None, record(2, 16)));
        assert_eq!(lab.get_object(Address(0x1010)).unwrap().id, ObjectId(2));
        assert_eq!(lab.get_address_index(Address(0x1010)), Ok(1));
        assert_eq!(
            lab.get_object(Address(0x1008)),
            Err(ArenaError::ObjectNotFound {
                addr: Address(0x1008)
            })
        );
        assert!(lab.get_object(Address(0x0800)).is_err());
    }

    #[test]
    fn clone_is_independent() {
        let mut lab = fixed(64);
        assigned(lab.try_allocate(None, record(1, 16)));
        let mut copy = lab.clone();
        assigned(copy.try_allocate(None, record(2, 16)));
        copy.get_object_mut(Address(0x1000)).unwrap().tag = Some(Address(0x9000));

        assert_eq!(lab.object_count(), 1);
        assert_eq!(lab.position(), 16);
        assert_eq!(lab.get_object(Address(0x1000)).unwrap().tag, None);
        assert_eq!(copy.object_count(), 2);
    }

    #[test]
    fn reset_forwarding_is_idempotent() {
        let mut lab = fixed(64);
        assigned(lab.try_allocate(None, record(1, 16)));
        assigned(lab.try_allocate(None, record(2, 16)));
        for (i, (_, r)) in lab.objects_mut().enumerate() {
            r.tag = Some(Address(0x8000 + i as u64));
        }
        lab.reset_forwarding_addresses();
        let once = lab.clone();
        lab.reset_forwarding_addresses();
        assert_eq!(lab, once);
        assert!(lab.objects().all(|(_, r)| r.tag.is_none()));
    }

    #[test]
    fn sublab_slices_objects() {
        let mut lab = fixed(128);
        for id in 0..4 {
            assigned(lab.try_allocate(None, record(id, 16)));
        }
        let sub = lab
            .sublab(Address(0x1010), Address(0x1030))
            .unwrap()
            .unwrap();
        assert_eq!(sub.bottom(), Address(0x1010));
        assert_eq!(sub.object_count(), 2);
        assert!(sub.is_full());
        assert_eq!(sub.get_object(Address(0x1020)).unwrap().id, ObjectId(2));

        // End is clipped to the top of a partly filled lab.
        let tail = lab
            .sublab(Address(0x1020), Address(0x1080))
            .unwrap()
            .unwrap();
        assert_eq!(tail.capacity(), 32);
        assert_eq!(lab.sublab(Address(0x1000), Address(0x1000)), Ok(None));
        assert!(lab.sublab(Address(0x0f00), Address(0x1010)).is_err());
    }

    #[test]
    fn reduce_size_keeps_objects() {
        let mut lab = fixed(4096);
        assigned(lab.try_allocate(None, record(1, 16)));
        lab.reduce_size();
        assert_eq!(lab.object_count(), 1);
        assert_eq!(lab.get_object(Address(0x1000)).unwrap().id, ObjectId(1));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn offsets_are_densely_packed(sizes in prop::collection::vec(1u32..64, 0..40)) {
                let mut lab = Lab::new("t", LabKind::Tlab, Address(0x10_000), LabCapacity::Unknown);
                for (i, size) in sizes.iter().enumerate() {
                    let top = lab.top();
                    let result = lab.try_allocate(Some(top), record(i as u64, size * 8)).unwrap();
                    prop_assert!(matches!(result, TryAllocate::Assigned(a) if a == top));
                }
                let addrs: Vec<_> = lab.objects().map(|(a, r)| (a, r.size())).collect();
                for pair in addrs.windows(2) {
                    prop_assert!(pair[0].0 < pair[1].0);
                    prop_assert_eq!(pair[1].0, pair[0].0.add(pair[0].1));
                }
                for (addr, record) in lab.objects() {
                    prop_assert_eq!(lab.get_object(addr).map(|r| r.id), Ok(record.id));
                }
            }
        }
    }
}
