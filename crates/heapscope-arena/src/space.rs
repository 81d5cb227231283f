//! Heap spaces and their GC transitions.
//!
//! A [`Space`] keeps two lab sets. Outside a GC every lab is in the
//! front set. Starting a transition swaps the sets, so the pre-GC labs
//! sit in the back set while survivors are allocated into a fresh front
//! set. Committing the transition decides what happens to the back set:
//!
//! - [`Transition::ReplaceAll`]: the back labs are dropped. Anything not
//!   moved out of them has died.
//! - [`Transition::Accumulative`]: the back labs are merged into the front
//!   again. Nothing dies.

use std::collections::BTreeMap;
use std::fmt;

use heapscope_core::{Address, ObjectRecord, SpaceId};

use crate::error::ArenaError;
use crate::lab::{Lab, TryAllocate};
use crate::walk::WalkContext;

/// How a space's back labs are treated when its transition commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// Keep every object; labs filled during the GC are added on top.
    Accumulative,
    /// Everything not evacuated during the GC is dead.
    ReplaceAll,
}

/// A contiguous heap region (eden, survivor, old, or a G1 region).
#[derive(Clone, Debug)]
pub struct Space {
    id: SpaceId,
    name: String,
    address: Address,
    length: u64,
    front: BTreeMap<Address, Lab>,
    back: BTreeMap<Address, Lab>,
    transition: Option<Transition>,
}

impl Space {
    /// Create an empty space covering `[address, address + length)`.
    pub fn new(id: SpaceId, name: impl Into<String>, address: Address, length: u64) -> Self {
        Self {
            id,
            name: name.into(),
            address,
            length,
            front: BTreeMap::new(),
            back: BTreeMap::new(),
            transition: None,
        }
    }

    /// Space id.
    pub fn id(&self) -> SpaceId {
        self.id
    }

    /// Human-readable name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// First address of the space.
    pub fn address(&self) -> Address {
        self.address
    }

    /// One past the last address of the space.
    pub fn end(&self) -> Address {
        self.address.add(self.length)
    }

    /// Whether `addr` lies in the space.
    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.address && addr < self.end()
    }

    /// The transition in progress, if any.
    pub fn transition(&self) -> Option<Transition> {
        self.transition
    }

    /// Whether the running GC evacuates this space.
    pub fn is_being_collected(&self) -> bool {
        self.transition == Some(Transition::ReplaceAll)
    }

    /// Labs of the current heap state.
    ///
    /// During an accumulative transition the pre-GC labs still hold live
    /// objects, so both sets are returned.
    pub fn current_labs(&self) -> impl Iterator<Item = &Lab> + '_ {
        let back = match self.transition {
            Some(Transition::Accumulative) => Some(self.back.values()),
            _ => None,
        };
        back.into_iter().flatten().chain(self.front.values())
    }

    /// Labs of the pre-GC heap state. Empty outside a transition.
    pub fn previous_labs(&self) -> impl Iterator<Item = &Lab> + '_ {
        self.back.values()
    }

    /// Number of labs in the current state.
    pub fn lab_count(&self) -> usize {
        self.current_labs().count()
    }

    /// Bytes allocated in the current state.
    pub fn fill(&self) -> u64 {
        self.current_labs().map(Lab::position).sum()
    }

    fn lab_before(labs: &BTreeMap<Address, Lab>, addr: Address) -> Option<&Lab> {
        labs.range(..=addr).next_back().map(|(_, lab)| lab)
    }

    fn lab_before_mut(labs: &mut BTreeMap<Address, Lab>, addr: Address) -> Option<&mut Lab> {
        labs.range_mut(..=addr).next_back().map(|(_, lab)| lab)
    }

    /// Find the current-state lab containing `addr`.
    pub fn find_lab(&self, addr: Address) -> Option<&Lab> {
        if let Some(lab) = Self::lab_before(&self.front, addr).filter(|l| l.contains(addr)) {
            return Some(lab);
        }
        match self.transition {
            Some(Transition::Accumulative) => {
                Self::lab_before(&self.back, addr).filter(|l| l.contains(addr))
            }
            _ => None,
        }
    }

    /// Mutable access to the current-state lab containing `addr`.
    pub fn find_lab_mut(&mut self, addr: Address) -> Option<&mut Lab> {
        let in_front = Self::lab_before(&self.front, addr).is_some_and(|l| l.contains(addr));
        if in_front {
            return Self::lab_before_mut(&mut self.front, addr);
        }
        match self.transition {
            Some(Transition::Accumulative) => {
                Self::lab_before_mut(&mut self.back, addr).filter(|l| l.contains(addr))
            }
            _ => None,
        }
    }

    /// Find the pre-GC lab containing `addr`.
    pub fn find_previous_lab(&self, addr: Address) -> Option<&Lab> {
        Self::lab_before(&self.back, addr).filter(|l| l.contains(addr))
    }

    /// Mutable access to the pre-GC lab containing `addr`.
    pub fn find_previous_lab_mut(&mut self, addr: Address) -> Option<&mut Lab> {
        Self::lab_before_mut(&mut self.back, addr).filter(|l| l.contains(addr))
    }

    /// Current-state object starting at `addr`.
    pub fn get_object(&self, addr: Address) -> Result<&ObjectRecord, ArenaError> {
        self.find_lab(addr)
            .ok_or(ArenaError::ObjectNotFound { addr })?
            .get_object(addr)
    }

    /// Mutable current-state object starting at `addr`.
    pub fn get_object_mut(&mut self, addr: Address) -> Result<&mut ObjectRecord, ArenaError> {
        self.find_lab_mut(addr)
            .ok_or(ArenaError::ObjectNotFound { addr })?
            .get_object_mut(addr)
    }

    /// Objects of the current state.
    pub fn object_count(&self) -> usize {
        self.current_labs().map(Lab::object_count).sum()
    }

    /// Visit the pre-GC state's objects.
    pub fn iterate_previous(
        &self,
        ctx: &WalkContext<'_>,
        visitor: &mut dyn FnMut(Address, &ObjectRecord),
    ) -> Result<usize, ArenaError> {
        let ctx = ctx.in_space(self.id);
        let mut visited = 0;
        for lab in self.previous_labs() {
            ctx.check_cancelled()?;
            visited += lab.iterate(&ctx, visitor)?;
        }
        Ok(visited)
    }

    /// Add a lab to the front set.
    ///
    /// Fails if a lab already starts at the same address or the new lab
    /// overlaps its neighbours.
    pub fn add_lab(&mut self, lab: Lab) -> Result<(), ArenaError> {
        let bottom = lab.bottom();
        let overlap = self.front.contains_key(&bottom)
            || Self::lab_before(&self.front, bottom).is_some_and(|prev| prev.end() > bottom)
            || self
                .front
                .range(bottom..)
                .next()
                .is_some_and(|(&next, _)| next < lab.end());
        if overlap {
            return Err(ArenaError::LabOverlap {
                bottom,
                space: self.id,
            });
        }
        self.front.insert(bottom, lab);
        Ok(())
    }

    /// Place `record` in the front set.
    ///
    /// With an address, the lab claiming it takes the record; if none
    /// does, `new_lab` opens one at the address. Without an address, the
    /// record goes to the top of the highest lab owned by `thread`.
    pub fn assign(
        &mut self,
        thread: &str,
        requested: Option<Address>,
        record: ObjectRecord,
        new_lab: impl FnOnce(Address) -> Lab,
    ) -> Result<Address, ArenaError> {
        let Some(addr) = requested else {
            return self.assign_to_thread_lab(thread, record);
        };
        let record = match Self::lab_before_mut(&mut self.front, addr) {
            Some(lab) => match lab.try_allocate(Some(addr), record)? {
                TryAllocate::Assigned(at) => return Ok(at),
                TryAllocate::NotAssigned(record) => record,
            },
            None => record,
        };
        let lab = new_lab(addr);
        let bottom = lab.bottom();
        self.add_lab(lab)?;
        let lab = self
            .front
            .get_mut(&bottom)
            .ok_or(ArenaError::ObjectNotFound { addr })?;
        match lab.try_allocate(Some(addr), record)? {
            TryAllocate::Assigned(at) => Ok(at),
            TryAllocate::NotAssigned(_) => Err(ArenaError::ObjectNotFound { addr }),
        }
    }

    fn assign_to_thread_lab(&mut self, thread: &str, record: ObjectRecord) -> Result<Address, ArenaError> {
        let no_lab = || ArenaError::NoLabForThread {
            thread: thread.to_string(),
            space: self.id,
        };
        let lab = self
            .front
            .values_mut()
            .rev()
            .find(|lab| lab.thread() == thread)
            .ok_or_else(no_lab)?;
        match lab.try_allocate(None, record)? {
            TryAllocate::Assigned(at) => Ok(at),
            TryAllocate::NotAssigned(_) => Err(no_lab()),
        }
    }

    /// Begin a GC transition.
    ///
    /// A pending accumulative transition is committed first.
    pub fn start_transition(&mut self, transition: Transition) -> Result<(), ArenaError> {
        match self.transition {
            Some(Transition::ReplaceAll) => {
                return Err(ArenaError::TransitionInProgress { space: self.id })
            }
            Some(Transition::Accumulative) => self.commit_transition()?,
            None => {}
        }
        self.transition = Some(transition);
        std::mem::swap(&mut self.front, &mut self.back);
        Ok(())
    }

    /// Finish the running transition.
    pub fn commit_transition(&mut self) -> Result<(), ArenaError> {
        match self.transition.take() {
            None => return Err(ArenaError::NoTransition { space: self.id }),
            Some(Transition::Accumulative) => {
                let moved_in = std::mem::take(&mut self.front);
                self.back.extend(moved_in);
                std::mem::swap(&mut self.front, &mut self.back);
            }
            Some(Transition::ReplaceAll) => {}
        }
        self.back.clear();
        Ok(())
    }

    /// Drop labs holding no objects.
    pub fn remove_empty_labs(&mut self) {
        self.front.retain(|_, lab| !lab.is_empty());
        self.back.retain(|_, lab| !lab.is_empty());
    }

    /// Clear every forwarding address in both sets.
    pub fn reset_forwarding_addresses(&mut self) {
        for lab in self.front.values_mut().chain(self.back.values_mut()) {
            lab.reset_forwarding_addresses();
        }
    }

    /// Release unused storage in every lab.
    pub fn reduce_size(&mut self) {
        for lab in self.front.values_mut().chain(self.back.values_mut()) {
            lab.reduce_size();
        }
    }

    /// Drop every lab.
    pub fn clear(&mut self) {
        self.front.clear();
        self.back.clear();
    }

    /// Visit the current state's objects in address order of their labs.
    pub fn iterate(
        &self,
        ctx: &WalkContext<'_>,
        visitor: &mut dyn FnMut(Address, &ObjectRecord),
    ) -> Result<usize, ArenaError> {
        let ctx = ctx.in_space(self.id);
        let mut visited = 0;
        for lab in self.current_labs() {
            ctx.check_cancelled()?;
            visited += lab.iterate(&ctx, visitor)?;
        }
        Ok(visited)
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "space {} ({}) {} - {}",
            self.id,
            self.name,
            self.address,
            self.end()
        )?;
        if let Some(t) = self.transition {
            write!(f, " ({t:?})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lab::{LabCapacity, LabKind};
    use heapscope_core::{
        AllocatedType, AllocationSite, EventKind, GcId, ObjectId, ObjectInfo, SiteId, TypeId,
    };
    use std::sync::Arc;

    fn record(id: u64) -> ObjectRecord {
        let ty = Arc::new(AllocatedType {
            id: TypeId(1),
            internal_name: "LThing;".into(),
            size: 16,
            pointers_per_object: Some(0),
        });
        let site = Arc::new(AllocationSite {
            id: SiteId(1),
            label: "Thing.<init>".into(),
            allocated_type: Some(TypeId(1)),
        });
        let info = ObjectInfo::instance("main".into(), EventKind::Slow, site, ty, 8);
        ObjectRecord::with_pointer_count(ObjectId(id), Arc::new(info), GcId(0), Some(0))
    }

    fn virtual_lab(addr: Address) -> Lab {
        Lab::new("main", LabKind::Virtual, addr, LabCapacity::Unknown)
    }

    fn eden() -> Space {
        Space::new(SpaceId(0), "eden", Address(0x1000), 0x1000)
    }

    #[test]
    fn assign_opens_lab_for_unclaimed_address() {
        let mut space = eden();
        let at = space
            .assign("main", Some(Address(0x1000)), record(1), virtual_lab)
            .unwrap();
        assert_eq!(at, Address(0x1000));
        let at = space
            .assign("main", Some(Address(0x1010)), record(2), virtual_lab)
            .unwrap();
        assert_eq!(at, Address(0x1010));
        assert_eq!(space.lab_count(), 1);
        assert_eq!(space.get_object(Address(0x1010)).unwrap().id, ObjectId(2));
    }

    #[test]
    fn assign_without_address_uses_thread_lab() {
        let mut space = eden();
        assert!(matches!(
            space.assign("main", None, record(1), virtual_lab),
            Err(ArenaError::NoLabForThread { .. })
        ));
        space
            .add_lab(Lab::new(
                "main",
                LabKind::Tlab,
                Address(0x1800),
                LabCapacity::Fixed(64),
            ))
            .unwrap();
        let at = space.assign("main", None, record(1), virtual_lab).unwrap();
        assert_eq!(at, Address(0x1800));
    }

    #[test]
    fn overlapping_labs_rejected() {
        let mut space = eden();
        space
            .add_lab(Lab::new("a", LabKind::Tlab, Address(0x1000), LabCapacity::Fixed(64)))
            .unwrap();
        let err = space
            .add_lab(Lab::new("b", LabKind::Tlab, Address(0x1020), LabCapacity::Fixed(64)))
            .unwrap_err();
        assert_eq!(
            err,
            ArenaError::LabOverlap {
                bottom: Address(0x1020),
                space: SpaceId(0)
            }
        );
    }

    #[test]
    fn replace_all_drops_unmoved_objects() {
        let mut space = eden();
        space
            .assign("main", Some(Address(0x1000)), record(1), virtual_lab)
            .unwrap();
        space.start_transition(Transition::ReplaceAll).unwrap();
        assert!(space.is_being_collected());
        assert_eq!(space.lab_count(), 0);
        assert_eq!(space.previous_labs().count(), 1);
        assert_eq!(
            space.start_transition(Transition::Accumulative),
            Err(ArenaError::TransitionInProgress { space: SpaceId(0) })
        );
        space.commit_transition().unwrap();
        assert_eq!(space.lab_count(), 0);
        assert_eq!(space.previous_labs().count(), 0);
    }

    #[test]
    fn accumulative_keeps_old_and_new() {
        let mut space = eden();
        space
            .assign("main", Some(Address(0x1000)), record(1), virtual_lab)
            .unwrap();
        space.start_transition(Transition::Accumulative).unwrap();
        assert!(!space.is_being_collected());
        space
            .assign("gc", Some(Address(0x1800)), record(2), virtual_lab)
            .unwrap();
        assert_eq!(space.lab_count(), 2);
        assert_eq!(space.get_object(Address(0x1000)).unwrap().id, ObjectId(1));
        space.commit_transition().unwrap();
        assert_eq!(space.lab_count(), 2);
        assert_eq!(
            space.commit_transition(),
            Err(ArenaError::NoTransition { space: SpaceId(0) })
        );
    }
}
