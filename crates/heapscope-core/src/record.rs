//! The per-object record held in allocation labs.
//!
//! An [`ObjectRecord`] carries the object's identity, its birth and last
//! relocation epochs, a transient forwarding address, and its outgoing
//! pointer slots. The number of slots is fixed when the record is created
//! and derived from the object's type metadata; see [`pointer_count_of`].

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::RecordError;
use crate::id::{Address, GcId, ObjectId};
use crate::info::{ObjectInfo, Symbols};

/// Slots stored inline before spilling to the heap.
const INLINE_POINTERS: usize = 4;

/// Outgoing pointer storage.
///
/// `None` in a slot is a null reference.
#[derive(Clone, Debug, PartialEq, Eq)]
enum PointerSlots {
    /// Arity known at creation.
    Known(SmallVec<[Option<Address>; INLINE_POINTERS]>),
    /// Arity unknown until the first [`ObjectRecord::fill_pointers`].
    Unknown(Option<Box<[Option<Address>]>>),
}

/// Derive the number of pointer slots for a new object.
///
/// Returns `None` when the type's pointer layout is not statically known.
/// Objects get no slots at all when the trace carries no pointer
/// information or when the object may be a filler.
pub fn pointer_count_of(info: &ObjectInfo, symbols: &Symbols, may_be_filler: bool) -> Option<usize> {
    if !symbols.expect_pointers || may_be_filler {
        return Some(0);
    }
    let per_object = info.ty.pointers_per_object?;
    match info.array_length {
        Some(_) if info.ty.is_primitive_array() => Some(0),
        Some(len) => Some(len as usize),
        None => Some(per_object as usize),
    }
}

/// One object in the reconstructed heap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ObjectRecord {
    /// Stable identity across relocations.
    pub id: ObjectId,
    /// Identity class used for histograms.
    pub info: Arc<ObjectInfo>,
    /// GC epoch that was current when the object was allocated.
    pub born_at: GcId,
    /// GC epoch of the most recent relocation, if any.
    pub last_moved_at: Option<GcId>,
    /// Forwarding address while a GC move is pending.
    pub tag: Option<Address>,
    pointers: PointerSlots,
}

impl ObjectRecord {
    /// Create a record with every pointer slot null.
    pub fn new(
        id: ObjectId,
        info: Arc<ObjectInfo>,
        born_at: GcId,
        symbols: &Symbols,
        may_be_filler: bool,
    ) -> Self {
        let pointers = match pointer_count_of(&info, symbols, may_be_filler) {
            Some(n) => PointerSlots::Known(SmallVec::from_elem(None, n)),
            None => PointerSlots::Unknown(None),
        };
        Self {
            id,
            info,
            born_at,
            last_moved_at: None,
            tag: None,
            pointers,
        }
    }

    /// Create a record with an explicit slot count (`None` for unknown).
    pub fn with_pointer_count(
        id: ObjectId,
        info: Arc<ObjectInfo>,
        born_at: GcId,
        count: Option<usize>,
    ) -> Self {
        let pointers = match count {
            Some(n) => PointerSlots::Known(SmallVec::from_elem(None, n)),
            None => PointerSlots::Unknown(None),
        };
        Self {
            id,
            info,
            born_at,
            last_moved_at: None,
            tag: None,
            pointers,
        }
    }

    /// Padded size in bytes.
    pub fn size(&self) -> u64 {
        self.info.size
    }

    /// Number of pointer slots.
    ///
    /// `None` for an unknown-arity record whose pointers were never filled.
    pub fn pointer_count(&self) -> Option<usize> {
        match &self.pointers {
            PointerSlots::Known(slots) => Some(slots.len()),
            PointerSlots::Unknown(slots) => slots.as_ref().map(|s| s.len()),
        }
    }

    /// Whether the record was created with unknown arity.
    pub fn has_unknown_arity(&self) -> bool {
        matches!(self.pointers, PointerSlots::Unknown(_))
    }

    fn slots(&self) -> Result<&[Option<Address>], RecordError> {
        match &self.pointers {
            PointerSlots::Known(slots) => Ok(slots),
            PointerSlots::Unknown(Some(slots)) => Ok(slots),
            PointerSlots::Unknown(None) => Err(RecordError::PointersUnset),
        }
    }

    fn slots_mut(&mut self) -> Result<&mut [Option<Address>], RecordError> {
        match &mut self.pointers {
            PointerSlots::Known(slots) => Ok(slots),
            PointerSlots::Unknown(Some(slots)) => Ok(slots),
            PointerSlots::Unknown(None) => Err(RecordError::PointersUnset),
        }
    }

    /// Read slot `index`. `Ok(None)` is a null pointer.
    pub fn get_pointer(&self, index: usize) -> Result<Option<Address>, RecordError> {
        let slots = self.slots()?;
        slots
            .get(index)
            .copied()
            .ok_or(RecordError::PointerOutOfRange {
                index,
                count: slots.len(),
            })
    }

    /// Overwrite slot `index`.
    pub fn set_pointer(&mut self, index: usize, value: Option<Address>) -> Result<(), RecordError> {
        let slots = self.slots_mut()?;
        let count = slots.len();
        let slot = slots
            .get_mut(index)
            .ok_or(RecordError::PointerOutOfRange { index, count })?;
        *slot = value;
        Ok(())
    }

    /// Bulk-set the leading slots from `values`.
    ///
    /// For unknown-arity records the first call fixes the arity at
    /// `values.len()`.
    pub fn fill_pointers(&mut self, values: &[Option<Address>]) -> Result<(), RecordError> {
        if let PointerSlots::Unknown(slots @ None) = &mut self.pointers {
            *slots = Some(values.into());
            return Ok(());
        }
        let slots = self.slots_mut()?;
        if values.len() > slots.len() {
            return Err(RecordError::TooManyPointers {
                given: values.len(),
                count: slots.len(),
            });
        }
        slots[..values.len()].copy_from_slice(values);
        Ok(())
    }

    /// Non-null outgoing pointers, in slot order.
    ///
    /// Empty for an unknown-arity record whose pointers were never filled.
    pub fn pointers(&self) -> impl Iterator<Item = Address> + '_ {
        self.slots().unwrap_or(&[]).iter().filter_map(|p| *p)
    }

    /// Address to report for this object, preferring a pending forward.
    pub fn current_address(&self, addr: Address) -> Address {
        self.tag.unwrap_or(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{SiteId, TypeId};
    use crate::info::{AllocatedType, AllocationSite, EventKind};

    fn symbols() -> Symbols {
        Symbols::new(true, 8).unwrap()
    }

    fn info_with(pointers: Option<u32>, name: &str, array_length: Option<u32>) -> Arc<ObjectInfo> {
        let ty = Arc::new(AllocatedType {
            id: TypeId(7),
            internal_name: name.into(),
            size: if array_length.is_some() { (16 << 8) | 8 } else { 24 },
            pointers_per_object: pointers,
        });
        let site = Arc::new(AllocationSite {
            id: SiteId(1),
            label: "Foo.bar".into(),
            allocated_type: Some(TypeId(7)),
        });
        let info = match array_length {
            Some(len) => ObjectInfo::array("main".into(), EventKind::C2Fast, site, ty, len, 8),
            None => ObjectInfo::instance("main".into(), EventKind::C2Fast, site, ty, 8),
        };
        Arc::new(info)
    }

    fn record(count: Option<usize>) -> ObjectRecord {
        ObjectRecord::with_pointer_count(
            ObjectId(1),
            info_with(Some(0), "LFoo;", None),
            GcId(0),
            count,
        )
    }

    #[test]
    fn arity_from_declared_fields() {
        let r = ObjectRecord::new(
            ObjectId(1),
            info_with(Some(3), "LFoo;", None),
            GcId(2),
            &symbols(),
            false,
        );
        assert_eq!(r.pointer_count(), Some(3));
        assert_eq!(r.get_pointer(2), Ok(None));
    }

    #[test]
    fn arity_from_object_array_length() {
        let r = ObjectRecord::new(
            ObjectId(1),
            info_with(Some(0), "[LFoo;", Some(20)),
            GcId(0),
            &symbols(),
            false,
        );
        assert_eq!(r.pointer_count(), Some(20));
    }

    #[test]
    fn primitive_arrays_and_fillers_have_no_slots() {
        let prim = ObjectRecord::new(
            ObjectId(1),
            info_with(Some(0), "[I", Some(20)),
            GcId(0),
            &symbols(),
            false,
        );
        assert_eq!(prim.pointer_count(), Some(0));

        let filler = ObjectRecord::new(
            ObjectId(2),
            info_with(Some(5), "LFoo;", None),
            GcId(0),
            &symbols(),
            true,
        );
        assert_eq!(filler.pointer_count(), Some(0));
    }

    #[test]
    fn no_slots_when_trace_has_no_pointers() {
        let r = ObjectRecord::new(
            ObjectId(1),
            info_with(Some(5), "LFoo;", None),
            GcId(0),
            &Symbols::new(false, 8).unwrap(),
            false,
        );
        assert_eq!(r.pointer_count(), Some(0));
    }

    #[test]
    fn unknown_layout_gives_unknown_arity() {
        let mut r = ObjectRecord::new(
            ObjectId(1),
            info_with(None, "Ljava/lang/ref/WeakReference;", None),
            GcId(0),
            &symbols(),
            false,
        );
        assert!(r.has_unknown_arity());
        assert_eq!(r.pointer_count(), None);
        assert_eq!(r.get_pointer(0), Err(RecordError::PointersUnset));
        assert_eq!(
            r.set_pointer(0, Some(Address(8))),
            Err(RecordError::PointersUnset)
        );

        r.fill_pointers(&[Some(Address(8)), None]).unwrap();
        assert_eq!(r.pointer_count(), Some(2));
        assert_eq!(r.get_pointer(0), Ok(Some(Address(8))));
        assert_eq!(
            r.fill_pointers(&[None, None, None]),
            Err(RecordError::TooManyPointers { given: 3, count: 2 })
        );
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut r = record(Some(2));
        assert_eq!(
            r.get_pointer(2),
            Err(RecordError::PointerOutOfRange { index: 2, count: 2 })
        );
        assert_eq!(
            r.set_pointer(5, None),
            Err(RecordError::PointerOutOfRange { index: 5, count: 2 })
        );
    }

    #[test]
    fn fill_shorter_than_arity_keeps_tail() {
        let mut r = record(Some(3));
        r.set_pointer(2, Some(Address(0x30))).unwrap();
        r.fill_pointers(&[Some(Address(0x10))]).unwrap();
        assert_eq!(r.get_pointer(0), Ok(Some(Address(0x10))));
        assert_eq!(r.get_pointer(1), Ok(None));
        assert_eq!(r.get_pointer(2), Ok(Some(Address(0x30))));
        assert_eq!(
            r.pointers().collect::<Vec<_>>(),
            vec![Address(0x10), Address(0x30)]
        );
    }

    #[test]
    fn current_address_prefers_forward() {
        let mut r = record(Some(0));
        assert_eq!(r.current_address(Address(0x100)), Address(0x100));
        r.tag = Some(Address(0x900));
        assert_eq!(r.current_address(Address(0x100)), Address(0x900));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn set_then_get_returns_value(
                count in 0usize..40,
                writes in prop::collection::vec((0usize..40, any::<u64>()), 0..32),
            ) {
                let mut r = record(Some(count));
                for (i, v) in writes {
                    let value = Some(Address(v));
                    if i < count {
                        prop_assert_eq!(r.set_pointer(i, value), Ok(()));
                        prop_assert_eq!(r.get_pointer(i), Ok(value));
                    } else {
                        prop_assert!(r.set_pointer(i, value).is_err());
                        prop_assert!(r.get_pointer(i).is_err());
                    }
                }
                prop_assert_eq!(r.pointer_count(), Some(count));
            }

            #[test]
            fn fill_respects_arity(count in 0usize..20, len in 0usize..25) {
                let mut r = record(Some(count));
                let values = vec![Some(Address(1)); len];
                prop_assert_eq!(r.fill_pointers(&values).is_ok(), len <= count);
            }
        }
    }
}
