//! Dense, address-ordered view of a heap state.

use std::sync::Arc;

use heapscope_core::{Address, DenseIndex, GcId, ObjectId, ObjectInfo};

/// One object in an [`IndexedHeap`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexedObject {
    /// Address in the heap state the index was built from.
    pub address: Address,
    /// Stable identity.
    pub id: ObjectId,
    /// Birth epoch.
    pub born_at: GcId,
    /// Padded size in bytes.
    pub size: u64,
    /// Pending forwarding address, if one was set.
    pub forward: Option<Address>,
    /// Identity class.
    pub info: Arc<ObjectInfo>,
}

/// Every live object of a heap state, sorted by address.
///
/// The position of an object in the sorted order is its [`DenseIndex`].
#[derive(Clone, Debug, Default)]
pub struct IndexedHeap {
    objects: Vec<IndexedObject>,
    byte_count: u64,
}

impl IndexedHeap {
    /// Build from objects in any order.
    pub fn from_objects(mut objects: Vec<IndexedObject>) -> Self {
        objects.sort_unstable_by_key(|o| o.address);
        let byte_count = objects.iter().map(|o| o.size).sum();
        Self {
            objects,
            byte_count,
        }
    }

    /// Number of objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether the heap state was empty.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Summed object sizes in bytes.
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// Dense index of the object at `addr`.
    pub fn to_index(&self, addr: Address) -> Option<DenseIndex> {
        self.objects
            .binary_search_by_key(&addr, |o| o.address)
            .ok()
            .map(|i| DenseIndex(i as u32))
    }

    /// The object with dense index `index`.
    pub fn get(&self, index: DenseIndex) -> Option<&IndexedObject> {
        self.objects.get(index.as_usize())
    }

    /// Address of the object with dense index `index`.
    pub fn address(&self, index: DenseIndex) -> Option<Address> {
        self.get(index).map(|o| o.address)
    }

    /// Objects with their dense indices, in address order.
    pub fn iter(&self) -> impl Iterator<Item = (DenseIndex, &IndexedObject)> + '_ {
        self.objects
            .iter()
            .enumerate()
            .map(|(i, o)| (DenseIndex(i as u32), o))
    }
}
