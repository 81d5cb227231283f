//! Strongly-typed identifiers for GC epochs, addresses, and metadata.

use std::fmt;

/// Identifies one garbage-collection pause.
///
/// Assigned by the traced VM in increasing order. The evolution tracker
/// derives object ages from differences between epoch ids, so the values
/// must be monotonic within a trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GcId(pub u16);

impl GcId {
    /// Number of GCs strictly between `self` (birth) and `later`.
    ///
    /// An object born at epoch 5 that dies during the GC ending at epoch 9
    /// survived `9 - 5 - 1 = 3` collections. The result is negative when
    /// `later <= self`, which only happens for misattributed filler objects.
    pub fn survived_until(self, later: GcId) -> i32 {
        i32::from(later.0) - i32::from(self.0) - 1
    }
}

impl fmt::Display for GcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for GcId {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// An absolute heap address in the traced VM.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(pub u64);

impl Address {
    /// Byte distance from `base` to `self`, or `None` if `self < base`.
    pub fn offset_from(self, base: Address) -> Option<u64> {
        self.0.checked_sub(base.0)
    }

    /// The address `bytes` past `self`, saturating at the top of the
    /// address space.
    pub fn add(self, bytes: u64) -> Address {
        Address(self.0.saturating_add(bytes))
    }

    /// The address `bytes` past `self`, or `None` on overflow.
    pub fn checked_add(self, bytes: u64) -> Option<Address> {
        self.0.checked_add(bytes).map(Address)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl From<u64> for Address {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Stable identity of one object record.
///
/// Addresses change when a GC relocates an object; the `ObjectId` does
/// not. Classification maps (PERM, BORN) are keyed by it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies an allocated type in the symbol table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub u32);

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for TypeId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies an allocation site in the symbol table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SiteId(pub u32);

impl SiteId {
    /// Site used when the trace does not record where an object was created.
    pub const UNKNOWN: SiteId = SiteId(0);
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SiteId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a heap space (eden, survivor, old, region).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(pub u16);

impl fmt::Display for SpaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for SpaceId {
    fn from(v: u16) -> Self {
        Self(v)
    }
}

/// Zero-based position of an object in an address-ordered snapshot.
///
/// Dense indices replace raw addresses and dump ids so per-object data
/// can live in flat, index-aligned arrays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DenseIndex(pub u32);

impl DenseIndex {
    /// The index as a `usize` for slice access.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DenseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for DenseIndex {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn survived_count_excludes_birth_and_death_gc() {
        assert_eq!(GcId(5).survived_until(GcId(9)), 3);
        assert_eq!(GcId(5).survived_until(GcId(6)), 0);
    }

    #[test]
    fn survived_count_negative_for_same_epoch() {
        assert_eq!(GcId(7).survived_until(GcId(7)), -1);
    }

    #[test]
    fn address_offset() {
        assert_eq!(Address(0x1010).offset_from(Address(0x1000)), Some(16));
        assert_eq!(Address(0x0ff0).offset_from(Address(0x1000)), None);
        assert_eq!(Address(0x1000).add(8), Address(0x1008));
    }
}
