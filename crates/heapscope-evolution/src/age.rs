//! Age histograms keyed by object identity.

use std::collections::BTreeMap;
use std::sync::Arc;

use indexmap::IndexMap;

use heapscope_core::ObjectInfo;

/// Survived-GC counts of dead objects, grouped by [`ObjectInfo`].
///
/// Each identity maps to a histogram from age (GCs survived) to the
/// number of objects that died at that age. Object and byte totals are
/// kept alongside.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectAgeCollection {
    ages: IndexMap<Arc<ObjectInfo>, BTreeMap<u32, u64>>,
    object_count: u64,
    byte_count: u64,
}

impl ObjectAgeCollection {
    /// Empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one object of identity `info` that survived `age` GCs.
    pub fn put(&mut self, info: &Arc<ObjectInfo>, age: u32) {
        *self
            .ages
            .entry(Arc::clone(info))
            .or_default()
            .entry(age)
            .or_insert(0) += 1;
        self.object_count += 1;
        self.byte_count += info.size;
    }

    /// Add every entry of `other` to `self`.
    pub fn put_all(&mut self, other: &ObjectAgeCollection) {
        for (info, histogram) in &other.ages {
            let mine = self.ages.entry(Arc::clone(info)).or_default();
            for (&age, &count) in histogram {
                *mine.entry(age).or_insert(0) += count;
            }
        }
        self.object_count += other.object_count;
        self.byte_count += other.byte_count;
    }

    /// A new collection holding the entries of both.
    pub fn merge(first: &ObjectAgeCollection, second: &ObjectAgeCollection) -> Self {
        let mut merged = first.clone();
        merged.put_all(second);
        merged
    }

    /// Objects of identity `info`, over all ages.
    pub fn get(&self, info: &ObjectInfo) -> Option<u64> {
        self.ages.get(info).map(|h| h.values().sum())
    }

    /// Objects of identity `info` that died at `age`.
    pub fn get_age(&self, info: &ObjectInfo, age: u32) -> Option<u64> {
        self.ages.get(info).and_then(|h| h.get(&age)).copied()
    }

    /// The age histogram of identity `info`.
    pub fn histogram(&self, info: &ObjectInfo) -> Option<&BTreeMap<u32, u64>> {
        self.ages.get(info)
    }

    /// Object counts per identity with ages collapsed.
    pub fn omit_age(&self) -> IndexMap<Arc<ObjectInfo>, u64> {
        self.ages
            .iter()
            .map(|(info, h)| (Arc::clone(info), h.values().sum()))
            .collect()
    }

    /// Identities with their histograms, in first-seen order.
    pub fn iter(&self) -> impl Iterator<Item = (&Arc<ObjectInfo>, &BTreeMap<u32, u64>)> + '_ {
        self.ages.iter()
    }

    /// Total objects recorded.
    pub fn object_count(&self) -> u64 {
        self.object_count
    }

    /// Total bytes recorded.
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// Number of distinct identities.
    pub fn len(&self) -> usize {
        self.ages.len()
    }

    /// Whether nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.ages.is_empty()
    }

    /// Remove every entry and reset the totals.
    pub fn clear(&mut self) {
        self.ages.clear();
        self.object_count = 0;
        self.byte_count = 0;
    }
}
