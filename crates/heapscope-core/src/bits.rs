//! [`IndexBitSet`], a growable bitset over dense object indices.

use crate::id::DenseIndex;

/// A set of dense indices stored as a packed bitset.
///
/// The evolution tracker marks the start-snapshot index of every object
/// that died inside the window here.
#[derive(Clone, Debug, Default)]
pub struct IndexBitSet {
    bits: Vec<u64>,
}

impl IndexBitSet {
    const BITS_PER_WORD: usize = 64;

    /// Create an empty set.
    pub fn new() -> Self {
        Self { bits: Vec::new() }
    }

    /// Create an empty set with room for indices below `n` without growing.
    pub fn with_capacity(n: usize) -> Self {
        Self {
            bits: Vec::with_capacity(n.div_ceil(Self::BITS_PER_WORD)),
        }
    }

    fn split(index: DenseIndex) -> (usize, usize) {
        let i = index.as_usize();
        (i / Self::BITS_PER_WORD, i % Self::BITS_PER_WORD)
    }

    /// Insert an index. Returns `true` if it was not present.
    pub fn insert(&mut self, index: DenseIndex) -> bool {
        let (word, bit) = Self::split(index);
        if word >= self.bits.len() {
            self.bits.resize(word + 1, 0);
        }
        let mask = 1u64 << bit;
        let fresh = self.bits[word] & mask == 0;
        self.bits[word] |= mask;
        fresh
    }

    /// Remove an index. Returns `true` if it was present.
    pub fn remove(&mut self, index: DenseIndex) -> bool {
        let (word, bit) = Self::split(index);
        match self.bits.get_mut(word) {
            Some(w) => {
                let mask = 1u64 << bit;
                let present = *w & mask != 0;
                *w &= !mask;
                present
            }
            None => false,
        }
    }

    /// Check whether the set contains an index.
    pub fn contains(&self, index: DenseIndex) -> bool {
        let (word, bit) = Self::split(index);
        word < self.bits.len() && (self.bits[word] & (1u64 << bit)) != 0
    }

    /// Return the union of two sets (`self | other`).
    pub fn union(&self, other: &Self) -> Self {
        let max_len = self.bits.len().max(other.bits.len());
        let bits = (0..max_len)
            .map(|i| {
                self.bits.get(i).copied().unwrap_or(0) | other.bits.get(i).copied().unwrap_or(0)
            })
            .collect();
        Self { bits }
    }

    /// Remove every index.
    pub fn clear(&mut self) {
        self.bits.clear();
    }

    /// Returns `true` if the set contains no indices.
    pub fn is_empty(&self) -> bool {
        self.bits.iter().all(|&w| w == 0)
    }

    /// Number of indices in the set.
    pub fn len(&self) -> usize {
        self.bits.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over the indices in ascending order.
    pub fn iter(&self) -> IndexBitSetIter<'_> {
        IndexBitSetIter {
            bits: &self.bits,
            word_idx: 0,
            current: self.bits.first().copied().unwrap_or(0),
        }
    }
}

impl PartialEq for IndexBitSet {
    fn eq(&self, other: &Self) -> bool {
        let max_len = self.bits.len().max(other.bits.len());
        (0..max_len).all(|i| {
            self.bits.get(i).copied().unwrap_or(0) == other.bits.get(i).copied().unwrap_or(0)
        })
    }
}

impl Eq for IndexBitSet {}

impl FromIterator<DenseIndex> for IndexBitSet {
    fn from_iter<I: IntoIterator<Item = DenseIndex>>(iter: I) -> Self {
        let mut set = Self::new();
        for index in iter {
            set.insert(index);
        }
        set
    }
}

impl<'a> IntoIterator for &'a IndexBitSet {
    type Item = DenseIndex;
    type IntoIter = IndexBitSetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over an [`IndexBitSet`], yielding indices in ascending order.
pub struct IndexBitSetIter<'a> {
    bits: &'a [u64],
    word_idx: usize,
    current: u64,
}

impl Iterator for IndexBitSetIter<'_> {
    type Item = DenseIndex;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(DenseIndex((self.word_idx * 64 + bit) as u32));
            }
            self.word_idx += 1;
            self.current = *self.bits.get(self.word_idx)?;
        }
    }
}
