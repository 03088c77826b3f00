//! Fixed-capacity bitset over partition ordinals.
//!
//! Bit `i` stands for the real partition at descriptor position `i + 1`;
//! the master entry never has a bit. The set is a plain value type sized for
//! [`MAX_PARTITIONS`] and never grows.

use std::fmt;

use crate::partition::MAX_PARTITIONS;

const WORD_BITS: usize = u64::BITS as usize;
const MAX_WORDS: usize = MAX_PARTITIONS / WORD_BITS;

/// Bit-vector of partitions selected by pruning.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PruningBitset {
    words: [u64; MAX_WORDS],
    count: usize,
}

impl PruningBitset {
    /// Creates an empty set ranging over `count` partitions.
    ///
    /// `count` above [`MAX_PARTITIONS`] is a caller error; descriptor lists
    /// are validated against that bound before any set is built.
    #[must_use]
    pub fn new(count: usize) -> Self {
        debug_assert!(count <= MAX_PARTITIONS, "bitset capacity {count} too large");
        Self {
            words: [0; MAX_WORDS],
            count: count.min(MAX_PARTITIONS),
        }
    }

    /// Creates a set with every partition selected.
    #[must_use]
    pub fn full(count: usize) -> Self {
        let mut set = Self::new(count);
        set.set_all();
        set
    }

    /// Clears every bit and resets the capacity.
    pub fn init(&mut self, count: usize) {
        *self = Self::new(count);
    }

    /// Number of partitions the set ranges over.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.count
    }

    /// Selects every partition up to capacity.
    pub fn set_all(&mut self) {
        let full_words = self.count / WORD_BITS;
        for word in &mut self.words[..full_words] {
            *word = u64::MAX;
        }
        let rest = self.count % WORD_BITS;
        if rest > 0 {
            self.words[full_words] = (1u64 << rest) - 1;
        }
    }

    /// Selects partition `i`. Out-of-range indexes are ignored.
    pub fn add(&mut self, i: usize) {
        if i < self.count {
            self.words[i / WORD_BITS] |= 1u64 << (i % WORD_BITS);
        }
    }

    /// Deselects partition `i`.
    pub fn remove(&mut self, i: usize) {
        if i < self.count {
            self.words[i / WORD_BITS] &= !(1u64 << (i % WORD_BITS));
        }
    }

    /// Returns true if partition `i` is selected.
    #[must_use]
    pub fn is_set(&self, i: usize) -> bool {
        i < self.count && self.words[i / WORD_BITS] & (1u64 << (i % WORD_BITS)) != 0
    }

    /// In-place union.
    ///
    /// Only the words covered by the shorter of the two operands are merged.
    /// Both operands normally range over the same table, so lengths agree.
    pub fn union(&mut self, other: &Self) {
        let words = self.word_len().min(other.word_len());
        for (mine, theirs) in self.words[..words].iter_mut().zip(&other.words[..words]) {
            *mine |= theirs;
        }
        self.clear_tail();
    }

    /// In-place intersection.
    pub fn intersect(&mut self, other: &Self) {
        let words = self.word_len();
        for (mine, theirs) in self.words[..words].iter_mut().zip(&other.words[..words]) {
            *mine &= theirs;
        }
    }

    /// Number of selected partitions.
    #[must_use]
    pub fn popcount(&self) -> usize {
        self.words[..self.word_len()]
            .iter()
            .map(|w| w.count_ones() as usize)
            .sum()
    }

    /// Returns true if nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words[..self.word_len()].iter().all(|w| *w == 0)
    }

    /// Returns the only selected partition, if exactly one is selected.
    #[must_use]
    pub fn single(&self) -> Option<usize> {
        let mut iter = self.iter();
        match (iter.next(), iter.next()) {
            (Some(i), None) => Some(i),
            _ => None,
        }
    }

    /// Iterates selected partitions in ascending order.
    #[must_use]
    pub fn iter(&self) -> PruningBitsetIter<'_> {
        PruningBitsetIter {
            set: self,
            word: 0,
            pending: self.words[0],
        }
    }

    fn word_len(&self) -> usize {
        self.count.div_ceil(WORD_BITS)
    }

    // bits at or above `count` stay zero
    fn clear_tail(&mut self) {
        let rest = self.count % WORD_BITS;
        if rest > 0 {
            self.words[self.count / WORD_BITS] &= (1u64 << rest) - 1;
        }
    }
}

impl fmt::Debug for PruningBitset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a PruningBitset {
    type Item = usize;
    type IntoIter = PruningBitsetIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the selected positions of a [`PruningBitset`].
pub struct PruningBitsetIter<'a> {
    set: &'a PruningBitset,
    word: usize,
    pending: u64,
}

impl Iterator for PruningBitsetIter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        let words = self.set.word_len();
        loop {
            if self.word >= words {
                return None;
            }
            if self.pending != 0 {
                let bit = self.pending.trailing_zeros() as usize;
                self.pending &= self.pending - 1;
                let index = self.word * WORD_BITS + bit;
                return (index < self.set.count).then_some(index);
            }
            self.word += 1;
            if self.word < words {
                self.pending = self.set.words[self.word];
            }
        }
    }
}
