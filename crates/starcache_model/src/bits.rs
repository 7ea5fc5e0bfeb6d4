//! Bitmap types: dimensionality bit keys and dense-body null masks.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

const WORD_BITS: usize = 64;

fn word_of(bit: usize) -> usize {
    bit / WORD_BITS
}

fn mask_of(bit: usize) -> u64 {
    1 << (bit % WORD_BITS)
}

/// A bitmap identifying a subset of a star's columns.
///
/// Bit `i` set means column `i` of the star participates. Bit keys tag the
/// dimensionality of a segment header and populate the per-fact poset used
/// to find rollup candidates. Keys whose trailing words are zero compare
/// and hash equal to shorter keys with the same set bits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BitKey {
    words: Vec<u64>,
}

impl BitKey {
    /// Creates an empty bit key.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a key with the given bits set.
    #[must_use]
    pub fn of(bits: impl IntoIterator<Item = usize>) -> Self {
        let mut key = Self::new();
        for bit in bits {
            key.set(bit);
        }
        key
    }

    /// Sets bit `bit`.
    pub fn set(&mut self, bit: usize) {
        let word = word_of(bit);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= mask_of(bit);
    }

    /// Returns whether bit `bit` is set.
    #[must_use]
    pub fn get(&self, bit: usize) -> bool {
        self.words
            .get(word_of(bit))
            .is_some_and(|w| w & mask_of(bit) != 0)
    }

    /// Number of set bits.
    #[must_use]
    pub fn cardinality(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }

    /// Returns whether no bit is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// Bitwise union.
    #[must_use]
    pub fn union(&self, other: &BitKey) -> BitKey {
        let mut words = vec![0; self.words.len().max(other.words.len())];
        for (i, slot) in words.iter_mut().enumerate() {
            *slot = self.words.get(i).copied().unwrap_or(0)
                | other.words.get(i).copied().unwrap_or(0);
        }
        BitKey { words }
    }

    /// Bitwise intersection.
    #[must_use]
    pub fn intersection(&self, other: &BitKey) -> BitKey {
        let mut words = vec![0; self.words.len().min(other.words.len())];
        for (i, slot) in words.iter_mut().enumerate() {
            *slot = self.words[i] & other.words[i];
        }
        BitKey { words }
    }

    /// Returns whether every bit of `other` is also set in `self`.
    #[must_use]
    pub fn is_superset_of(&self, other: &BitKey) -> bool {
        for (i, &w) in other.words.iter().enumerate() {
            let own = self.words.get(i).copied().unwrap_or(0);
            if w & !own != 0 {
                return false;
            }
        }
        true
    }

    /// Iterates the indices of set bits in ascending order.
    pub fn iter_bits(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(wi, &word)| {
            (0..WORD_BITS)
                .filter(move |b| word & (1 << b) != 0)
                .map(move |b| wi * WORD_BITS + b)
        })
    }

    /// Words with trailing zeros stripped; basis for Eq/Hash.
    fn normalized(&self) -> &[u64] {
        let mut end = self.words.len();
        while end > 0 && self.words[end - 1] == 0 {
            end -= 1;
        }
        &self.words[..end]
    }
}

impl PartialEq for BitKey {
    fn eq(&self, other: &Self) -> bool {
        self.normalized() == other.normalized()
    }
}

impl Eq for BitKey {}

impl Hash for BitKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.normalized().hash(state);
    }
}

impl fmt::Display for BitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, bit) in self.iter_bits().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{bit}")?;
        }
        write!(f, "}}")
    }
}

/// Null indicators for a dense segment body, aligned by linear cell index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NullMask {
    words: Vec<u64>,
    len: usize,
}

impl NullMask {
    /// Creates a mask of `len` cells, all clear.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(WORD_BITS)],
            len,
        }
    }

    /// Number of cells covered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when the mask covers no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Marks cell `index` null or non-null.
    pub fn set(&mut self, index: usize, null: bool) {
        debug_assert!(index < self.len);
        if null {
            self.words[word_of(index)] |= mask_of(index);
        } else {
            self.words[word_of(index)] &= !mask_of(index);
        }
    }

    /// Returns whether cell `index` is null.
    #[must_use]
    pub fn get(&self, index: usize) -> bool {
        self.words
            .get(word_of(index))
            .is_some_and(|w| w & mask_of(index) != 0)
    }

    /// Number of null cells.
    #[must_use]
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_get_union() {
        let a = BitKey::of([0, 1]);
        let b = BitKey::of([1, 70]);
        assert!(a.get(0) && a.get(1) && !a.get(2));
        let u = a.union(&b);
        assert!(u.get(0) && u.get(1) && u.get(70));
        assert_eq!(u.cardinality(), 3);
    }

    #[test]
    fn superset() {
        let small = BitKey::of([0]);
        let big = BitKey::of([0, 1]);
        assert!(big.is_superset_of(&small));
        assert!(!small.is_superset_of(&big));
        // Every key is a superset of itself and of the empty key.
        assert!(small.is_superset_of(&small));
        assert!(small.is_superset_of(&BitKey::new()));
    }

    #[test]
    fn equality_ignores_trailing_zero_words() {
        let mut padded = BitKey::of([3]);
        padded.set(200);
        let trimmed = BitKey::of([3]);
        assert_ne!(padded, trimmed);

        let a = BitKey::of([3]);
        let mut b = BitKey::of([3, 200]);
        b = b.intersection(&BitKey::of([3]));
        assert_eq!(a, b);
    }

    #[test]
    fn iter_bits_ascending() {
        let key = BitKey::of([5, 0, 64]);
        assert_eq!(key.iter_bits().collect::<Vec<_>>(), vec![0, 5, 64]);
    }

    #[test]
    fn null_mask_counts() {
        let mut mask = NullMask::new(130);
        mask.set(0, true);
        mask.set(129, true);
        assert!(mask.get(0) && mask.get(129) && !mask.get(64));
        assert_eq!(mask.cardinality(), 2);
        mask.set(0, false);
        assert_eq!(mask.cardinality(), 1);
    }
}
