//! A fixed 256 bit set used for component and shared component masks.
//!
//! Every registered component kind owns one bit, so archetype and query masks can be compared
//! with a handful of word operations instead of walking component lists.

use std::{
    fmt,
    hash::{Hash, Hasher},
};

/// Number of 64 bit words backing the set.
const WORDS: usize = 4;

/// A 256 bit mask. Bit `n` represents the registered kind with index `n`.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct BitSet256 {
    words: [u64; WORDS],
}

impl BitSet256 {
    /// Number of representable bits.
    pub const CAPACITY: usize = WORDS * 64;

    /// The empty set.
    pub const EMPTY: Self = Self { words: [0; WORDS] };

    /// Create an empty set.
    #[inline]
    pub const fn new() -> Self {
        Self::EMPTY
    }

    /// Build a set from the given bit indices.
    pub fn from_indices(indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = Self::new();
        for index in indices {
            set.set(index);
        }
        set
    }

    /// Set the bit at `index`.
    ///
    /// # Panics
    /// Panics if `index >= 256`.
    #[inline]
    pub fn set(&mut self, index: usize) {
        assert!(index < Self::CAPACITY, "bit index {index} out of range");
        self.words[index / 64] |= 1u64 << (index % 64);
    }

    /// Clear the bit at `index`.
    ///
    /// # Panics
    /// Panics if `index >= 256`.
    #[inline]
    pub fn clear(&mut self, index: usize) {
        assert!(index < Self::CAPACITY, "bit index {index} out of range");
        self.words[index / 64] &= !(1u64 << (index % 64));
    }

    /// Whether the bit at `index` is set. Out of range indices are never set.
    #[inline]
    pub fn get(&self, index: usize) -> bool {
        index < Self::CAPACITY && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// `self ⊇ other`.
    #[inline]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *b)
    }

    /// `self ∩ other ≠ ∅`.
    #[inline]
    pub fn contains_any(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Bitwise intersection.
    #[inline]
    pub fn and(&self, other: &Self) -> Self {
        let mut words = self.words;
        for (word, o) in words.iter_mut().zip(other.words.iter()) {
            *word &= o;
        }
        Self { words }
    }

    /// Bitwise union.
    #[inline]
    pub fn or(&self, other: &Self) -> Self {
        let mut words = self.words;
        for (word, o) in words.iter_mut().zip(other.words.iter()) {
            *word |= o;
        }
        Self { words }
    }

    /// True when no bit is set.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of set bits.
    #[inline]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate the set bit indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut bits = word;
            std::iter::from_fn(move || {
                if bits == 0 {
                    return None;
                }
                let bit = bits.trailing_zeros() as usize;
                bits &= bits - 1;
                Some(w * 64 + bit)
            })
        })
    }

    /// A deterministic hash of the set contents. Equal sets always produce equal codes.
    #[inline]
    pub fn hash_code(&self) -> u64 {
        self.words
            .iter()
            .enumerate()
            .fold(0x9E37_79B9_7F4A_7C15, |acc, (i, w)| {
                mix64(acc ^ mix64(*w ^ (i as u64).wrapping_mul(0xA24B_AED4_963E_E407)))
            })
    }
}

/// SplitMix64 finalizer.
#[inline]
pub(crate) fn mix64(mut x: u64) -> u64 {
    x = (x ^ (x >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    x ^ (x >> 31)
}

impl Hash for BitSet256 {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash_code());
    }
}

impl fmt::Debug for BitSet256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

    use super::*;

    #[test]
    fn set_and_get() {
        // Given
        let mut set = BitSet256::new();

        // When
        set.set(0);
        set.set(63);
        set.set(64);
        set.set(255);

        // Then
        assert!(set.get(0));
        assert!(set.get(63));
        assert!(set.get(64));
        assert!(set.get(255));
        assert!(!set.get(1));
        assert!(!set.get(300));
        assert_eq!(set.count(), 4);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 63, 64, 255]);

        // When
        set.clear(63);

        // Then
        assert!(!set.get(63));
        assert_eq!(set.count(), 3);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn set_out_of_range() {
        BitSet256::new().set(256);
    }

    #[test]
    fn containment_of_subsets() {
        // Given
        let small = BitSet256::from_indices([3, 70, 200]);
        let large = BitSet256::from_indices([1, 3, 70, 150, 200]);

        // Then
        assert!(large.contains_all(&small));
        assert!(!small.contains_all(&large));
        assert!(small.contains_all(&small));
        assert!(large.contains_all(&BitSet256::EMPTY));
        assert!(large.contains_any(&small));
        assert!(!small.contains_any(&BitSet256::from_indices([1, 150])));
        assert!(!BitSet256::EMPTY.contains_any(&BitSet256::EMPTY));
    }

    #[test]
    fn containment_holds_for_random_subsets() {
        // Given
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..200 {
            let bits: Vec<usize> = (0..16).map(|_| rng.gen_range(0..256)).collect();
            let split = rng.gen_range(0..bits.len());
            let subset = BitSet256::from_indices(bits[..split].iter().copied());
            let superset = BitSet256::from_indices(bits.iter().copied());

            // Then
            assert!(superset.contains_all(&subset));
            if subset != superset {
                assert!(!subset.contains_all(&superset));
            }
        }
    }

    #[test]
    fn bulk_and_or() {
        // Given
        let a = BitSet256::from_indices([1, 2, 130]);
        let b = BitSet256::from_indices([2, 130, 250]);

        // Then
        assert_eq!(a.and(&b), BitSet256::from_indices([2, 130]));
        assert_eq!(a.or(&b), BitSet256::from_indices([1, 2, 130, 250]));
        assert!(a.and(&BitSet256::EMPTY).is_empty());
    }

    #[test]
    fn hash_ignores_insertion_order() {
        // Given
        let mut rng = StdRng::seed_from_u64(11);
        let mut bits: Vec<usize> = (0..12).map(|_| rng.gen_range(0..256)).collect();
        let first = BitSet256::from_indices(bits.iter().copied());

        // When
        bits.shuffle(&mut rng);
        let second = BitSet256::from_indices(bits.iter().copied());

        // Then
        assert_eq!(first, second);
        assert_eq!(first.hash_code(), second.hash_code());
    }

    #[test]
    fn hash_distinguishes_random_sets() {
        // Given
        let mut rng = StdRng::seed_from_u64(1234);
        let mut seen = HashSet::new();
        let mut codes = HashSet::new();

        // When
        for _ in 0..1000 {
            let set = BitSet256::from_indices((0..12).map(|_| rng.gen_range(0..256)));
            if seen.insert(set) {
                codes.insert(set.hash_code());
            }
        }

        // Then - every distinct set produced a distinct code
        assert_eq!(seen.len(), codes.len());
    }
}
