//! The dimensionality poset.

use std::collections::BTreeMap;

use starcache_model::BitKey;

/// A multiset of dimensionality bitmaps, partially ordered by the
/// superset relation.
///
/// One poset exists per fact group. Its single interesting query is
/// [`BitKeyPoset::ancestors`]: all known dimensionalities that are proper
/// supersets of a requested one, smallest first. Smaller ancestors cover
/// fewer cells and are therefore cheaper to roll up, so callers probe
/// them in the returned order.
#[derive(Debug, Default)]
pub struct BitKeyPoset {
    // popcount -> keys of that cardinality with reference counts,
    // kept sorted by bit pattern for deterministic iteration.
    buckets: BTreeMap<u32, Vec<(BitKey, usize)>>,
}

impl BitKeyPoset {
    /// Creates an empty poset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one reference to `key`.
    pub fn add(&mut self, key: BitKey) {
        let bucket = self.buckets.entry(key.cardinality()).or_default();
        match bucket.iter_mut().find(|(k, _)| *k == key) {
            Some((_, count)) => *count += 1,
            None => {
                let at = bucket
                    .iter()
                    .position(|(k, _)| cmp_bits(k, &key).is_gt())
                    .unwrap_or(bucket.len());
                bucket.insert(at, (key, 1));
            }
        }
    }

    /// Drops one reference to `key`; the key disappears when its last
    /// reference is dropped.
    pub fn remove(&mut self, key: &BitKey) {
        let cardinality = key.cardinality();
        if let Some(bucket) = self.buckets.get_mut(&cardinality) {
            if let Some(at) = bucket.iter().position(|(k, _)| k == key) {
                bucket[at].1 -= 1;
                if bucket[at].1 == 0 {
                    bucket.remove(at);
                }
            }
            if bucket.is_empty() {
                self.buckets.remove(&cardinality);
            }
        }
    }

    /// Returns whether `key` is present.
    #[must_use]
    pub fn contains(&self, key: &BitKey) -> bool {
        self.buckets
            .get(&key.cardinality())
            .is_some_and(|bucket| bucket.iter().any(|(k, _)| k == key))
    }

    /// All proper supersets of `key`, ordered by increasing popcount,
    /// ties broken by bit pattern.
    #[must_use]
    pub fn ancestors(&self, key: &BitKey) -> Vec<BitKey> {
        let floor = key.cardinality() + 1;
        self.buckets
            .range(floor..)
            .flat_map(|(_, bucket)| bucket.iter())
            .filter(|(k, _)| k.is_superset_of(key))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Returns whether the poset holds no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

fn cmp_bits(a: &BitKey, b: &BitKey) -> std::cmp::Ordering {
    a.iter_bits().cmp(b.iter_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_small_first() {
        let mut poset = BitKeyPoset::new();
        poset.add(BitKey::of([0, 1, 2]));
        poset.add(BitKey::of([0, 1]));
        poset.add(BitKey::of([0, 2]));
        poset.add(BitKey::of([1, 2]));

        let ancestors = poset.ancestors(&BitKey::of([0]));
        assert_eq!(
            ancestors,
            vec![
                BitKey::of([0, 1]),
                BitKey::of([0, 2]),
                BitKey::of([0, 1, 2]),
            ]
        );
    }

    #[test]
    fn ancestors_are_proper() {
        let mut poset = BitKeyPoset::new();
        poset.add(BitKey::of([0, 1]));
        // The key itself is not its own ancestor.
        assert!(poset.ancestors(&BitKey::of([0, 1])).is_empty());
    }

    #[test]
    fn reference_counting() {
        let mut poset = BitKeyPoset::new();
        let key = BitKey::of([0, 1]);
        poset.add(key.clone());
        poset.add(key.clone());
        poset.remove(&key);
        assert!(poset.contains(&key));
        poset.remove(&key);
        assert!(!poset.contains(&key));
        assert!(poset.is_empty());
    }
}
