use alloc::vec::Vec;
use core::fmt::Debug;

use crate::KeyValueMap;
use crate::error::Error;
use crate::key::IntKey;
use crate::key::mix;
use crate::key::normalize_capacity;

/// A hash map resolving collisions with per-bucket chains.
///
/// The bucket count is fixed at construction; chains simply grow as entries
/// arrive, so lookup cost degrades linearly with load.
///
/// ```rust
/// use cuckoo_map::ChainedMap;
///
/// let mut map = ChainedMap::try_with_capacity(100).unwrap();
/// map.insert(42u32, 100u32);
/// assert_eq!(map.get(42), Some(100));
/// assert_eq!(map.remove(42), Some(100));
/// assert_eq!(map.get(42), None);
/// ```
#[derive(Clone)]
pub struct ChainedMap<K, V> {
    buckets: Vec<Vec<(K, V)>>,
    len: usize,
}

impl<K, V> Debug for ChainedMap<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.buckets.iter().flatten() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K: IntKey, V: Copy> ChainedMap<K, V> {
    /// Creates an empty map with at least `capacity` buckets (a power of two,
    /// minimum 16).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, Error> {
        let buckets =
            normalize_capacity(capacity).ok_or(Error::AllocationFailure { slots: capacity })?;

        let mut chains = Vec::new();
        chains
            .try_reserve_exact(buckets)
            .map_err(Error::allocation(buckets))?;
        chains.resize_with(buckets, Vec::new);

        Ok(Self {
            buckets: chains,
            len: 0,
        })
    }

    #[inline(always)]
    fn bucket(&self, key: K) -> usize {
        (mix(key.to_bits(), 0) as usize) & (self.buckets.len() - 1)
    }

    /// Inserts or updates `key`, returning the previous value.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let bucket = self.bucket(key);
        let chain = &mut self.buckets[bucket];
        if let Some((_, existing)) = chain.iter_mut().find(|(k, _)| *k == key) {
            return Some(core::mem::replace(existing, value));
        }

        chain.push((key, value));
        self.len += 1;
        None
    }

    /// Returns the value stored for `key`.
    pub fn get(&self, key: K) -> Option<V> {
        self.buckets[self.bucket(key)]
            .iter()
            .find(|(k, _)| *k == key)
            .map(|&(_, value)| value)
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: K) -> Option<V> {
        let bucket = self.bucket(key);
        let chain = &mut self.buckets[bucket];
        let position = chain.iter().position(|(k, _)| *k == key)?;
        self.len -= 1;
        Some(chain.swap_remove(position).1)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Length of the longest chain, i.e. the worst-case number of entries a
    /// lookup has to compare.
    pub fn max_chain_length(&self) -> usize {
        self.buckets.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Bytes held by the map: header, bucket array and every chain's
    /// allocation.
    pub fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>()
            + self.buckets.capacity() * core::mem::size_of::<Vec<(K, V)>>()
            + self
                .buckets
                .iter()
                .map(|chain| chain.capacity() * core::mem::size_of::<(K, V)>())
                .sum::<usize>()
    }
}

impl<K: IntKey, V: Copy> KeyValueMap<K, V> for ChainedMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        Ok(ChainedMap::insert(self, key, value))
    }

    fn get(&self, key: K) -> Option<V> {
        ChainedMap::get(self, key)
    }

    fn remove(&mut self, key: K) -> Option<V> {
        ChainedMap::remove(self, key)
    }

    fn len(&self) -> usize {
        ChainedMap::len(self)
    }

    fn memory_usage(&self) -> usize {
        ChainedMap::memory_usage(self)
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    #[test]
    fn basic_operations() {
        let mut map = ChainedMap::try_with_capacity(100).unwrap();

        assert_eq!(map.insert(42u32, 100u32), None);
        assert_eq!(map.get(42), Some(100));
        assert_eq!(map.insert(42, 200), Some(100));
        assert_eq!(map.get(42), Some(200));
        assert_eq!(map.remove(42), Some(200));
        assert_eq!(map.get(42), None);
        assert_eq!(map.get(999), None);

        for i in 0..50 {
            map.insert(i, i * 10);
        }
        assert_eq!(map.len(), 50);
        assert_eq!(map.get(25), Some(250));
        assert_eq!(map.remove(25), Some(250));
        assert_eq!(map.get(25), None);
        assert_eq!(map.len(), 49);
    }

    #[test]
    fn overloaded_buckets_still_resolve() {
        let mut map = ChainedMap::try_with_capacity(16).unwrap();
        let mut rng = SmallRng::seed_from_u64(1);
        let keys: Vec<u64> = (0..2000).map(|_| rng.random()).collect();
        for (i, &k) in keys.iter().enumerate() {
            map.insert(k, i);
        }
        assert_eq!(map.bucket_count(), 16);
        for &k in &keys {
            assert!(map.get(k).is_some());
        }
        // 2000 entries over 16 buckets.
        assert!(map.max_chain_length() >= 2000 / 16);
    }

    #[test]
    fn max_chain_length_of_empty_map() {
        let map: ChainedMap<u32, u32> = ChainedMap::try_with_capacity(0).unwrap();
        assert_eq!(map.max_chain_length(), 0);
        assert!(map.is_empty());
    }

    #[test]
    fn memory_grows_with_entries() {
        let mut map = ChainedMap::try_with_capacity(64).unwrap();
        let empty = map.memory_usage();
        for i in 0..1000u32 {
            map.insert(i, i);
        }
        assert!(map.memory_usage() >= empty + 1000 * core::mem::size_of::<(u32, u32)>());
    }
}
