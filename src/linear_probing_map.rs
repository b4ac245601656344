use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;

use crate::KeyValueMap;
use crate::error::Error;
use crate::key::IntKey;
use crate::key::mix;
use crate::key::normalize_capacity;

/// Fraction of slots (live entries plus tombstones) allowed to be in use
/// before the table doubles.
const MAX_USED_FRACTION: f64 = 0.75;

#[derive(Debug, Clone, Copy)]
enum Slot<K, V> {
    Empty,
    Occupied(K, V),
    /// Deleted entry. Probe sequences continue past it.
    Tombstone,
}

/// Result of walking a key's probe sequence.
struct Probe {
    /// Slot holding the key, if present.
    found: Option<usize>,
    /// First reusable slot (tombstone or empty) on the path.
    vacancy: Option<usize>,
    /// Slots examined.
    probes: usize,
}

/// A hash map using open addressing with linear probing.
///
/// Deleted entries leave tombstones so later probe sequences are not cut
/// short; tombstones are reused by inserts and purged when the table grows.
///
/// ```rust
/// use cuckoo_map::LinearProbingMap;
///
/// let mut map = LinearProbingMap::try_with_capacity(100).unwrap();
/// map.insert(42u32, 100u32).unwrap();
/// map.remove(42);
/// map.insert(42, 300).unwrap();
/// assert_eq!(map.get(42), Some(300));
/// assert!(map.probe_count(42) >= 1);
/// ```
#[derive(Clone)]
pub struct LinearProbingMap<K, V> {
    slots: Box<[Slot<K, V>]>,
    len: usize,
    tombstones: usize,
}

impl<K, V> Debug for LinearProbingMap<K, V>
where
    K: Debug,
    V: Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for slot in self.slots.iter() {
            if let Slot::Occupied(k, v) = slot {
                map.entry(k, v);
            }
        }
        map.finish()
    }
}

fn allocate_slots<K, V>(capacity: usize) -> Result<Box<[Slot<K, V>]>, Error> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(Error::allocation(capacity))?;
    slots.resize_with(capacity, || Slot::Empty);
    Ok(slots.into_boxed_slice())
}

impl<K: IntKey, V: Copy> LinearProbingMap<K, V> {
    /// Creates an empty map with at least `capacity` slots (a power of two,
    /// minimum 16).
    pub fn try_with_capacity(capacity: usize) -> Result<Self, Error> {
        let capacity =
            normalize_capacity(capacity).ok_or(Error::AllocationFailure { slots: capacity })?;
        Ok(Self {
            slots: allocate_slots(capacity)?,
            len: 0,
            tombstones: 0,
        })
    }

    #[inline(always)]
    fn mask(&self) -> usize {
        self.slots.len() - 1
    }

    #[inline(always)]
    fn home(&self, key: K) -> usize {
        (mix(key.to_bits(), 0) as usize) & self.mask()
    }

    /// Walks the probe sequence of `key` until it finds the key, hits an
    /// empty slot, or has visited every slot.
    fn probe(&self, key: K) -> Probe {
        let mut index = self.home(key);
        let mut vacancy = None;

        for probes in 1..=self.slots.len() {
            match self.slots[index] {
                Slot::Occupied(k, _) if k == key => {
                    return Probe {
                        found: Some(index),
                        vacancy,
                        probes,
                    };
                }
                Slot::Occupied(..) => {}
                Slot::Tombstone => {
                    vacancy.get_or_insert(index);
                }
                Slot::Empty => {
                    return Probe {
                        found: None,
                        vacancy: vacancy.or(Some(index)),
                        probes,
                    };
                }
            }
            index = (index + 1) & self.mask();
        }

        Probe {
            found: None,
            vacancy,
            probes: self.slots.len(),
        }
    }

    /// Inserts or updates `key`, returning the previous value.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AllocationFailure`] if the table needs to be
    /// rebuilt and the new table cannot be allocated. The map is unchanged in
    /// that case.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        let probe = self.probe(key);
        if let Some(index) = probe.found {
            let previous = core::mem::replace(&mut self.slots[index], Slot::Occupied(key, value));
            return Ok(match previous {
                Slot::Occupied(_, previous) => Some(previous),
                _ => None,
            });
        }

        let used = self.len + self.tombstones + 1;
        let vacancy = if used as f64 > MAX_USED_FRACTION * self.slots.len() as f64 {
            self.rebuild()?;
            self.probe(key).vacancy
        } else {
            probe.vacancy
        };

        // A rebuild leaves at least a quarter of the slots empty, so a vacancy
        // always exists.
        let Some(index) = vacancy else {
            return Err(Error::AllocationFailure {
                slots: self.slots.len(),
            });
        };
        if matches!(self.slots[index], Slot::Tombstone) {
            self.tombstones -= 1;
        }
        self.slots[index] = Slot::Occupied(key, value);
        self.len += 1;
        Ok(None)
    }

    /// Returns the value stored for `key`.
    pub fn get(&self, key: K) -> Option<V> {
        match self.slots[self.probe(key).found?] {
            Slot::Occupied(_, value) => Some(value),
            _ => None,
        }
    }

    /// Removes `key`, leaving a tombstone in its slot.
    pub fn remove(&mut self, key: K) -> Option<V> {
        let index = self.probe(key).found?;
        match core::mem::replace(&mut self.slots[index], Slot::Tombstone) {
            Slot::Occupied(_, value) => {
                self.len -= 1;
                self.tombstones += 1;
                Some(value)
            }
            other => {
                self.slots[index] = other;
                None
            }
        }
    }

    /// Number of slots examined to find `key`, or to conclude it is absent.
    pub fn probe_count(&self, key: K) -> usize {
        self.probe(key).probes
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of tombstones currently in the table.
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// Bytes held by the map: header plus the slot array.
    pub fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>() + self.slots.len() * core::mem::size_of::<Slot<K, V>>()
    }

    /// Rehashes into a fresh table, dropping tombstones. The table doubles
    /// only when the live entries would fill more than half of the current
    /// size; otherwise it is rebuilt at the same size, so churn with a steady
    /// entry count does not grow it. The old table is only replaced once the
    /// new one has been allocated.
    #[cold]
    fn rebuild(&mut self) -> Result<(), Error> {
        let current = self.slots.len();
        let capacity = if (self.len + 1) * 2 <= current {
            current
        } else {
            current
                .checked_mul(2)
                .ok_or(Error::AllocationFailure { slots: usize::MAX })?
        };
        let mut slots = allocate_slots(capacity)?;
        let mask = capacity - 1;

        for slot in self.slots.iter() {
            if let Slot::Occupied(key, value) = *slot {
                let mut index = (mix(key.to_bits(), 0) as usize) & mask;
                while !matches!(slots[index], Slot::Empty) {
                    index = (index + 1) & mask;
                }
                slots[index] = Slot::Occupied(key, value);
            }
        }

        log::debug!(
            "rebuilding linear probing table from {current} to {capacity} slots \
             ({} tombstones purged)",
            self.tombstones
        );
        self.slots = slots;
        self.tombstones = 0;
        Ok(())
    }
}

impl<K: IntKey, V: Copy> KeyValueMap<K, V> for LinearProbingMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        LinearProbingMap::insert(self, key, value)
    }

    fn get(&self, key: K) -> Option<V> {
        LinearProbingMap::get(self, key)
    }

    fn remove(&mut self, key: K) -> Option<V> {
        LinearProbingMap::remove(self, key)
    }

    fn len(&self) -> usize {
        LinearProbingMap::len(self)
    }

    fn memory_usage(&self) -> usize {
        LinearProbingMap::memory_usage(self)
    }
}

#[cfg(test)]
mod tests {
    use alloc::format;

    use super::*;

    #[test]
    fn basic_operations() {
        let mut map = LinearProbingMap::try_with_capacity(100).unwrap();

        assert_eq!(map.insert(42u32, 100u32), Ok(None));
        assert_eq!(map.get(42), Some(100));
        assert_eq!(map.insert(42, 200), Ok(Some(100)));
        assert_eq!(map.get(42), Some(200));

        assert_eq!(map.remove(42), Some(200));
        assert_eq!(map.get(42), None);
        assert_eq!(map.tombstones(), 1);
        assert_eq!(map.get(999), None);

        assert_eq!(map.insert(42, 300), Ok(None));
        assert_eq!(map.get(42), Some(300));
        assert_eq!(map.tombstones(), 0);

        for i in 0..50 {
            map.insert(i * 100, i).unwrap();
        }
        assert_eq!(map.len(), 51);

        let probes = map.probe_count(42);
        assert!(probes > 0 && probes <= 50, "{probes} probes");
    }

    #[test]
    fn tombstones_do_not_hide_later_keys() {
        let mut map = LinearProbingMap::try_with_capacity(1024).unwrap();
        for k in 0..400u32 {
            map.insert(k, k).unwrap();
        }
        for k in (0..400u32).step_by(2) {
            assert_eq!(map.remove(k), Some(k));
        }
        for k in 0..400u32 {
            let expected = if k % 2 == 0 { None } else { Some(k) };
            assert_eq!(map.get(k), expected, "key {k}");
        }
        assert_eq!(map.len(), 200);
        assert_eq!(map.tombstones(), 200);
    }

    #[test]
    fn reinsert_after_remove_does_not_duplicate() {
        let mut map = LinearProbingMap::try_with_capacity(16).unwrap();
        for k in 0..10u32 {
            map.insert(k, k).unwrap();
        }
        map.remove(3);
        map.insert(7, 70).unwrap();
        assert_eq!(map.len(), 9);
        assert_eq!(map.get(7), Some(70));
        assert_eq!(format!("{map:?}").matches("7: ").count(), 1);
    }

    #[test]
    fn grows_and_purges_tombstones() {
        let mut map = LinearProbingMap::try_with_capacity(16).unwrap();
        let keys: Vec<u32> = (0..5000u32).map(|i| i.wrapping_mul(2_654_435_761)).collect();
        for (i, &k) in keys.iter().enumerate() {
            map.insert(k, i as u32).unwrap();
            if i % 3 == 0 {
                map.remove(k);
            }
        }
        assert!(map.capacity() > 16);
        assert!(
            (map.len() + map.tombstones()) as f64 <= MAX_USED_FRACTION * map.capacity() as f64
        );
        for (i, &k) in keys.iter().enumerate() {
            if i % 3 != 0 {
                assert!(map.get(k).is_some());
            }
        }
    }

    #[test]
    fn churn_purges_tombstones_without_growing() {
        let mut map = LinearProbingMap::try_with_capacity(16).unwrap();
        for k in 0..200_000u32 {
            map.insert(k, k).unwrap();
            if k >= 5 {
                assert_eq!(map.remove(k - 5), Some(k - 5));
            }
            assert!(map.capacity() <= 16, "grew to {} at key {k}", map.capacity());
        }

        assert_eq!(map.len(), 5);
        assert!(map.tombstones() < 12);
        for k in 199_995..200_000u32 {
            assert_eq!(map.get(k), Some(k));
        }
    }

    #[test]
    fn live_entries_past_half_still_double() {
        let mut map = LinearProbingMap::try_with_capacity(16).unwrap();
        for k in 0..12u32 {
            map.insert(k, k).unwrap();
        }
        assert_eq!(map.capacity(), 16);
        map.insert(12, 12).unwrap();
        assert_eq!(map.capacity(), 32);
        assert_eq!(map.len(), 13);
    }

    #[test]
    fn probe_count_of_absent_key_stops_at_empty() {
        let map: LinearProbingMap<u32, u32> = LinearProbingMap::try_with_capacity(64).unwrap();
        assert_eq!(map.probe_count(5), 1);
    }
}
