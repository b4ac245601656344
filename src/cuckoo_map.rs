use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::iter::Chain;
use core::slice;

use rand::Rng;
use rand::SeedableRng;
use rand::rngs::SmallRng;

use crate::KeyValueMap;
use crate::config::CuckooConfig;
use crate::error::Error;
use crate::key::IntKey;
use crate::key::index_for;
use crate::key::normalize_capacity;

type Slot<K, V> = Option<(K, V)>;

/// Seed pairs a single resize or rehash draws before giving up.
pub const REBUILD_ATTEMPTS: usize = 8;

/// Which of the two tables a slot lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    First,
    Second,
}

impl Side {
    /// Displacement chains start in the first table and alternate.
    #[inline(always)]
    fn of_step(step: usize) -> Self {
        if step % 2 == 0 {
            Side::First
        } else {
            Side::Second
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Seeds {
    first: u64,
    second: u64,
}

impl Seeds {
    /// Draws a fresh pair. Equal seeds would give both tables the same
    /// geometry, so the second draw repeats until they differ.
    fn draw(rng: &mut SmallRng) -> Self {
        let first = rng.random::<u64>();
        let mut second = rng.random::<u64>();
        while second == first {
            second = rng.random::<u64>();
        }
        Seeds { first, second }
    }
}

fn allocate_table<K, V>(capacity: usize) -> Result<Box<[Slot<K, V>]>, Error> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(capacity)
        .map_err(Error::allocation(capacity))?;
    slots.resize_with(capacity, || None);
    Ok(slots.into_boxed_slice())
}

/// Everything that changes together on resize or rehash.
///
/// Keeping tables, seeds and the element count in one value means a rebuilt
/// set of tables is committed with a single assignment, and abandoned by
/// simply dropping it.
#[derive(Clone)]
struct Tables<K, V> {
    first: Box<[Slot<K, V>]>,
    second: Box<[Slot<K, V>]>,
    seeds: Seeds,
    len: usize,
}

impl<K: IntKey, V: Copy> Tables<K, V> {
    fn try_new(capacity: usize, seeds: Seeds) -> Result<Self, Error> {
        debug_assert!(capacity.is_power_of_two());
        Ok(Self {
            first: allocate_table(capacity)?,
            second: allocate_table(capacity)?,
            seeds,
            len: 0,
        })
    }

    #[inline(always)]
    fn capacity(&self) -> usize {
        self.first.len()
    }

    #[inline(always)]
    fn index(&self, side: Side, key: K) -> usize {
        let seed = match side {
            Side::First => self.seeds.first,
            Side::Second => self.seeds.second,
        };
        index_for(key, seed, self.capacity())
    }

    #[inline(always)]
    fn table(&self, side: Side) -> &[Slot<K, V>] {
        match side {
            Side::First => &self.first,
            Side::Second => &self.second,
        }
    }

    #[inline(always)]
    fn table_mut(&mut self, side: Side) -> &mut [Slot<K, V>] {
        match side {
            Side::First => &mut self.first,
            Side::Second => &mut self.second,
        }
    }

    /// Looks at the key's canonical slot in each table, first table first.
    ///
    /// Returns where the key lives, if anywhere, and how many slots were
    /// examined (never more than two).
    #[inline]
    fn locate(&self, key: K) -> (Option<(Side, usize)>, u64) {
        let index = self.index(Side::First, key);
        if matches!(self.first[index], Some((k, _)) if k == key) {
            return (Some((Side::First, index)), 1);
        }

        let index = self.index(Side::Second, key);
        if matches!(self.second[index], Some((k, _)) if k == key) {
            return (Some((Side::Second, index)), 2);
        }

        (None, 2)
    }

    /// Places a key that is known to be absent, evicting residents to their
    /// alternate table for at most `limit` moves.
    ///
    /// Returns the number of evictions performed. On exhaustion the chain is
    /// replayed backwards so the tables are exactly as they were before the
    /// call.
    fn displace(&mut self, key: K, value: V, limit: usize) -> Result<usize, Error> {
        debug_assert!(self.locate(key).0.is_none());

        let mut current = (key, value);
        for step in 0..limit {
            let side = Side::of_step(step);
            let index = self.index(side, current.0);
            match self.table_mut(side)[index].replace(current) {
                None => {
                    self.len += 1;
                    return Ok(step);
                }
                Some(evicted) => current = evicted,
            }
        }

        self.unwind(current, limit);
        Err(Error::DisplacementExhausted { limit })
    }

    /// Reverses `steps` evictions, starting from the pair left homeless by the
    /// last one.
    ///
    /// Every evicted pair was sitting in its own canonical slot for the table
    /// of that step, so hashing the pair in hand recovers the slot each swap
    /// touched.
    fn unwind(&mut self, mut current: (K, V), steps: usize) {
        for step in (0..steps).rev() {
            let side = Side::of_step(step);
            let index = self.index(side, current.0);
            let previous = self.table_mut(side)[index].replace(current);
            debug_assert!(previous.is_some());
            if let Some(previous) = previous {
                current = previous;
            }
        }
    }

    /// Empties both tables and switches to `seeds`.
    fn reset(&mut self, seeds: Seeds) {
        self.first.fill(None);
        self.second.fill(None);
        self.seeds = seeds;
        self.len = 0;
    }

    /// Places every entry, returning the longest displacement chain needed.
    fn fill(
        &mut self,
        entries: impl Iterator<Item = (K, V)>,
        limit: usize,
    ) -> Result<usize, Error> {
        let mut longest = 0;
        for (key, value) in entries {
            longest = longest.max(self.displace(key, value, limit)?);
        }
        Ok(longest)
    }

    fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            slots: self.first.iter().chain(self.second.iter()),
            remaining: self.len,
        }
    }

    fn occupied(&self, side: Side) -> usize {
        self.table(side).iter().filter(|slot| slot.is_some()).count()
    }
}

cfg_if::cfg_if! {
    if #[cfg(any(test, feature = "stats"))] {
        use core::cell::Cell;

        /// Running probe and displacement counters.
        #[derive(Debug, Clone, Default)]
        struct Instrumentation {
            lookups: Cell<u64>,
            probes: Cell<u64>,
            longest_chain: Cell<usize>,
        }

        impl Instrumentation {
            #[inline(always)]
            fn record_probes(&self, probes: u64) {
                self.lookups.set(self.lookups.get() + 1);
                self.probes.set(self.probes.get() + probes);
            }

            #[inline(always)]
            fn record_chain(&self, moves: usize) {
                self.longest_chain.set(self.longest_chain.get().max(moves));
            }
        }
    } else {
        #[derive(Debug, Clone, Default)]
        struct Instrumentation;

        impl Instrumentation {
            #[inline(always)]
            fn record_probes(&self, _probes: u64) {}

            #[inline(always)]
            fn record_chain(&self, _moves: usize) {}
        }
    }
}

/// Where an insertion currently is. See [`CuckooMap::insert`].
enum InsertState<V> {
    ProbeExisting,
    CheckLoad,
    Resize,
    Displace,
    Rehash,
    Done(Option<V>),
    Failed(Error),
}

/// Snapshot of table occupancy and lookup cost.
///
/// Available in tests and with the `stats` feature.
#[cfg(any(test, feature = "stats"))]
#[derive(Debug, Clone, PartialEq)]
pub struct Stats {
    /// Slots per table.
    pub capacity: usize,
    /// Number of stored entries.
    pub len: usize,
    /// Occupied slots in the first table.
    pub first_occupied: usize,
    /// Occupied slots in the second table.
    pub second_occupied: usize,
    /// `len / (2 * capacity)`.
    pub load_factor: f64,
    /// Completed reactive rehashes.
    pub rehashes: usize,
    /// Completed resizes.
    pub resizes: usize,
    /// Most evictions any single successful insert needed.
    pub longest_chain: usize,
    /// Lookups (`get`, `remove`, `contains_key`) performed.
    pub lookups: u64,
    /// Slots examined across all lookups.
    pub probes: u64,
    /// Bytes held by the map header and both tables.
    pub total_bytes: usize,
}

#[cfg(any(test, feature = "stats"))]
impl Stats {
    /// Mean slots examined per lookup.
    pub fn average_probes(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.probes as f64 / self.lookups as f64
        }
    }

    /// Pretty-print the statistics.
    #[cfg(feature = "std")]
    pub fn print(&self) {
        println!("=== Cuckoo Map Statistics ===");
        println!(
            "Population: {}/{} ({:.2}% load factor)",
            self.len,
            self.capacity * 2,
            self.load_factor * 100.0
        );
        println!(
            "Tables: {} / {} occupied of {} slots each",
            self.first_occupied, self.second_occupied, self.capacity
        );
        println!(
            "Rebuilds: {} rehashes, {} resizes; longest chain {}",
            self.rehashes, self.resizes, self.longest_chain
        );
        println!(
            "Lookups: {} ({:.3} probes/lookup)",
            self.lookups,
            self.average_probes()
        );
        println!("Total Allocated: {} bytes", self.total_bytes);
    }
}

/// A cuckoo hash map from fixed-width integers to plain `Copy` values.
///
/// Entries live in one of two equally sized tables, each addressed by its own
/// seeded hash function. A key can only ever be at `first[h1(key)]` or
/// `second[h2(key)]`, so [`get`](Self::get) and [`remove`](Self::remove)
/// examine at most two slots no matter how full the map is.
///
/// Insertion evicts residents to their alternate table, up to the configured
/// [`DisplacementBound`](crate::DisplacementBound). A chain that runs past the
/// bound triggers a rehash with fresh seeds; crossing the load-factor
/// threshold doubles the tables first. Both rebuilds are all-or-nothing.
///
/// ## Example
///
/// ```rust
/// use cuckoo_map::CuckooMap;
///
/// let mut map = CuckooMap::with_capacity(16);
/// map.insert(5u32, 50u32).unwrap();
/// map.insert(21, 210).unwrap();
///
/// assert_eq!(map.get(5), Some(50));
/// assert_eq!(map.get(21), Some(210));
/// assert_eq!(map.remove(5), Some(50));
/// assert_eq!(map.get(5), None);
/// ```
#[derive(Clone)]
pub struct CuckooMap<K, V> {
    tables: Tables<K, V>,
    rng: SmallRng,
    config: CuckooConfig,
    rehash_count: usize,
    resize_count: usize,
    instrumentation: Instrumentation,
}

impl<K, V> Debug for CuckooMap<K, V>
where
    K: IntKey,
    V: Copy + Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(&k, &v);
        }
        map.finish()
    }
}

#[cfg(feature = "std")]
impl<K: IntKey, V: Copy> Default for CuckooMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: IntKey, V: Copy> CuckooMap<K, V> {
    /// Creates an empty map with the minimum capacity and a randomly seeded
    /// generator.
    #[cfg(feature = "std")]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Creates an empty map with room for `capacity` slots per table.
    ///
    /// The capacity is rounded up to a power of two, with a minimum of 16.
    ///
    /// # Panics
    ///
    /// Panics if the tables cannot be allocated. Use
    /// [`try_with_capacity`](Self::try_with_capacity) to handle that case.
    #[cfg(feature = "std")]
    pub fn with_capacity(capacity: usize) -> Self {
        match Self::try_with_capacity(capacity) {
            Ok(map) => map,
            Err(err) => panic!("{err}"),
        }
    }

    /// Fallible version of [`with_capacity`](Self::with_capacity).
    ///
    /// ```rust
    /// use cuckoo_map::CuckooMap;
    /// use cuckoo_map::Error;
    ///
    /// let map = CuckooMap::<u64, u64>::try_with_capacity(usize::MAX);
    /// assert!(matches!(map, Err(Error::AllocationFailure { .. })));
    /// ```
    #[cfg(feature = "std")]
    pub fn try_with_capacity(capacity: usize) -> Result<Self, Error> {
        Self::with_config(CuckooConfig::default().with_initial_capacity(capacity))
    }

    /// Creates an empty map from an explicit configuration.
    ///
    /// Without the `std` feature the configuration must carry a seed.
    pub fn with_config(config: CuckooConfig) -> Result<Self, Error> {
        config.validate()?;

        let capacity = normalize_capacity(config.initial_capacity).ok_or(
            Error::AllocationFailure {
                slots: config.initial_capacity,
            },
        )?;
        let mut rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            #[cfg(feature = "std")]
            None => SmallRng::from_os_rng(),
            #[cfg(not(feature = "std"))]
            None => {
                return Err(Error::InvalidConfig {
                    reason: "a seed is required without the `std` feature",
                });
            }
        };
        let seeds = Seeds::draw(&mut rng);

        Ok(Self {
            tables: Tables::try_new(capacity, seeds)?,
            rng,
            config,
            rehash_count: 0,
            resize_count: 0,
            instrumentation: Instrumentation::default(),
        })
    }

    /// Returns the number of entries in the map.
    pub fn len(&self) -> usize {
        self.tables.len
    }

    /// Returns `true` if the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.tables.len == 0
    }

    /// Slots per table. The map holds at most twice this many entries.
    pub fn capacity(&self) -> usize {
        self.tables.capacity()
    }

    /// Entries divided by total slots across both tables. Always in `[0, 1)`.
    pub fn load_factor(&self) -> f64 {
        self.tables.len as f64 / (2 * self.capacity()) as f64
    }

    /// Bytes held by the map: its header plus both slot tables.
    pub fn memory_usage(&self) -> usize {
        core::mem::size_of::<Self>() + 2 * self.capacity() * core::mem::size_of::<Slot<K, V>>()
    }

    /// Number of rehashes triggered by displacement chains running past the
    /// bound. Growth does not count.
    pub fn rehash_count(&self) -> usize {
        self.rehash_count
    }

    /// Number of times the tables have been grown.
    pub fn resize_count(&self) -> usize {
        self.resize_count
    }

    /// The configuration this map was built with.
    pub fn config(&self) -> &CuckooConfig {
        &self.config
    }

    /// Returns the value stored for `key`.
    ///
    /// Examines at most two slots.
    pub fn get(&self, key: K) -> Option<V> {
        let (location, probes) = self.tables.locate(key);
        self.instrumentation.record_probes(probes);

        let (side, index) = location?;
        self.tables.table(side)[index].map(|(_, value)| value)
    }

    /// Returns `true` if `key` is present.
    pub fn contains_key(&self, key: K) -> bool {
        self.get(key).is_some()
    }

    /// Removes `key`, returning its value if it was present.
    ///
    /// The slot is freed immediately; cuckoo lookups never look past a key's
    /// two canonical slots, so no tombstone is needed.
    pub fn remove(&mut self, key: K) -> Option<V> {
        let (location, probes) = self.tables.locate(key);
        self.instrumentation.record_probes(probes);

        let (side, index) = location?;
        let (_, value) = self.tables.table_mut(side)[index].take()?;
        self.tables.len -= 1;
        Some(value)
    }

    /// Inserts or updates `key`, returning the previous value if there was
    /// one.
    ///
    /// A new key may first grow the tables (when the insert would push the
    /// load factor past the threshold), then runs a displacement chain. If
    /// the chain exceeds its bound, the tables are rehashed with new seeds
    /// and the key is placed as part of that rehash. A single call performs
    /// at most one resize and one rehash; each of those tries up to
    /// [`REBUILD_ATTEMPTS`] seed pairs.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AllocationFailure`] if a rebuild cannot allocate,
    /// or [`Error::DisplacementExhausted`] if no seed pair tried by the rehash
    /// could place every entry. In both cases the map is left exactly as it
    /// was before the call.
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        // Tables and counters as they were before the first rebuild of this
        // call, restored if the call fails.
        let mut checkpoint: Option<Tables<K, V>> = None;
        let counts = (self.rehash_count, self.resize_count);

        let mut state = InsertState::ProbeExisting;
        loop {
            state = match state {
                InsertState::ProbeExisting => match self.tables.locate(key).0 {
                    Some((side, index)) => {
                        let previous = self.tables.table_mut(side)[index].replace((key, value));
                        InsertState::Done(previous.map(|(_, value)| value))
                    }
                    None => InsertState::CheckLoad,
                },
                InsertState::CheckLoad => {
                    if self.exceeds_load(self.tables.len + 1) {
                        InsertState::Resize
                    } else {
                        InsertState::Displace
                    }
                }
                InsertState::Resize => match self.resize() {
                    Ok(previous) => {
                        checkpoint.get_or_insert(previous);
                        InsertState::Displace
                    }
                    Err(err) => InsertState::Failed(err),
                },
                InsertState::Displace => {
                    let limit = self.displacement_limit();
                    match self.tables.displace(key, value, limit) {
                        Ok(moves) => {
                            self.instrumentation.record_chain(moves);
                            InsertState::Done(None)
                        }
                        Err(_) => {
                            log::trace!("displacement chain for {key:?} exceeded {limit} moves");
                            InsertState::Rehash
                        }
                    }
                }
                // The retry runs inside the rehash: every seed pair it tries
                // must place the pending key along with the existing entries.
                InsertState::Rehash => match self.rehash(Some((key, value))) {
                    Ok(previous) => {
                        checkpoint.get_or_insert(previous);
                        InsertState::Done(None)
                    }
                    Err(err) => InsertState::Failed(err),
                },
                InsertState::Done(previous) => return Ok(previous),
                InsertState::Failed(err) => {
                    if let Some(previous) = checkpoint.take() {
                        log::debug!("restoring tables of {} slots", previous.capacity());
                        self.tables = previous;
                        (self.rehash_count, self.resize_count) = counts;
                    }
                    log::warn!("insert of {key:?} failed, map left unchanged: {err}");
                    return Err(err);
                }
            };
        }
    }

    /// Removes every entry, keeping the current capacity and seeds.
    pub fn clear(&mut self) {
        self.tables.first.fill(None);
        self.tables.second.fill(None);
        self.tables.len = 0;
    }

    /// Iterates over all entries in an unspecified order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        self.tables.iter()
    }

    /// Returns occupancy and lookup statistics.
    #[cfg(any(test, feature = "stats"))]
    pub fn stats(&self) -> Stats {
        Stats {
            capacity: self.capacity(),
            len: self.len(),
            first_occupied: self.tables.occupied(Side::First),
            second_occupied: self.tables.occupied(Side::Second),
            load_factor: self.load_factor(),
            rehashes: self.rehash_count,
            resizes: self.resize_count,
            longest_chain: self.instrumentation.longest_chain.get(),
            lookups: self.instrumentation.lookups.get(),
            probes: self.instrumentation.probes.get(),
            total_bytes: self.memory_usage(),
        }
    }

    #[inline]
    fn exceeds_load(&self, len: usize) -> bool {
        len as f64 > self.config.max_load_factor * (2 * self.capacity()) as f64
    }

    #[inline]
    fn displacement_limit(&self) -> usize {
        self.config.displacement_bound.limit(self.capacity())
    }

    /// Builds a complete replacement for the current tables, plus `pending`
    /// if given, under fresh seeds.
    ///
    /// A seed pair whose displacement graph has a cycle the bound cannot
    /// escape is discarded and another is drawn, up to [`REBUILD_ATTEMPTS`]
    /// times. `self.tables` is only read.
    fn rebuild(
        &mut self,
        capacity: usize,
        pending: Option<(K, V)>,
    ) -> Result<Tables<K, V>, Error> {
        let limit = self.config.displacement_bound.limit(capacity);
        let mut fresh = Tables::try_new(capacity, Seeds::draw(&mut self.rng))?;

        for attempt in 1..=REBUILD_ATTEMPTS {
            if attempt > 1 {
                fresh.reset(Seeds::draw(&mut self.rng));
            }
            match fresh.fill(self.tables.iter().chain(pending), limit) {
                Ok(longest) => {
                    self.instrumentation.record_chain(longest);
                    debug_assert_eq!(
                        fresh.len,
                        self.tables.len + usize::from(pending.is_some())
                    );
                    return Ok(fresh);
                }
                Err(err) => {
                    log::trace!("rebuild attempt {attempt}/{REBUILD_ATTEMPTS} failed: {err}");
                }
            }
        }

        Err(Error::DisplacementExhausted { limit })
    }

    /// Doubles the tables, returning the ones they replaced.
    #[cold]
    fn resize(&mut self) -> Result<Tables<K, V>, Error> {
        let old_capacity = self.capacity();
        let capacity = old_capacity
            .checked_mul(2)
            .ok_or(Error::AllocationFailure { slots: usize::MAX })?;

        log::debug!(
            "growing cuckoo tables from {old_capacity} to {capacity} slots ({} entries)",
            self.len()
        );
        match self.rebuild(capacity, None) {
            Ok(fresh) => {
                self.resize_count += 1;
                Ok(core::mem::replace(&mut self.tables, fresh))
            }
            Err(err) => {
                log::debug!("growth to {capacity} slots rolled back: {err}");
                Err(err)
            }
        }
    }

    /// Rebuilds the tables under fresh seeds, placing `pending` as well, and
    /// returns the ones they replaced.
    #[cold]
    fn rehash(&mut self, pending: Option<(K, V)>) -> Result<Tables<K, V>, Error> {
        let capacity = self.capacity();

        log::debug!(
            "rehashing cuckoo tables of {capacity} slots ({} entries)",
            self.len()
        );
        match self.rebuild(capacity, pending) {
            Ok(fresh) => {
                self.rehash_count += 1;
                Ok(core::mem::replace(&mut self.tables, fresh))
            }
            Err(err) => {
                log::debug!("rehash rolled back: {err}");
                Err(err)
            }
        }
    }
}

impl<K: IntKey, V: Copy> KeyValueMap<K, V> for CuckooMap<K, V> {
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error> {
        CuckooMap::insert(self, key, value)
    }

    fn get(&self, key: K) -> Option<V> {
        CuckooMap::get(self, key)
    }

    fn remove(&mut self, key: K) -> Option<V> {
        CuckooMap::remove(self, key)
    }

    fn len(&self) -> usize {
        CuckooMap::len(self)
    }

    fn memory_usage(&self) -> usize {
        CuckooMap::memory_usage(self)
    }
}

impl<'a, K: IntKey, V: Copy> IntoIterator for &'a CuckooMap<K, V> {
    type IntoIter = Iter<'a, K, V>;
    type Item = (K, V);

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the entries of a [`CuckooMap`].
pub struct Iter<'a, K, V> {
    slots: Chain<slice::Iter<'a, Slot<K, V>>, slice::Iter<'a, Slot<K, V>>>,
    remaining: usize,
}

impl<K: Copy, V: Copy> Iterator for Iter<'_, K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        for slot in self.slots.by_ref() {
            if let Some(entry) = slot {
                self.remaining -= 1;
                return Some(*entry);
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K: Copy, V: Copy> ExactSizeIterator for Iter<'_, K, V> {}
