#![warn(missing_docs)]
#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

/// Construction parameters for the cuckoo map.
pub mod config;

/// A two-table cuckoo hash map with worst-case two-probe lookups.
pub mod cuckoo_map;

/// A separate-chaining hash map, kept as a baseline for comparison.
///
/// Lookups walk a bucket's chain, so their cost grows with chain length;
/// [`ChainedMap::max_chain_length`] exposes the worst case.
pub mod chained_map;

/// An open-addressing hash map with linear probing and tombstone deletion,
/// kept as a baseline for comparison.
pub mod linear_probing_map;

mod error;
mod key;

pub use chained_map::ChainedMap;
pub use config::CuckooConfig;
pub use config::DisplacementBound;
pub use cuckoo_map::CuckooMap;
pub use error::Error;
pub use key::IntKey;
pub use key::mix;
pub use linear_probing_map::LinearProbingMap;

/// The operations shared by every map in this crate.
///
/// The three maps differ only in how they resolve collisions, so benchmarks
/// and tests can drive them through this trait interchangeably.
pub trait KeyValueMap<K: IntKey, V: Copy> {
    /// Inserts or updates `key`, returning the previous value.
    fn insert(&mut self, key: K, value: V) -> Result<Option<V>, Error>;

    /// Returns the value stored for `key`.
    fn get(&self, key: K) -> Option<V>;

    /// Removes `key`, returning its value if it was present.
    fn remove(&mut self, key: K) -> Option<V>;

    /// Number of stored entries.
    fn len(&self) -> usize;

    /// Returns `true` if the map holds no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate bytes held by the map, including its header.
    fn memory_usage(&self) -> usize;
}
