use crate::error::Error;
use crate::key::MIN_CAPACITY;

/// Default bound for [`DisplacementBound::Fixed`].
pub const DEFAULT_MAX_DISPLACEMENTS: usize = 500;

/// Default multiplier for [`DisplacementBound::Logarithmic`].
pub const DEFAULT_LOG_FACTOR: usize = 3;

/// Default load-factor threshold that triggers a resize.
pub const DEFAULT_MAX_LOAD_FACTOR: f64 = 0.45;

/// Smallest accepted load-factor threshold: one entry in the smallest pair of
/// tables. An insert grows the tables at most once, and one doubling only
/// restores the threshold when a single entry fits under it.
pub const MIN_MAX_LOAD_FACTOR: f64 = 1.0 / (2 * MIN_CAPACITY) as f64;

/// How many evictions a single insertion may perform before the map gives up
/// on the current hash functions and rehashes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplacementBound {
    /// The same bound regardless of table size.
    Fixed(usize),
    /// `factor * log2(capacity)` moves, re-evaluated whenever capacity
    /// changes. Short chains keep insert latency bounded on small tables and
    /// grow slowly as the table does.
    Logarithmic {
        /// Multiplier applied to `log2(capacity)`.
        factor: usize,
    },
}

impl Default for DisplacementBound {
    fn default() -> Self {
        DisplacementBound::Fixed(DEFAULT_MAX_DISPLACEMENTS)
    }
}

impl DisplacementBound {
    /// The displacement limit for tables of `capacity` slots each.
    ///
    /// `capacity` must be a power of two. The result is never zero.
    pub fn limit(self, capacity: usize) -> usize {
        let limit = match self {
            DisplacementBound::Fixed(moves) => moves,
            DisplacementBound::Logarithmic { factor } => {
                factor.saturating_mul(capacity.trailing_zeros() as usize)
            }
        };
        limit.max(1)
    }
}

/// Construction parameters for a [`CuckooMap`](crate::CuckooMap).
///
/// # Examples
///
/// ```rust
/// use cuckoo_map::CuckooConfig;
/// use cuckoo_map::CuckooMap;
/// use cuckoo_map::DisplacementBound;
///
/// let config = CuckooConfig::default()
///     .with_initial_capacity(1024)
///     .with_displacement_bound(DisplacementBound::Logarithmic { factor: 3 })
///     .with_max_load_factor(0.5)
///     .with_seed(7);
/// let map: CuckooMap<u32, u32> = CuckooMap::with_config(config).unwrap();
/// assert_eq!(map.capacity(), 1024);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CuckooConfig {
    pub(crate) initial_capacity: usize,
    pub(crate) displacement_bound: DisplacementBound,
    pub(crate) max_load_factor: f64,
    pub(crate) seed: Option<u64>,
}

impl Default for CuckooConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 0,
            displacement_bound: DisplacementBound::default(),
            max_load_factor: DEFAULT_MAX_LOAD_FACTOR,
            seed: None,
        }
    }
}

impl CuckooConfig {
    /// Requested slots per table. Rounded up to a power of two, minimum 16.
    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Sets the eviction bound policy.
    pub fn with_displacement_bound(mut self, bound: DisplacementBound) -> Self {
        self.displacement_bound = bound;
        self
    }

    /// Sets the load factor above which an insert grows the tables first.
    ///
    /// Must lie in `[MIN_MAX_LOAD_FACTOR, 1)`, which keeps the load factor at
    /// or below the threshold after every successful insert. Two-table cuckoo
    /// hashing degrades sharply past 0.5, so values above that mostly trade
    /// rehashes for memory.
    pub fn with_max_load_factor(mut self, load_factor: f64) -> Self {
        self.max_load_factor = load_factor;
        self
    }

    /// Seeds the map's random generator, making seed selection (and therefore
    /// slot placement and rehash behavior) reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// The configured displacement bound policy.
    pub fn displacement_bound(&self) -> DisplacementBound {
        self.displacement_bound
    }

    /// The configured load factor threshold.
    pub fn max_load_factor(&self) -> f64 {
        self.max_load_factor
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if !(self.max_load_factor >= MIN_MAX_LOAD_FACTOR && self.max_load_factor < 1.0) {
            return Err(Error::InvalidConfig {
                reason: "max load factor must lie in [1/32, 1)",
            });
        }
        match self.displacement_bound {
            DisplacementBound::Fixed(0) | DisplacementBound::Logarithmic { factor: 0 } => {
                Err(Error::InvalidConfig {
                    reason: "displacement bound must allow at least one move",
                })
            }
            _ => Ok(()),
        }
    }
}
