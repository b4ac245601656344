use core::fmt::Debug;
use core::hash::Hash;

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width integer usable as a map key.
///
/// Implemented for every primitive integer type up to 64 bits. The trait is
/// sealed: the maps in this crate rely on `to_bits` being injective for the
/// implementing type, which only holds for these integers.
pub trait IntKey: Copy + Eq + Hash + Debug + sealed::Sealed {
    /// Widens the key to 64 bits. Distinct keys of the same type always
    /// produce distinct bit patterns.
    fn to_bits(self) -> u64;
}

macro_rules! impl_int_key {
    ($($ty:ty),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl IntKey for $ty {
                #[inline(always)]
                fn to_bits(self) -> u64 {
                    self as u64
                }
            }
        )*
    };
}

impl_int_key!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

/// 64-bit avalanche mixer (MurmurHash3 `fmix64` finalizer) applied to
/// `bits ^ seed`.
///
/// Low-entropy keys such as sequential integers come out spread over the full
/// 64-bit range, so masking off the low bits yields usable bucket indices.
#[inline(always)]
pub fn mix(bits: u64, seed: u64) -> u64 {
    let mut k = bits ^ seed;
    k ^= k >> 33;
    k = k.wrapping_mul(0xff51_afd7_ed55_8ccd);
    k ^= k >> 33;
    k = k.wrapping_mul(0xc4ce_b93f_c53f_e3ba);
    k ^= k >> 33;
    k
}

/// Bucket index of `key` under `seed` in a table of `capacity` slots.
///
/// `capacity` must be a power of two.
#[inline(always)]
pub fn index_for<K: IntKey>(key: K, seed: u64, capacity: usize) -> usize {
    debug_assert!(capacity.is_power_of_two());
    (mix(key.to_bits(), seed) as usize) & (capacity - 1)
}

/// Smallest table size handed out by any map in this crate.
pub(crate) const MIN_CAPACITY: usize = 16;

/// Rounds a requested capacity up to a power of two, with a floor of
/// [`MIN_CAPACITY`]. Returns `None` on overflow.
pub(crate) fn normalize_capacity(requested: usize) -> Option<usize> {
    requested.max(MIN_CAPACITY).checked_next_power_of_two()
}
