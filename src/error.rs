use alloc::collections::TryReserveError;

/// Errors reported by the maps in this crate.
///
/// Failures are always reported after local recovery: when an operation
/// returns an error the map is in the same state it was in before the call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// The allocator could not provide a table of the requested size.
    #[error("failed to allocate a table of {slots} slots")]
    AllocationFailure {
        /// Number of slots that were requested.
        slots: usize,
    },

    /// A displacement chain ran past its bound, and rehashing with fresh
    /// seeds did not resolve the cycle.
    #[error("displacement chain exceeded {limit} moves")]
    DisplacementExhausted {
        /// The bound that was in force.
        limit: usize,
    },

    /// A configuration value was out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: &'static str,
    },
}

impl Error {
    pub(crate) fn allocation(slots: usize) -> impl FnOnce(TryReserveError) -> Self {
        move |_| Error::AllocationFailure { slots }
    }
}
