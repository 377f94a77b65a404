//! Double-word atomic for the deque anchor.
//!
//! The status-tagged deque commits every state change with a CAS over a
//! 16-byte value: two pointers plus a 2-bit status tag. [`AnchorWord`] wraps
//! `portable_atomic::AtomicU128`, which compiles to CMPXCHG16B / CASP /
//! CDSG on x86_64, aarch64 and s390x. On targets without native 128-bit
//! atomics portable-atomic falls back to a locked implementation; the deque
//! is the only consumer and alone loses its lock-freedom guarantee there.

use core::sync::atomic::Ordering;
use portable_atomic::AtomicU128;

/// A 16-byte-aligned atomic pair of 64-bit words.
#[repr(align(16))]
pub struct AnchorWord {
    data: AtomicU128,
}

impl AnchorWord {
    /// Creates the word from its two halves.
    #[inline]
    pub const fn new(lo: u64, hi: u64) -> Self {
        Self {
            data: AtomicU128::new(pack(lo, hi)),
        }
    }

    /// Atomically loads both halves. The pair is a single atomic read, so
    /// callers get a consistent snapshot without a retry loop.
    #[inline]
    pub fn load(&self, order: Ordering) -> (u64, u64) {
        unpack(self.data.load(order))
    }

    /// Strong double-word compare-exchange.
    #[inline]
    pub fn compare_exchange(
        &self,
        current: (u64, u64),
        new: (u64, u64),
    ) -> Result<(u64, u64), (u64, u64)> {
        self.data
            .compare_exchange(
                pack(current.0, current.1),
                pack(new.0, new.1),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map(unpack)
            .map_err(unpack)
    }
}

#[inline]
const fn pack(lo: u64, hi: u64) -> u128 {
    (lo as u128) | ((hi as u128) << 64)
}

#[inline]
const fn unpack(v: u128) -> (u64, u64) {
    (v as u64, (v >> 64) as u64)
}
