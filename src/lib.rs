//! Petek: hazard-pointer safe memory reclamation for lock-free data
//! structures.
//!
//! Petek implements Michael's hazard-pointer protocol: before dereferencing
//! a pointer read from shared state, a thread publishes it in one of its
//! hazard slots and re-reads the source; a node handed to [`retire_node`]
//! is destroyed only after a scan of every thread's slots proves nobody
//! still advertises it. This gives lock-free containers ABA-safe, bounded
//! memory reclamation without reference counting on the read path.
//!
//! # Protocol
//!
//! ```rust,ignore
//! loop {
//!     let top = stack.top.load(Ordering::Acquire);
//!     petek::employ(0, top);                       // publish + fence
//!     if stack.top.load(Ordering::Acquire) != top {
//!         continue;                                // source moved; retry
//!     }
//!     // `top` cannot be reclaimed while slot 0 holds it.
//! }
//! ```
//!
//! # Key pieces
//!
//! - [`employ`] / [`release`] — hazard slot publication with the store-load
//!   fence the validation pattern depends on.
//! - [`alloc`] / [`retire_node`] — node lifecycle: per-thread free-cache
//!   reuse on the way in, retired-list limbo and scanning on the way out.
//! - [`Atomic`], [`MarkedAtomic`] — typed shared links, with and without
//!   the low-bit logical-deletion mark.
//! - [`AnchorWord`] — 16-byte double-word CAS for the deque anchor.
//!
//! Thread records are acquired lazily on first use, deactivated (never
//! freed) on thread exit, and adopted by later threads — including their
//! pending retired lists, via the helping pass.
//!
//! # Reentrancy
//!
//! Hazard slots are per-thread, shared by every container the thread
//! touches. A container operation that runs user code while holding slots
//! (cloning an element out of a protected node) must not reenter another
//! container operation; element `Clone` impls therefore must not touch
//! petek-based containers.

#![warn(missing_docs)]

mod anchor;
mod atomic;
mod cache;
mod handle;
mod marked;
mod record;
mod retired;

pub use anchor::AnchorWord;
pub use atomic::Atomic;
pub use cache::{CacheAligned, CACHE_LINE};
pub use handle::{alloc, employ, flush, release, release_ptr, retire_node, MAX_HAZARDS};
pub use marked::{Marked, MarkedAtomic};
pub use retired::{NodeHead, Reclaim};

// Re-export for convenience
pub use core::sync::atomic::{fence, Ordering};
