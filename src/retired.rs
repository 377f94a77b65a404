//! Node header for reclaimable allocations.
//!
//! Every container node embeds a [`NodeHead`] at offset 0. The header carries
//! the linked-list hook used by the retired list and the per-type free cache,
//! plus enough type-erased information (payload drop function + allocation
//! layout) to destroy and recycle the allocation without knowing its concrete
//! type.

use core::alloc::Layout;
use core::sync::atomic::{AtomicPtr, Ordering};

/// Type-erased payload drop function. Runs `ptr::drop_in_place::<T>` on the
/// whole node; the header itself has no drop glue.
pub(crate) type DropFn = unsafe fn(*mut NodeHead);

/// Header embedded at offset 0 of every reclaimable node.
///
/// `drop_value` and `layout` are written once by [`crate::alloc`] before the
/// node is published and never change afterwards, so concurrent readers that
/// hold a reference into the node never race with them. The `next` link is
/// atomic because the retired list is spliced between records by `help_scan`
/// while readers may still hold shared references to the node.
#[repr(C, align(8))]
pub struct NodeHead {
    /// Link in the owning record's retired list or free cache.
    pub(crate) next: AtomicPtr<NodeHead>,
    /// Drops the payload in place. Set at allocation time.
    pub(crate) drop_value: Option<DropFn>,
    /// Layout of the full node allocation. Set at allocation time.
    pub(crate) layout: Layout,
}

impl NodeHead {
    /// Create an unlinked header. [`crate::alloc`] fills in the type-erased
    /// fields; constructing a node any other way and retiring it is an error.
    pub fn new() -> Self {
        Self {
            next: AtomicPtr::new(core::ptr::null_mut()),
            drop_value: None,
            layout: Layout::new::<()>(),
        }
    }

    #[inline]
    pub(crate) fn next_node(&self) -> *mut NodeHead {
        self.next.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn set_next(&self, next: *mut NodeHead) {
        self.next.store(next, Ordering::Relaxed);
    }
}

impl Default for NodeHead {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the header is raw pointers plus plain data; all cross-thread
// mutation goes through the atomic link.
unsafe impl Send for NodeHead {}
unsafe impl Sync for NodeHead {}

/// Marker for types that can pass through the reclamation engine.
///
/// # Safety
///
/// Implementors must be `#[repr(C)]` with a [`NodeHead`] as their **first**
/// field. [`crate::retire_node`] casts the node pointer to `*mut NodeHead`
/// unconditionally and threads list links through the first bytes of the
/// allocation; a type violating the layout contract corrupts memory.
pub unsafe trait Reclaim: Sized + 'static {}
