//! Lock-free FIFO queues on top of the petek reclamation engine.
//!
//! - [`MsQueue`]: the Michael–Scott queue — singly linked, one CAS per
//!   appended link.
//! - [`OptimisticQueue`]: the Ladan-Mozes/Shavit optimistic queue — doubly
//!   linked, appends with a plain store and repairs the backward chain
//!   lazily.

pub mod ms_queue;
pub mod optimistic;

pub use ms_queue::MsQueue;
pub use optimistic::OptimisticQueue;
