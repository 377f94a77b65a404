//! Michael's CAS-based lock-free deque on top of the petek reclamation
//! engine. The whole shared state is one double-word anchor updated with
//! 128-bit CAS.

pub mod deque;

pub use deque::Deque;
