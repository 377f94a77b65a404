//! Lock-free stacks on top of the petek reclamation engine.
//!
//! - [`Stack`]: the classic Treiber stack — one CAS on `top` per operation.
//! - [`EliminationStack`]: the same stack with an elimination back-off
//!   layer; under contention, concurrent push/pop pairs exchange values
//!   through a side array without ever touching `top`.

pub mod elimination;
pub mod treiber;

pub use elimination::EliminationStack;
pub use treiber::Stack;
