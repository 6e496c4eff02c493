//! Collection aliases and small helpers shared across the crate.
//!
//! Hash sets of tag tuples use `rustc_hash`; short-lived buffers (decoded
//! rings, atom streams, per-edge edit lists) use `smallvec` so that the common
//! case stays on the stack.

mod aliases;
mod helpers;

pub use aliases::*;
pub use helpers::*;
