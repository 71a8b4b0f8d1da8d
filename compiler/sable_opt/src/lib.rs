//! Optimization passes over the Sable mid-level IR.
//!
//! The crate currently carries one transformation, temporary-buffer
//! elimination ([`temp_elim`]), together with the analyses it consumes:
//! a conservative alias oracle ([`alias`]) and a lifetime-frontier
//! utility ([`frontier`]).
//!
//! Passes take exclusive ownership of a `sable_ir::Function` for one
//! invocation, mutate it in place, and report whether instructions
//! changed through [`Invalidation`].

pub mod alias;
pub mod frontier;
mod simplify;
pub mod temp_elim;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use temp_elim::{eliminate_temp_buffers, Invalidation, TempElimStats};
