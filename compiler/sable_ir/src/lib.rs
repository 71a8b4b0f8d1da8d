//! Mid-level address IR for the Sable compiler.
//!
//! This crate defines the instruction set ([`ir`]), the arena-owned function
//! graph with explicit def-use edges ([`function`]), and a structural
//! verifier ([`verify`]).
//!
//! The IR models memory explicitly: values are either objects or addresses,
//! temporaries are stack allocations paired with deallocations, and copies,
//! loads, and stores carry ownership qualifiers. Optimization passes over
//! this representation live in `sable_opt`.

pub mod function;
pub mod ir;
pub mod verify;

pub use function::{Function, Operand};
pub use ir::{
    AccessKind, ArgConvention, BlockId, ExistentialAccess, InstId, InstKind, LoadQual, StoreQual,
    ValueId, ValueKind,
};
pub use verify::{verify, VerifyError};
