//! Instruction set for the Sable mid-level IR.
//!
//! The mid-level IR is an address-based basic-block representation with
//! explicit memory operations. Every value is SSA-defined and is either an
//! **object** (a loadable value held in a register) or an **address** (a
//! memory location). Memory operations carry ownership qualifiers that say
//! whether they duplicate, consume, initialize, or overwrite the storage
//! they touch, which is the information the optimizer's rewrite passes
//! reason about.
//!
//! Instructions are a closed sum type ([`InstKind`]); passes dispatch with
//! exhaustive `match`, so an unhandled operation kind is a compile error
//! rather than a runtime surprise.

use smallvec::{smallvec, SmallVec};

// ── ID newtypes ─────────────────────────────────────────────────────

/// Value ID within a function.
///
/// Each `ValueId` identifies a unique SSA value within a single
/// [`Function`](crate::Function). IDs are allocated sequentially from 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ValueId(u32);

impl ValueId {
    /// Create a new value ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Instruction ID within a function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct InstId(u32);

impl InstId {
    /// Create a new instruction ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Basic block ID within a function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct BlockId(u32);

impl BlockId {
    /// Create a new block ID from a raw index.
    #[inline]
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw `u32` value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Get the index as `usize` (for indexing into `Vec`s).
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ── Value categories ────────────────────────────────────────────────

/// Category of an SSA value: a loadable object or a memory address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// A register value.
    Object,
    /// A memory location.
    Address,
}

// ── Ownership qualifiers ────────────────────────────────────────────

/// Ownership qualifier for [`InstKind::Load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadQual {
    /// Duplicate the stored value; the source stays initialized.
    Copy,
    /// Consume the stored value; the source is left uninitialized.
    Take,
    /// Borrow the stored value for a limited scope without duplicating it.
    Borrow,
}

/// Ownership qualifier for [`InstKind::Store`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreQual {
    /// Write into uninitialized memory.
    Init,
    /// Overwrite initialized memory, destroying the old value.
    Assign,
}

/// Access mode for [`InstKind::BeginAccess`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AccessKind {
    Read,
    Modify,
}

/// Access mode for [`InstKind::OpenExistential`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExistentialAccess {
    Immutable,
    Mutable,
}

// ── Argument conventions ────────────────────────────────────────────

/// How a call passes one of its arguments.
///
/// Guaranteed conventions read without consuming. Indirect conventions pass
/// an address rather than a register value. Inout and out conventions let
/// the callee write through the address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArgConvention {
    /// Register value, callee only reads it.
    DirectGuaranteed,
    /// Register value, ownership transfers to the callee.
    DirectOwned,
    /// Address of an initialized value; the callee consumes it.
    IndirectIn,
    /// Address of an initialized value; the callee only reads it.
    IndirectInGuaranteed,
    /// Address the callee may read and write.
    IndirectInout,
    /// Address of uninitialized memory the callee initializes.
    IndirectOut,
}

impl ArgConvention {
    /// Returns `true` if the callee reads the argument without consuming it.
    #[inline]
    pub fn is_guaranteed(self) -> bool {
        matches!(
            self,
            ArgConvention::DirectGuaranteed | ArgConvention::IndirectInGuaranteed
        )
    }

    /// Returns `true` if the argument is passed as an address.
    #[inline]
    pub fn is_indirect(self) -> bool {
        matches!(
            self,
            ArgConvention::IndirectIn
                | ArgConvention::IndirectInGuaranteed
                | ArgConvention::IndirectInout
                | ArgConvention::IndirectOut
        )
    }

    /// Returns `true` if the callee may write through the argument address.
    #[inline]
    pub fn is_inout(self) -> bool {
        matches!(self, ArgConvention::IndirectInout)
    }

    /// Returns `true` if a call passing an aliasing address under this
    /// convention may leave the memory deinitialized or changed.
    #[inline]
    pub fn may_write_memory(self) -> bool {
        matches!(
            self,
            ArgConvention::IndirectIn | ArgConvention::IndirectInout | ArgConvention::IndirectOut
        )
    }
}

// ── Instructions ────────────────────────────────────────────────────

/// A single instruction in a basic block.
///
/// Operand order is significant: [`InstKind::operands`] returns operands in
/// declaration order, and [`Operand`](crate::Operand) back-pointers record
/// positions into that order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstKind {
    /// Allocate a stack-scoped temporary. Produces an address.
    ///
    /// `dynamic_lifetime` marks temporaries that are only conditionally
    /// initialized or consumed; such temporaries cannot be promoted to SSA.
    AllocTemp { dynamic_lifetime: bool },

    /// Deallocate a stack-scoped temporary.
    DeallocTemp { addr: ValueId },

    /// Copy the value at `src` into `dst`.
    ///
    /// `take` consumes the source (leaving it uninitialized); `init` writes
    /// into uninitialized destination memory, otherwise the old destination
    /// value is destroyed first.
    CopyAddr {
        src: ValueId,
        dst: ValueId,
        take: bool,
        init: bool,
    },

    /// Store an object value into memory. Always consumes the value.
    Store {
        value: ValueId,
        addr: ValueId,
        qual: StoreQual,
    },

    /// Load the value stored at an address. Produces an object.
    Load { addr: ValueId, qual: LoadQual },

    /// Destroy the value stored at an address, leaving it uninitialized.
    DestroyAddr { addr: ValueId },

    /// Release ownership of an object value.
    DestroyValue { value: ValueId },

    /// Duplicate an object value. Produces an object.
    CopyValue { value: ValueId },

    /// Open a formal access scope on an address. Produces an address that
    /// forwards to `addr`; the scope ends at a matching [`InstKind::EndAccess`].
    BeginAccess { addr: ValueId, kind: AccessKind },

    /// Close the access scope opened by `scope`.
    EndAccess { scope: ValueId },

    /// Open an existential container for address-only access.
    /// Produces the address of the payload.
    OpenExistential {
        addr: ValueId,
        access: ExistentialAccess,
    },

    /// Project the payload address out of an enum.
    ///
    /// For most enums this invalidates the enum storage. `optional_like`
    /// marks the single-payload layout where the payload address is the enum
    /// address and projection has no memory effect.
    TakeEnumPayload { addr: ValueId, optional_like: bool },

    /// Project the address of an aggregate element. Produces an address.
    ElemAddr { base: ValueId, index: u32 },

    /// Call. `convs[i]` is the convention for `args[i]`. Produces the direct
    /// result as an object.
    Apply {
        args: Vec<ValueId>,
        convs: Vec<ArgConvention>,
    },

    /// Extend the apparent lifetime of a value; no memory effect.
    FixLifetime { value: ValueId },

    // ── Terminators ─────────────────────────────────────────────
    /// Return from the function.
    Return { value: Option<ValueId> },

    /// Unconditional jump.
    Br { dest: BlockId },

    /// Two-way conditional branch on an object value.
    CondBr {
        cond: ValueId,
        then_dest: BlockId,
        else_dest: BlockId,
    },

    /// Call that may propagate an error: control continues at `normal` on
    /// success and `error` otherwise.
    TryApply {
        args: Vec<ValueId>,
        convs: Vec<ArgConvention>,
        normal: BlockId,
        error: BlockId,
    },

    /// Marks a block as unreachable.
    Unreachable,
}

impl InstKind {
    /// Operand values in declaration order.
    pub fn operands(&self) -> SmallVec<[ValueId; 2]> {
        match self {
            InstKind::AllocTemp { .. } | InstKind::Unreachable | InstKind::Br { .. } => smallvec![],
            InstKind::DeallocTemp { addr }
            | InstKind::Load { addr, .. }
            | InstKind::DestroyAddr { addr }
            | InstKind::BeginAccess { addr, .. }
            | InstKind::OpenExistential { addr, .. }
            | InstKind::TakeEnumPayload { addr, .. } => smallvec![*addr],
            InstKind::DestroyValue { value }
            | InstKind::CopyValue { value }
            | InstKind::FixLifetime { value } => smallvec![*value],
            InstKind::EndAccess { scope } => smallvec![*scope],
            InstKind::ElemAddr { base, .. } => smallvec![*base],
            InstKind::CopyAddr { src, dst, .. } => smallvec![*src, *dst],
            InstKind::Store { value, addr, .. } => smallvec![*value, *addr],
            InstKind::Apply { args, .. } | InstKind::TryApply { args, .. } => {
                args.iter().copied().collect()
            }
            InstKind::CondBr { cond, .. } => smallvec![*cond],
            InstKind::Return { value } => match value {
                Some(v) => smallvec![*v],
                None => smallvec![],
            },
        }
    }

    /// Overwrite the operand at `index` (in [`operands`](Self::operands)
    /// order). Use-list maintenance is the caller's job; passes go through
    /// [`Function::redirect_operand`](crate::Function::redirect_operand).
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range for this instruction.
    pub(crate) fn set_operand(&mut self, index: usize, new: ValueId) {
        let ok = match self {
            InstKind::DeallocTemp { addr }
            | InstKind::Load { addr, .. }
            | InstKind::DestroyAddr { addr }
            | InstKind::BeginAccess { addr, .. }
            | InstKind::OpenExistential { addr, .. }
            | InstKind::TakeEnumPayload { addr, .. } => {
                if index == 0 {
                    *addr = new;
                    true
                } else {
                    false
                }
            }
            InstKind::DestroyValue { value }
            | InstKind::CopyValue { value }
            | InstKind::FixLifetime { value } => {
                if index == 0 {
                    *value = new;
                    true
                } else {
                    false
                }
            }
            InstKind::EndAccess { scope } => {
                if index == 0 {
                    *scope = new;
                    true
                } else {
                    false
                }
            }
            InstKind::ElemAddr { base, .. } => {
                if index == 0 {
                    *base = new;
                    true
                } else {
                    false
                }
            }
            InstKind::CopyAddr { src, dst, .. } => match index {
                0 => {
                    *src = new;
                    true
                }
                1 => {
                    *dst = new;
                    true
                }
                _ => false,
            },
            InstKind::Store { value, addr, .. } => match index {
                0 => {
                    *value = new;
                    true
                }
                1 => {
                    *addr = new;
                    true
                }
                _ => false,
            },
            InstKind::Apply { args, .. } | InstKind::TryApply { args, .. } => {
                if let Some(slot) = args.get_mut(index) {
                    *slot = new;
                    true
                } else {
                    false
                }
            }
            InstKind::CondBr { cond, .. } => {
                if index == 0 {
                    *cond = new;
                    true
                } else {
                    false
                }
            }
            InstKind::Return { value } => match value {
                Some(v) if index == 0 => {
                    *v = new;
                    true
                }
                _ => false,
            },
            InstKind::AllocTemp { .. } | InstKind::Unreachable | InstKind::Br { .. } => false,
        };
        assert!(ok, "operand index {index} out of range for {self:?}");
    }

    /// The category of the value this instruction produces, if any.
    pub fn result_kind(&self) -> Option<ValueKind> {
        match self {
            InstKind::AllocTemp { .. }
            | InstKind::BeginAccess { .. }
            | InstKind::OpenExistential { .. }
            | InstKind::TakeEnumPayload { .. }
            | InstKind::ElemAddr { .. } => Some(ValueKind::Address),
            InstKind::Load { .. } | InstKind::CopyValue { .. } | InstKind::Apply { .. } => {
                Some(ValueKind::Object)
            }
            InstKind::DeallocTemp { .. }
            | InstKind::CopyAddr { .. }
            | InstKind::Store { .. }
            | InstKind::DestroyAddr { .. }
            | InstKind::DestroyValue { .. }
            | InstKind::EndAccess { .. }
            | InstKind::FixLifetime { .. }
            | InstKind::Return { .. }
            | InstKind::Br { .. }
            | InstKind::CondBr { .. }
            | InstKind::TryApply { .. }
            | InstKind::Unreachable => None,
        }
    }

    /// Returns `true` if this instruction must end its basic block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Return { .. }
                | InstKind::Br { .. }
                | InstKind::CondBr { .. }
                | InstKind::TryApply { .. }
                | InstKind::Unreachable
        )
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::mem;

    use super::*;

    #[test]
    fn id_basics() {
        let v = ValueId::new(42);
        assert_eq!(v.raw(), 42);
        assert_eq!(v.index(), 42);
        assert!(ValueId::new(0) < ValueId::new(1));
        assert_eq!(BlockId::new(7).index(), 7);
        assert_eq!(InstId::new(3).raw(), 3);
    }

    #[test]
    fn id_sizes() {
        assert_eq!(mem::size_of::<ValueId>(), 4);
        assert_eq!(mem::size_of::<InstId>(), 4);
        assert_eq!(mem::size_of::<BlockId>(), 4);
    }

    #[test]
    fn conventions() {
        assert!(ArgConvention::DirectGuaranteed.is_guaranteed());
        assert!(ArgConvention::IndirectInGuaranteed.is_guaranteed());
        assert!(!ArgConvention::DirectOwned.is_guaranteed());
        assert!(!ArgConvention::IndirectIn.is_guaranteed());

        assert!(ArgConvention::IndirectInGuaranteed.is_indirect());
        assert!(ArgConvention::IndirectOut.is_indirect());
        assert!(!ArgConvention::DirectGuaranteed.is_indirect());

        assert!(ArgConvention::IndirectInout.is_inout());
        assert!(!ArgConvention::IndirectIn.is_inout());

        assert!(ArgConvention::IndirectIn.may_write_memory());
        assert!(ArgConvention::IndirectOut.may_write_memory());
        assert!(!ArgConvention::IndirectInGuaranteed.may_write_memory());
    }

    #[test]
    fn operand_order_copy_addr() {
        let k = InstKind::CopyAddr {
            src: ValueId::new(1),
            dst: ValueId::new(2),
            take: false,
            init: true,
        };
        let ops = k.operands();
        assert_eq!(ops.as_slice(), &[ValueId::new(1), ValueId::new(2)]);
    }

    #[test]
    fn operand_order_store() {
        let k = InstKind::Store {
            value: ValueId::new(5),
            addr: ValueId::new(6),
            qual: StoreQual::Init,
        };
        assert_eq!(k.operands().as_slice(), &[ValueId::new(5), ValueId::new(6)]);
    }

    #[test]
    fn set_operand_redirects() {
        let mut k = InstKind::Load {
            addr: ValueId::new(1),
            qual: LoadQual::Copy,
        };
        k.set_operand(0, ValueId::new(9));
        assert_eq!(k.operands().as_slice(), &[ValueId::new(9)]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn set_operand_out_of_range_panics() {
        let mut k = InstKind::Unreachable;
        k.set_operand(0, ValueId::new(0));
    }

    #[test]
    fn result_kinds() {
        assert_eq!(
            InstKind::AllocTemp {
                dynamic_lifetime: false
            }
            .result_kind(),
            Some(ValueKind::Address)
        );
        assert_eq!(
            InstKind::Load {
                addr: ValueId::new(0),
                qual: LoadQual::Take
            }
            .result_kind(),
            Some(ValueKind::Object)
        );
        assert_eq!(
            InstKind::DestroyAddr {
                addr: ValueId::new(0)
            }
            .result_kind(),
            None
        );
    }

    #[test]
    fn terminators() {
        assert!(InstKind::Return { value: None }.is_terminator());
        assert!(InstKind::Unreachable.is_terminator());
        assert!(InstKind::Br {
            dest: BlockId::new(0)
        }
        .is_terminator());
        assert!(!InstKind::FixLifetime {
            value: ValueId::new(0)
        }
        .is_terminator());
    }
}
