//! Structural verifier for the Sable IR.
//!
//! Checks the invariants every pass relies on: blocks are terminated,
//! terminators sit only at block ends, erased instructions are unlinked,
//! use-lists and operand lists agree in both directions, and operands have
//! the value category (address vs object) their instruction demands.
//!
//! Tests run [`verify`] after every successful rewrite; a violation here is
//! a bug in a mutation primitive or a pass, never a recoverable condition.

use smallvec::SmallVec;
use thiserror::Error;

use crate::function::{Function, Operand};
use crate::ir::{BlockId, InstId, InstKind, ValueId, ValueKind};

/// A structural defect in a [`Function`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum VerifyError {
    #[error("block {block:?} does not end with a terminator")]
    MissingTerminator { block: BlockId },
    #[error("terminator {inst:?} is not the last instruction of block {block:?}")]
    MidBlockTerminator { inst: InstId, block: BlockId },
    #[error("erased instruction {inst:?} is still linked into block {block:?}")]
    DeadInstInBlock { inst: InstId, block: BlockId },
    #[error("operand {index} of {inst:?} uses {value:?} but is missing from its use-list")]
    MissingUse {
        inst: InstId,
        index: u32,
        value: ValueId,
    },
    #[error("use-list of {value:?} names {inst:?} operand {index}, which does not use it")]
    StaleUse {
        value: ValueId,
        inst: InstId,
        index: u32,
    },
    #[error("operand {index} of {inst:?} is {found:?} where {expected:?} is required")]
    OperandKind {
        inst: InstId,
        index: u32,
        expected: ValueKind,
        found: ValueKind,
    },
    #[error("{inst:?} has {args} arguments but {convs} argument conventions")]
    ConventionArity {
        inst: InstId,
        args: usize,
        convs: usize,
    },
}

/// Value categories each operand position must carry. `None` means the
/// position accepts either category (a lifetime marker works on objects
/// and on addresses alike).
fn expected_operand_kinds(kind: &InstKind) -> SmallVec<[Option<ValueKind>; 4]> {
    use ValueKind::{Address, Object};
    match kind {
        InstKind::AllocTemp { .. } | InstKind::Unreachable | InstKind::Br { .. } => {
            SmallVec::new()
        }
        InstKind::DeallocTemp { .. }
        | InstKind::Load { .. }
        | InstKind::DestroyAddr { .. }
        | InstKind::BeginAccess { .. }
        | InstKind::EndAccess { .. }
        | InstKind::OpenExistential { .. }
        | InstKind::TakeEnumPayload { .. }
        | InstKind::ElemAddr { .. } => SmallVec::from_slice(&[Some(Address)]),
        InstKind::CopyAddr { .. } => SmallVec::from_slice(&[Some(Address), Some(Address)]),
        InstKind::Store { .. } => SmallVec::from_slice(&[Some(Object), Some(Address)]),
        InstKind::DestroyValue { .. } | InstKind::CopyValue { .. } | InstKind::CondBr { .. } => {
            SmallVec::from_slice(&[Some(Object)])
        }
        InstKind::FixLifetime { .. } => SmallVec::from_slice(&[None]),
        InstKind::Return { value } => {
            if value.is_some() {
                SmallVec::from_slice(&[Some(Object)])
            } else {
                SmallVec::new()
            }
        }
        InstKind::Apply { convs, .. } | InstKind::TryApply { convs, .. } => convs
            .iter()
            .map(|c| Some(if c.is_indirect() { Address } else { Object }))
            .collect(),
    }
}

/// Verify the structural invariants of `f`.
///
/// Returns the first defect found, in block-then-instruction order.
pub fn verify(f: &Function) -> Result<(), VerifyError> {
    for block_index in 0..f.num_blocks() {
        let block = BlockId::new(u32::try_from(block_index).unwrap_or_else(|_| {
            panic!("block count exceeds u32::MAX");
        }));
        let insts = f.insts(block);
        match insts.last() {
            Some(&last) if f.kind(last).is_terminator() => {}
            _ => return Err(VerifyError::MissingTerminator { block }),
        }
        for &inst in insts {
            if !f.is_alive(inst) {
                return Err(VerifyError::DeadInstInBlock { inst, block });
            }
            if f.kind(inst).is_terminator() && insts.last() != Some(&inst) {
                return Err(VerifyError::MidBlockTerminator { inst, block });
            }
            verify_operands(f, inst)?;
        }
    }
    for &arg in f.args() {
        verify_use_list(f, arg)?;
    }
    for block_index in 0..f.num_blocks() {
        let block = BlockId::new(block_index as u32);
        for &inst in f.insts(block) {
            if let Some(result) = f.result(inst) {
                verify_use_list(f, result)?;
            }
        }
    }
    Ok(())
}

fn verify_operands(f: &Function, inst: InstId) -> Result<(), VerifyError> {
    let kind = f.kind(inst);
    let operands = kind.operands();
    if let InstKind::Apply { args, convs } | InstKind::TryApply { args, convs, .. } = kind {
        if args.len() != convs.len() {
            return Err(VerifyError::ConventionArity {
                inst,
                args: args.len(),
                convs: convs.len(),
            });
        }
    }
    let expected = expected_operand_kinds(kind);
    debug_assert_eq!(expected.len(), operands.len());
    for (i, (&value, &want)) in operands.iter().zip(expected.iter()).enumerate() {
        let index = i as u32;
        let found = f.value_kind(value);
        if let Some(want) = want {
            if found != want {
                return Err(VerifyError::OperandKind {
                    inst,
                    index,
                    expected: want,
                    found,
                });
            }
        }
        if !f.uses(value).contains(&Operand { inst, index }) {
            return Err(VerifyError::MissingUse { inst, index, value });
        }
    }
    Ok(())
}

fn verify_use_list(f: &Function, value: ValueId) -> Result<(), VerifyError> {
    for &operand in f.uses(value) {
        let stale = VerifyError::StaleUse {
            value,
            inst: operand.inst,
            index: operand.index,
        };
        if !f.is_alive(operand.inst) {
            return Err(stale);
        }
        let operands = f.kind(operand.inst).operands();
        if operands.get(operand.index as usize) != Some(&value) {
            return Err(stale);
        }
    }
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────
