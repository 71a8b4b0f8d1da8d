//! Use classifier for temporary-buffer elimination.
//!
//! Walks every use of a candidate temporary (and, transitively, of address
//! projections rooted at it) and decides whether the whole use set is
//! read-only. Reads are collected into a set the source-mutation check
//! consumes; any use that could write to, consume, or reinitialize the
//! temporary disqualifies the candidate.
//!
//! Callers handle the lifetime bookkeeping uses themselves: the
//! initializing copy or store, destroys, deallocation, and whole-value
//! consuming loads of the temporary never reach the classifier. A consuming
//! load seen *here* is therefore on a projection, which would be a
//! reinitialization pattern, and is rejected.

use rustc_hash::FxHashSet;
use sable_ir::{
    AccessKind, ExistentialAccess, Function, InstId, InstKind, LoadQual, Operand, ValueId,
};

use crate::alias::AliasAnalysis;

/// Classify one use of `addr` (the temporary or a projection of it).
///
/// `src` is the address the temporary was copied from, when there is one;
/// promotions of stores pass `None` and lose the cases that need a source
/// address to stand in for the temporary. Reads are recorded in `reads`.
/// Returns `false` if the use disqualifies the candidate.
pub(crate) fn collect_reads(
    f: &Function,
    aa: &AliasAnalysis,
    user: InstId,
    operand: Operand,
    addr: ValueId,
    src: Option<ValueId>,
    reads: &mut FxHashSet<InstId>,
) -> bool {
    // Normal uses must stay in the block that materializes the temporary;
    // only destroys and the deallocation may live elsewhere.
    let Some(addr_def) = f.def_inst(addr) else {
        return false;
    };
    if f.block_of(user) != f.block_of(addr_def) {
        tracing::debug!(?user, "use outside the materialization block");
        return false;
    }

    match f.kind(user) {
        // A read-only access scope forwards the address; its scope value
        // has its own uses, checked when the scope shows up as a source.
        InstKind::BeginAccess { kind, .. } => *kind == AccessKind::Read,

        InstKind::Apply { args, convs } | InstKind::TryApply { args, convs, .. } => {
            let conv = convs[operand.index as usize];
            if !conv.is_guaranteed() {
                tracing::debug!(?user, "call consumes the temporary");
                return false;
            }
            // Without a source address there is nothing to pass in place of
            // an indirect argument short of changing the callee's signature.
            if src.is_none() && conv.is_indirect() {
                tracing::debug!(?user, "indirect argument with no source address");
                return false;
            }
            // The source-mutation check skips the use instructions it
            // counts, so a call that could write the source through another
            // inout argument must be caught here. An out argument cannot
            // overlap the source: the source is initialized at the call.
            if let Some(src) = src {
                for (&arg, &conv) in args.iter().zip(convs) {
                    if conv.is_inout() && !aa.is_no_alias(f, arg, src) {
                        tracing::debug!(?user, "inout argument may alias the source");
                        return false;
                    }
                }
            }
            reads.insert(user);
            true
        }

        InstKind::OpenExistential { access, .. } => {
            if src.is_none() {
                return false;
            }
            if *access != ExistentialAccess::Immutable {
                tracing::debug!(?user, "mutable existential access");
                return false;
            }
            collect_reads_from_projection(f, aa, user, src, reads)
        }

        InstKind::TakeEnumPayload { optional_like, .. } => {
            // Projecting a payload invalidates the enum storage unless the
            // layout shares the payload address.
            *optional_like && collect_reads_from_projection(f, aa, user, src, reads)
        }

        InstKind::ElemAddr { .. } => collect_reads_from_projection(f, aa, user, src, reads),

        InstKind::Load { qual, .. } => match qual {
            // Whole-value takes were filtered by the caller; this one is on
            // a projection and implies a reinitialization pattern.
            LoadQual::Take => {
                tracing::debug!(?user, "consuming load of a projection");
                false
            }
            LoadQual::Borrow => {
                // The borrow's lifetime must be covered by a replacement
                // source object, which a store promotion does not have.
                if src.is_none() {
                    return false;
                }
                reads.insert(user);
                true
            }
            LoadQual::Copy => {
                reads.insert(user);
                true
            }
        },

        InstKind::FixLifetime { .. } => {
            reads.insert(user);
            true
        }

        InstKind::CopyAddr { dst, .. } => {
            if *dst == addr {
                tracing::debug!(?user, "temporary written or reinitialized");
                return false;
            }
            reads.insert(user);
            true
        }

        _ => {
            tracing::debug!(?user, "use may write or destroy the temporary");
            false
        }
    }
}

/// Recurse into the uses of an address projection rooted at the temporary.
fn collect_reads_from_projection(
    f: &Function,
    aa: &AliasAnalysis,
    projection: InstId,
    src: Option<ValueId>,
    reads: &mut FxHashSet<InstId>,
) -> bool {
    if src.is_none() {
        tracing::debug!(?projection, "projection with no source address");
        return false;
    }
    let Some(result) = f.result(projection) else {
        return false;
    };
    for &operand in f.uses(result) {
        if !collect_reads(f, aa, operand.inst, operand, result, src, reads) {
            return false;
        }
    }
    true
}
