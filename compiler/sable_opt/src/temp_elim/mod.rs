//! Temporary-buffer elimination.
//!
//! Eliminates short-lived temporary stack buffers that materialize a value
//! only so it can be read back: a temporary initialized exactly once by a
//! whole-value `copy_addr` or `store`, read through loads, calls, and
//! projections, and destroyed directly on every path. Readers are forwarded
//! to the copy source (or to the stored object value) and the allocation
//! disappears, together with the ownership traffic the buffer carried.
//!
//! # Algorithm
//!
//! Per candidate, four stages:
//!
//! 1. **Classify** every use of the temporary ([`classify`]): all uses must
//!    be read-only and, apart from destroys and the deallocation, confined
//!    to the initialization block.
//! 2. **Check the source** ([`checks::source_unmodified`], copy variant
//!    only): nothing may write to the copy source while the temporary is
//!    still being read, otherwise forwarding the readers would change what
//!    they observe.
//! 3. **Check the lifetime** ([`checks::ends_at_destroy_points`], copy
//!    variant only): the temporary must die at recognized whole-value
//!    destroys, so removing them cannot leak or double-destroy.
//! 4. **Rewrite**: forward or delete each use. A copy candidate degrades to
//!    an identity copy (deleted in a final sweep, which also cleans up
//!    newly dead address producers); a store candidate and its allocation
//!    are erased on the spot.
//!
//! The store variant promotes the buffer to the stored SSA value. A store
//! always consumes its operand, so there is no source lifetime to check;
//! ownership is rebuilt at each reader with `copy_value`/`destroy_value`.
//! Its rewrite refuses unknown use kinds outright: classification and
//! rewrite must agree on the supported set, and a mismatch is a bug in this
//! module, not a recoverable condition.
//!
//! # References
//!
//! - Swift: `lib/SILOptimizer/Transforms/TempRValueElimination.cpp`
//! - LLVM: `MemCpyOptimizer.cpp` (forwarding loads through a removed copy)

use rustc_hash::FxHashSet;
use sable_ir::{BlockId, Function, InstId, InstKind, LoadQual, StoreQual, ValueId};

use crate::alias::AliasAnalysis;
use crate::simplify::erase_if_dead_address_producer;

mod checks;
mod classify;

use checks::{ends_at_destroy_points, source_unmodified};
use classify::collect_reads;

/// Counters for one or more pass invocations.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TempElimStats {
    /// Copies into temporaries whose readers were forwarded to the source.
    pub copies_removed: usize,
    /// Stores into temporaries promoted to their SSA value.
    pub stores_promoted: usize,
    /// Identity copies deleted by the final sweep.
    pub identity_copies_removed: usize,
}

/// What the pass changed, for the pass manager's cache bookkeeping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Invalidation {
    /// No change; analyses remain valid.
    Nothing,
    /// Instructions were added or removed.
    Instructions,
}

/// Run temporary-buffer elimination over `f`.
///
/// Scans every block in program order for initializing copies and stores
/// into temporaries, rewrites the eligible ones, and finally deletes the
/// identity copies the rewrites leave behind.
pub fn eliminate_temp_buffers(f: &mut Function, stats: &mut TempElimStats) -> Invalidation {
    tracing::debug!(function = %f.name, "eliminating temporary buffers");
    let aa = AliasAnalysis::new();
    let mut changed = false;
    let mut dead_copies: Vec<InstId> = Vec::new();

    for block_index in 0..f.num_blocks() {
        let block = BlockId::new(block_index as u32);
        let mut idx = 0usize;
        while idx < f.insts(block).len() {
            let inst = f.insts(block)[idx];
            if matches!(f.kind(inst), InstKind::CopyAddr { .. }) {
                changed |= try_eliminate_copy_into_temp(f, &aa, inst, stats);
                // A successful rewrite turns the copy into an identity copy.
                // An identity copy can also be left by an earlier iteration
                // copying a temporary back to its source location.
                if let &InstKind::CopyAddr { src, dst, .. } = f.kind(inst) {
                    if f.strip_access_markers(src) == dst {
                        changed = true;
                        dead_copies.push(inst);
                    }
                }
                // The rewrite may have erased the allocation or instructions
                // after the copy; recompute the position from the copy,
                // which is never deleted here.
                idx = f.local_index(inst) + 1;
            } else if matches!(f.kind(inst), InstKind::Store { .. }) {
                if let Some(resume) = try_eliminate_store_into_temp(f, &aa, inst, stats) {
                    changed = true;
                    idx = resume;
                } else {
                    idx += 1;
                }
            } else {
                idx += 1;
            }
        }
    }

    // The same copy may have been queued more than once.
    dead_copies.sort_unstable();
    dead_copies.dedup();
    for &copy in &dead_copies {
        let src = match *f.kind(copy) {
            InstKind::CopyAddr { src, .. } => src,
            _ => unreachable!("only copies are queued for deletion"),
        };
        let src_def = f.def_inst(src);
        f.erase(copy);
        stats.identity_copies_removed += 1;
        // Access scopes and projections only feeding the dead copy go too.
        if let Some(def) = src_def {
            erase_if_dead_address_producer(f, def);
        }
    }

    tracing::debug!(
        function = %f.name,
        copies_removed = stats.copies_removed,
        stores_promoted = stats.stores_promoted,
        identity_copies_removed = stats.identity_copies_removed,
        "temporary elimination finished"
    );
    if changed {
        Invalidation::Instructions
    } else {
        Invalidation::Nothing
    }
}

/// Try to forward the readers of a temporary initialized by `copy` to the
/// copy's source. On success the copy is left as an identity copy for the
/// driver to sweep; returns whether the rewrite happened.
fn try_eliminate_copy_into_temp(
    f: &mut Function,
    aa: &AliasAnalysis,
    copy: InstId,
    stats: &mut TempElimStats,
) -> bool {
    let &InstKind::CopyAddr {
        src,
        dst,
        take: copy_take,
        init,
    } = f.kind(copy)
    else {
        return false;
    };
    if !init {
        return false;
    }
    let Some(alloc) = f.def_inst(dst) else {
        return false;
    };
    if !matches!(f.kind(alloc), InstKind::AllocTemp { .. }) {
        return false;
    }
    let temp = dst;

    // The readers will be redirected to the source address, so it must stay
    // valid past the temporary's last read. An access scope's address dies
    // at its end marker, which writes nothing; strip the markers and point
    // the readers at the underlying address instead.
    let copy_src = f.strip_access_markers(src);
    debug_assert_ne!(temp, copy_src, "temporary initialized from itself");

    let mut reads: FxHashSet<InstId> = FxHashSet::default();
    for &operand in f.uses(temp) {
        let user = operand.inst;
        if user == copy {
            continue;
        }
        // Destroys and the deallocation may be in another block; whole-value
        // consuming loads are the destroy pattern checked separately below.
        match f.kind(user) {
            InstKind::DestroyAddr { .. } | InstKind::DeallocTemp { .. } => continue,
            InstKind::Load {
                qual: LoadQual::Take,
                ..
            } => continue,
            _ => {}
        }
        if !collect_reads(f, aa, user, operand, temp, Some(copy_src), &mut reads) {
            return false;
        }
    }

    if !source_unmodified(f, aa, copy, copy_src, &reads) {
        return false;
    }
    let Some(frontier) = ends_at_destroy_points(f, temp, copy, copy_take) else {
        return false;
    };

    tracing::debug!(?copy, "forwarding readers of a copied temporary");

    // Rewrite each use off the front of the use-list. Users that go away
    // are detached now and erased after the loop; the copy itself is never
    // erased here (the driver is iterating next to it), it becomes an
    // identity copy instead.
    let mut to_delete: Vec<InstId> = Vec::new();
    loop {
        let Some(&operand) = f.uses(temp).first() else {
            break;
        };
        let user = operand.inst;
        match f.kind(user).clone() {
            InstKind::DestroyAddr { .. } => {
                if copy_take {
                    // Ownership of the source moved into the temporary;
                    // the destroy now releases the source's storage.
                    f.redirect_operand(operand, copy_src);
                } else {
                    f.drop_operands(user);
                    to_delete.push(user);
                }
            }
            InstKind::DeallocTemp { .. } => {
                f.drop_operands(user);
                to_delete.push(user);
            }
            InstKind::CopyAddr { take, .. } => {
                if user != copy && take && !copy_take {
                    // The temporary owned its own value, the source keeps
                    // owning its one. Taking out of the source would steal it.
                    f.set_copy_is_take(user, false);
                }
                f.redirect_operand(operand, copy_src);
            }
            InstKind::Load { qual, .. } => {
                if qual != LoadQual::Take || copy_take {
                    f.redirect_operand(operand, src);
                } else {
                    // The consuming load took the temporary's own value.
                    // Materialize that ownership as a duplicating load at
                    // the copy point and release it wherever the temporary
                    // died, except at the load itself.
                    let new_load = f.insert_before(
                        copy,
                        InstKind::Load {
                            addr: src,
                            qual: LoadQual::Copy,
                        },
                    );
                    let new_val = match f.result(new_load) {
                        Some(v) => v,
                        None => unreachable!("loads produce a value"),
                    };
                    for &point in &frontier {
                        let prev = match f.prev_inst(point) {
                            Some(p) => p,
                            None => unreachable!("frontier points follow a checked destroy"),
                        };
                        if prev == user {
                            continue;
                        }
                        f.insert_before(prev, InstKind::DestroyValue { value: new_val });
                    }
                    let old = match f.result(user) {
                        Some(v) => v,
                        None => unreachable!("loads produce a value"),
                    };
                    f.replace_all_uses(old, new_val);
                    f.drop_operands(user);
                    to_delete.push(user);
                }
            }
            // Remaining classified uses (scopes, projections, calls) just
            // read through the address and forward to the stripped source.
            _ => {
                f.redirect_operand(operand, copy_src);
            }
        }
    }
    while let Some(inst) = to_delete.pop() {
        f.erase(inst);
    }
    f.erase(alloc);
    stats.copies_removed += 1;
    true
}

/// Try to promote a temporary initialized by `store` to the stored value.
///
/// Returns the driver's resume position in the store's block on success.
/// The store and the allocation are erased here, so the resume position is
/// where the instruction after the store now sits.
fn try_eliminate_store_into_temp(
    f: &mut Function,
    aa: &AliasAnalysis,
    store: InstId,
    stats: &mut TempElimStats,
) -> Option<usize> {
    let &InstKind::Store {
        value: stored,
        addr: dst,
        qual,
    } = f.kind(store)
    else {
        return None;
    };
    // An assigning store destroys a previous value in the temporary, which
    // breaks the single-initialization pattern.
    if qual == StoreQual::Assign {
        return None;
    }
    let alloc = f.def_inst(dst)?;
    let &InstKind::AllocTemp { dynamic_lifetime } = f.kind(alloc) else {
        return None;
    };
    // Conditional initialization cannot be rebuilt around a single value.
    if dynamic_lifetime {
        return None;
    }
    let temp = dst;

    let mut reads: FxHashSet<InstId> = FxHashSet::default();
    for &operand in f.uses(temp) {
        let user = operand.inst;
        if user == store {
            continue;
        }
        match f.kind(user) {
            InstKind::DestroyAddr { .. } | InstKind::DeallocTemp { .. } => continue,
            InstKind::Load {
                qual: LoadQual::Take,
                ..
            } => continue,
            _ => {}
        }
        // No source address: the stored object value stands in instead.
        if !collect_reads(f, aa, user, operand, temp, None, &mut reads) {
            return None;
        }
    }

    // The store consumed its operand, so the temporary owns the only copy
    // and there is no source lifetime to guard. Rewrite unconditionally.
    tracing::debug!(?store, "promoting temporary initialized by store");

    let store_block = f.block_of(store);
    let mut to_delete: Vec<InstId> = Vec::new();
    for operand in f.uses(temp).to_vec() {
        let user = operand.inst;
        if user == store {
            continue;
        }
        match f.kind(user).clone() {
            InstKind::DestroyAddr { .. } => {
                f.insert_before(user, InstKind::DestroyValue { value: stored });
                f.drop_operands(user);
                to_delete.push(user);
            }
            InstKind::DeallocTemp { .. } => {
                f.drop_operands(user);
                to_delete.push(user);
            }
            InstKind::CopyAddr {
                dst: copy_dst,
                take,
                init,
                ..
            } => {
                let qual = if init {
                    StoreQual::Init
                } else {
                    StoreQual::Assign
                };
                let mut source = stored;
                if !take {
                    source = duplicate_before(f, user, stored);
                }
                f.insert_before(
                    user,
                    InstKind::Store {
                        value: source,
                        addr: copy_dst,
                        qual,
                    },
                );
                f.drop_operands(user);
                to_delete.push(user);
            }
            InstKind::Load { qual, .. } => {
                let source = match qual {
                    LoadQual::Copy => duplicate_before(f, user, stored),
                    LoadQual::Take => stored,
                    LoadQual::Borrow => {
                        unreachable!("borrowing loads were rejected during classification")
                    }
                };
                let old = match f.result(user) {
                    Some(v) => v,
                    None => unreachable!("loads produce a value"),
                };
                f.replace_all_uses(old, source);
                f.drop_operands(user);
                to_delete.push(user);
            }
            InstKind::FixLifetime { .. } => {
                f.insert_before(user, InstKind::FixLifetime { value: stored });
                f.drop_operands(user);
                to_delete.push(user);
            }
            other => panic!("cannot rewrite use of a promoted temporary: {other:?}"),
        }
    }
    while let Some(inst) = to_delete.pop() {
        f.erase(inst);
    }
    let mut resume = f.local_index(store);
    f.erase(store);
    if f.block_of(alloc) == store_block && f.local_index(alloc) < resume {
        resume -= 1;
    }
    f.erase(alloc);
    stats.stores_promoted += 1;
    Some(resume)
}

/// Insert a `copy_value` of `value` before `at` and return the duplicate.
fn duplicate_before(f: &mut Function, at: InstId, value: ValueId) -> ValueId {
    let cv = f.insert_before(at, InstKind::CopyValue { value });
    match f.result(cv) {
        Some(v) => v,
        None => unreachable!("copy_value produces a value"),
    }
}
