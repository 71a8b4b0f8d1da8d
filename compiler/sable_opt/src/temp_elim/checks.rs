//! Eligibility checks that run between classification and rewriting.
//!
//! `source_unmodified` guards the copy-replacement variant: forwarding the
//! temporary's readers to the copy source is only sound if nothing can
//! change the source while the temporary is still being read.
//!
//! `ends_at_destroy_points` guards the lifetime assumption: once the
//! initializer's ownership transfer is removed, every path out of the
//! temporary's live region must end at a recognized whole-value destroy.

use rustc_hash::FxHashSet;
use sable_ir::{Function, InstId, InstKind, LoadQual, ValueId};

use crate::alias::AliasAnalysis;
use crate::frontier::compute_frontier;

/// Check that `copy_src` cannot be modified while the temporary is in use.
///
/// The temporary's useful lifetime ends at its last read, and the
/// classifier confined all reads to the initialization block, so a forward
/// scan from the copy suffices: once every collected read has been seen,
/// later writes no longer matter. The scan refuses to run off the end of
/// the block; reads that cannot be accounted for mean the read set and the
/// block disagree, and the candidate is rejected.
pub(crate) fn source_unmodified(
    f: &Function,
    aa: &AliasAnalysis,
    copy: InstId,
    copy_src: ValueId,
    reads: &FxHashSet<InstId>,
) -> bool {
    let block = f.block_of(copy);
    let start = f.local_index(copy) + 1;
    let mut seen = 0usize;
    for &inst in &f.insts(block)[start..] {
        if reads.contains(&inst) {
            seen += 1;
        }
        if seen == reads.len() {
            return true;
        }
        if aa.may_write_to_memory(f, inst, copy_src) {
            tracing::debug!(?inst, "source modified inside the temporary's lifetime");
            return false;
        }
    }
    false
}

/// Check that the temporary's lifetime ends at direct destroys on every
/// path, returning the lifetime frontier on success.
///
/// A taking initializer already owns the lifetime question: replacing the
/// uses cannot unbalance anything, and no frontier is needed. Otherwise the
/// frontier of the temporary's address is computed from every use except
/// the initializer and the deallocation, and the instruction right before
/// each frontier point must be a whole-value destroy: a `destroy_addr`, a
/// consuming load, or a consuming copy out of the temporary. A frontier
/// point at a block head means the lifetime ended at a terminator or
/// escaped the recognized pattern; such candidates are rejected.
pub(crate) fn ends_at_destroy_points(
    f: &Function,
    temp: ValueId,
    init: InstId,
    init_takes: bool,
) -> Option<Vec<InstId>> {
    if init_takes {
        return Some(Vec::new());
    }
    let mut users: FxHashSet<InstId> = FxHashSet::default();
    for &operand in f.uses(temp) {
        if operand.inst == init {
            continue;
        }
        if matches!(f.kind(operand.inst), InstKind::DeallocTemp { .. }) {
            continue;
        }
        users.insert(operand.inst);
    }
    let frontier = compute_frontier(f, init, &users)?;
    for &point in &frontier {
        let prev = f.prev_inst(point)?;
        match *f.kind(prev) {
            InstKind::DestroyAddr { .. } => {}
            InstKind::Load {
                qual: LoadQual::Take,
                ..
            } => {}
            InstKind::CopyAddr { src, take, .. } => {
                debug_assert_eq!(src, temp, "writes were ruled out by classification");
                if !take {
                    return None;
                }
            }
            _ => return None,
        }
    }
    Some(frontier)
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use sable_ir::{StoreQual, ValueKind};

    use super::*;

    fn copy_into_temp(f: &mut Function) -> (sable_ir::BlockId, ValueId, ValueId, InstId) {
        let b0 = f.add_block();
        let src = f.add_arg(ValueKind::Address);
        let alloc = f.append(
            b0,
            InstKind::AllocTemp {
                dynamic_lifetime: false,
            },
        );
        let temp = match f.result(alloc) {
            Some(v) => v,
            None => panic!("alloc_temp produces an address"),
        };
        let copy = f.append(
            b0,
            InstKind::CopyAddr {
                src,
                dst: temp,
                take: false,
                init: true,
            },
        );
        (b0, src, temp, copy)
    }

    #[test]
    fn unrelated_write_after_last_read_is_fine() {
        let mut f = Function::new("t");
        let aa = AliasAnalysis::new();
        let (b0, src, temp, copy) = copy_into_temp(&mut f);
        let read = f.append(
            b0,
            InstKind::Load {
                addr: temp,
                qual: LoadQual::Copy,
            },
        );
        f.append(b0, InstKind::DestroyAddr { addr: src });
        f.append(b0, InstKind::Return { value: None });

        let mut reads = FxHashSet::default();
        reads.insert(read);
        assert!(source_unmodified(&f, &aa, copy, src, &reads));
    }

    #[test]
    fn write_before_a_read_rejects() {
        let mut f = Function::new("t");
        let aa = AliasAnalysis::new();
        let (b0, src, temp, copy) = copy_into_temp(&mut f);
        let obj = f.add_arg(ValueKind::Object);
        f.append(
            b0,
            InstKind::Store {
                value: obj,
                addr: src,
                qual: StoreQual::Assign,
            },
        );
        let read = f.append(
            b0,
            InstKind::Load {
                addr: temp,
                qual: LoadQual::Copy,
            },
        );
        f.append(b0, InstKind::Return { value: None });

        let mut reads = FxHashSet::default();
        reads.insert(read);
        assert!(!source_unmodified(&f, &aa, copy, src, &reads));
    }

    #[test]
    fn empty_read_set_succeeds_immediately() {
        let mut f = Function::new("t");
        let aa = AliasAnalysis::new();
        let (b0, src, _temp, copy) = copy_into_temp(&mut f);
        f.append(b0, InstKind::Return { value: None });
        assert!(source_unmodified(&f, &aa, copy, src, &FxHashSet::default()));
    }

    #[test]
    fn unseen_read_runs_off_the_block_and_rejects() {
        let mut f = Function::new("t");
        let aa = AliasAnalysis::new();
        let (b0, src, temp, copy) = copy_into_temp(&mut f);
        f.append(b0, InstKind::Return { value: None });

        // A read claimed for a different block can never be counted.
        let b1 = f.add_block();
        let stray = f.append(
            b1,
            InstKind::Load {
                addr: temp,
                qual: LoadQual::Copy,
            },
        );
        f.append(b1, InstKind::Return { value: None });

        let mut reads = FxHashSet::default();
        reads.insert(stray);
        assert!(!source_unmodified(&f, &aa, copy, src, &reads));
    }

    #[test]
    fn taking_initializer_short_circuits() {
        let mut f = Function::new("t");
        let (_b0, _src, temp, copy) = copy_into_temp(&mut f);
        assert_eq!(ends_at_destroy_points(&f, temp, copy, true), Some(vec![]));
    }

    #[test]
    fn direct_destroy_is_recognized() {
        let mut f = Function::new("t");
        let (b0, _src, temp, copy) = copy_into_temp(&mut f);
        let read = f.append(
            b0,
            InstKind::Load {
                addr: temp,
                qual: LoadQual::Copy,
            },
        );
        let destroy = f.append(b0, InstKind::DestroyAddr { addr: temp });
        let dealloc = f.append(b0, InstKind::DeallocTemp { addr: temp });
        f.append(b0, InstKind::Return { value: None });
        let _ = read;

        assert_eq!(
            ends_at_destroy_points(&f, temp, copy, false),
            Some(vec![dealloc])
        );
        let _ = destroy;
    }

    #[test]
    fn lifetime_ending_without_a_destroy_rejects() {
        let mut f = Function::new("t");
        let (b0, _src, temp, copy) = copy_into_temp(&mut f);
        f.append(
            b0,
            InstKind::Load {
                addr: temp,
                qual: LoadQual::Copy,
            },
        );
        f.append(b0, InstKind::DeallocTemp { addr: temp });
        f.append(b0, InstKind::Return { value: None });

        assert_eq!(ends_at_destroy_points(&f, temp, copy, false), None);
    }

    #[test]
    fn consuming_copy_out_counts_as_a_destroy() {
        let mut f = Function::new("t");
        let (b0, _src, temp, copy) = copy_into_temp(&mut f);
        let sink = f.add_arg(ValueKind::Address);
        f.append(
            b0,
            InstKind::CopyAddr {
                src: temp,
                dst: sink,
                take: true,
                init: true,
            },
        );
        let dealloc = f.append(b0, InstKind::DeallocTemp { addr: temp });
        f.append(b0, InstKind::Return { value: None });

        assert_eq!(
            ends_at_destroy_points(&f, temp, copy, false),
            Some(vec![dealloc])
        );
    }
}
