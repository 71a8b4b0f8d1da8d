//! Lifetime frontier computation for a set of instruction users.
//!
//! Given a start instruction and the set of instructions that use a value,
//! computes the **frontier**: the program points immediately after the last
//! users, covering every control-flow path out of the live region. A
//! frontier point is either the instruction following the last user within
//! a block, or the first instruction of a successor block the live region
//! does not enter.
//!
//! Control flow is never modified. If covering the lifetime would require
//! placing a point on a critical edge (a dead successor with more than one
//! predecessor), the computation fails with `None` and the caller gives up
//! on its candidate.
//!
//! # References
//!
//! - Swift: `lib/SILOptimizer/Utils/ValueLifetime.cpp` (frontier in
//!   `DontModifyCFG` mode)
//! - Appel: "Modern Compiler Implementation" §10.1 (backward dataflow)

use rustc_hash::FxHashSet;
use sable_ir::{BlockId, Function, InstId};

/// Compute the lifetime frontier of `start` with respect to `users`.
///
/// `start` acts as a user of itself, so an empty `users` set yields the
/// frontier immediately after `start`. Returns `None` when the frontier
/// cannot be placed without changing the CFG.
pub fn compute_frontier(
    f: &Function,
    start: InstId,
    users: &FxHashSet<InstId>,
) -> Option<Vec<InstId>> {
    let def_block = f.block_of(start);
    let preds = f.predecessors();

    // Blocks the live region touches: the defining block plus everything
    // backward-reachable from a user block.
    let mut live: FxHashSet<BlockId> = FxHashSet::default();
    live.insert(def_block);
    let mut worklist: Vec<BlockId> = Vec::new();
    for &user in users {
        let block = f.block_of(user);
        if live.insert(block) {
            worklist.push(block);
        }
    }
    while let Some(block) = worklist.pop() {
        for &pred in &preds[block.index()] {
            if live.insert(pred) {
                worklist.push(pred);
            }
        }
    }
    // The defining block is live from `start`, not from its beginning.
    let live_at_begin = |block: BlockId| live.contains(&block) && block != def_block;

    let mut frontier: Vec<InstId> = Vec::new();
    for block_index in 0..f.num_blocks() {
        let block = BlockId::new(block_index as u32);
        if !live.contains(&block) {
            continue;
        }
        let succs = f.successors(block);
        let live_in_succ = succs.iter().any(|&s| live_at_begin(s));
        if live_in_succ {
            // The region continues into at least one successor; every dead
            // successor needs a point at its head.
            for &succ in &succs {
                if live_at_begin(succ) {
                    continue;
                }
                if preds[succ.index()].len() > 1 {
                    // Critical edge; placing a point here would require a split.
                    return None;
                }
                frontier.push(*f.insts(succ).first()?);
            }
            continue;
        }
        // The lifetime ends inside this block, after its last user.
        let insts = f.insts(block);
        let last_user_pos = insts
            .iter()
            .rposition(|&inst| inst == start || users.contains(&inst));
        let Some(pos) = last_user_pos else {
            debug_assert!(false, "live block without a user");
            return None;
        };
        if pos + 1 < insts.len() {
            frontier.push(insts[pos + 1]);
            continue;
        }
        // Last user is the terminator; the frontier moves into the successors.
        for &succ in &succs {
            if preds[succ.index()].len() > 1 {
                return None;
            }
            frontier.push(*f.insts(succ).first()?);
        }
    }
    Some(frontier)
}

// ── Tests ───────────────────────────────────────────────────────────
