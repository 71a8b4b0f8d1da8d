//! Shared test utilities for optimizer passes.
//!
//! Factory functions for the IR shapes the pass tests build over and over:
//! a function with an entry block, stack temporaries, initializing copies.
//! Only compiled in test builds.

use sable_ir::{BlockId, Function, InstId, InstKind, ValueId, ValueKind};

/// A fresh function with an entry block and one address argument.
pub(crate) fn func_with_source() -> (Function, BlockId, ValueId) {
    let mut f = Function::new("test");
    let b0 = f.add_block();
    let src = f.add_arg(ValueKind::Address);
    (f, b0, src)
}

/// The result value of an instruction; panics if it has none.
pub(crate) fn result_of(f: &Function, inst: InstId) -> ValueId {
    match f.result(inst) {
        Some(v) => v,
        None => panic!("instruction {inst:?} has no result"),
    }
}

/// Append an `AllocTemp` and return it with its address.
pub(crate) fn alloc_temp(f: &mut Function, block: BlockId) -> (InstId, ValueId) {
    let inst = f.append(
        block,
        InstKind::AllocTemp {
            dynamic_lifetime: false,
        },
    );
    let addr = result_of(f, inst);
    (inst, addr)
}

/// Append a non-taking initializing `CopyAddr`.
pub(crate) fn copy_init(f: &mut Function, block: BlockId, src: ValueId, dst: ValueId) -> InstId {
    f.append(
        block,
        InstKind::CopyAddr {
            src,
            dst,
            take: false,
            init: true,
        },
    )
}

/// Assert the function passes IR verification.
pub(crate) fn assert_verifies(f: &Function) {
    if let Err(err) = sable_ir::verify(f) {
        panic!("IR verification failed: {err}");
    }
}

/// Count live instructions matching `pred` across all blocks.
pub(crate) fn count_insts(f: &Function, pred: impl Fn(&InstKind) -> bool) -> usize {
    (0..f.num_blocks())
        .map(|i| {
            f.insts(BlockId::new(i as u32))
                .iter()
                .filter(|&&inst| pred(f.kind(inst)))
                .count()
        })
        .sum()
}
