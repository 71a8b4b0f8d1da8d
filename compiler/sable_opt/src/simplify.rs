//! Cleanup of address producers left dead by copy deletion.
//!
//! Deleting a copy can strand the instructions that produced its source
//! address: an access scope whose only remaining uses are its end markers,
//! or a projection with no uses at all. These carry no memory effect (a
//! non-destructive enum projection included), so they are erased and the
//! producer of their own base address is reconsidered in turn.

use sable_ir::{Function, InstId, InstKind, Operand, ValueId};

/// Erase `inst` if it is an address producer with no remaining meaningful
/// uses, then walk up to its base producer. Returns `true` if anything was
/// erased.
pub(crate) fn erase_if_dead_address_producer(f: &mut Function, inst: InstId) -> bool {
    if !f.is_alive(inst) {
        return false;
    }
    let Some(result) = f.result(inst) else {
        return false;
    };
    let parent: Option<ValueId> = match f.kind(inst).clone() {
        InstKind::BeginAccess { addr, .. } => {
            let uses: Vec<Operand> = f.uses(result).to_vec();
            let only_scope_ends = uses
                .iter()
                .all(|u| matches!(f.kind(u.inst), InstKind::EndAccess { .. }));
            if !only_scope_ends {
                return false;
            }
            for operand in uses {
                f.erase(operand.inst);
            }
            Some(addr)
        }
        InstKind::ElemAddr { base, .. } => f.uses(result).is_empty().then_some(base),
        InstKind::OpenExistential { addr, .. } => f.uses(result).is_empty().then_some(addr),
        InstKind::TakeEnumPayload {
            addr,
            optional_like: true,
        } => f.uses(result).is_empty().then_some(addr),
        _ => return false,
    };
    let Some(parent) = parent else {
        return false;
    };
    f.erase(inst);
    if let Some(parent_def) = f.def_inst(parent) {
        erase_if_dead_address_producer(f, parent_def);
    }
    true
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use sable_ir::{AccessKind, LoadQual, ValueKind};

    use super::*;

    #[test]
    fn unused_access_scope_is_erased_with_its_ends() {
        let mut f = Function::new("scope");
        let b0 = f.add_block();
        let src = f.add_arg(ValueKind::Address);
        let begin = f.append(
            b0,
            InstKind::BeginAccess {
                addr: src,
                kind: AccessKind::Read,
            },
        );
        let Some(scope) = f.result(begin) else {
            panic!("begin_access produces an address");
        };
        let end = f.append(b0, InstKind::EndAccess { scope });
        f.append(b0, InstKind::Return { value: None });

        assert!(erase_if_dead_address_producer(&mut f, begin));
        assert!(!f.is_alive(begin));
        assert!(!f.is_alive(end));
    }

    #[test]
    fn scope_with_a_real_use_is_kept() {
        let mut f = Function::new("live_scope");
        let b0 = f.add_block();
        let src = f.add_arg(ValueKind::Address);
        let begin = f.append(
            b0,
            InstKind::BeginAccess {
                addr: src,
                kind: AccessKind::Read,
            },
        );
        let Some(scope) = f.result(begin) else {
            panic!("begin_access produces an address");
        };
        f.append(
            b0,
            InstKind::Load {
                addr: scope,
                qual: LoadQual::Copy,
            },
        );
        f.append(b0, InstKind::EndAccess { scope });
        f.append(b0, InstKind::Return { value: None });

        assert!(!erase_if_dead_address_producer(&mut f, begin));
        assert!(f.is_alive(begin));
    }

    #[test]
    fn dead_projection_chain_collapses_upward() {
        let mut f = Function::new("chain");
        let b0 = f.add_block();
        let src = f.add_arg(ValueKind::Address);
        let begin = f.append(
            b0,
            InstKind::BeginAccess {
                addr: src,
                kind: AccessKind::Read,
            },
        );
        let Some(scope) = f.result(begin) else {
            panic!("begin_access produces an address");
        };
        let end = f.append(b0, InstKind::EndAccess { scope });
        let elem = f.append(
            b0,
            InstKind::ElemAddr {
                base: scope,
                index: 0,
            },
        );
        f.append(b0, InstKind::Return { value: None });

        assert!(erase_if_dead_address_producer(&mut f, elem));
        assert!(!f.is_alive(elem));
        assert!(!f.is_alive(begin));
        assert!(!f.is_alive(end));
    }
}
