//! Conservative alias oracle for Sable IR addresses.
//!
//! Answers the two questions the rewrite passes ask: may this instruction
//! write to the memory at an address, and are two addresses guaranteed
//! disjoint. Reasoning is base-address only: addresses are traced through
//! access markers and projections to a root, and the answers fall out of
//! how roots relate. Anything not provably disjoint may alias.
//!
//! Stack temporaries (`AllocTemp`) anchor the precise cases: their
//! addresses are created locally and never escape into another root, so a
//! temporary's storage is disjoint from every other root's storage.

use sable_ir::{AccessKind, ExistentialAccess, Function, InstId, InstKind, LoadQual, ValueId};

/// Conservative, intra-procedural alias analysis.
///
/// Stateless: both queries recompute from the def-use graph. The pass
/// invocation that owns the [`Function`] holds the only reference, so
/// there is nothing to cache or invalidate.
#[derive(Debug, Default)]
pub struct AliasAnalysis;

impl AliasAnalysis {
    pub fn new() -> Self {
        Self
    }

    /// The root address a projection chain grows from: a stack allocation
    /// or a function argument.
    fn base_of(f: &Function, value: ValueId) -> ValueId {
        let mut v = value;
        while let Some(def) = f.def_inst(v) {
            match f.kind(def) {
                InstKind::BeginAccess { addr, .. }
                | InstKind::OpenExistential { addr, .. }
                | InstKind::TakeEnumPayload { addr, .. } => v = *addr,
                InstKind::ElemAddr { base, .. } => v = *base,
                _ => break,
            }
        }
        v
    }

    fn is_stack_allocation(f: &Function, value: ValueId) -> bool {
        f.def_inst(value)
            .is_some_and(|def| matches!(f.kind(def), InstKind::AllocTemp { .. }))
    }

    /// Returns `true` if `a` and `b` are guaranteed to address disjoint
    /// memory. `false` means "may alias".
    pub fn is_no_alias(&self, f: &Function, a: ValueId, b: ValueId) -> bool {
        if a == b {
            return false;
        }
        // Sibling projections off one aggregate are disjoint when the
        // element indices differ.
        let sa = f.strip_access_markers(a);
        let sb = f.strip_access_markers(b);
        if let (Some(da), Some(db)) = (f.def_inst(sa), f.def_inst(sb)) {
            if let (
                InstKind::ElemAddr {
                    base: base_a,
                    index: index_a,
                },
                InstKind::ElemAddr {
                    base: base_b,
                    index: index_b,
                },
            ) = (f.kind(da), f.kind(db))
            {
                if index_a != index_b
                    && f.strip_access_markers(*base_a) == f.strip_access_markers(*base_b)
                {
                    return true;
                }
            }
        }
        let base_a = Self::base_of(f, a);
        let base_b = Self::base_of(f, b);
        if base_a == base_b {
            return false;
        }
        // Distinct roots where one is a local allocation: a temporary's
        // address never escapes into another root.
        Self::is_stack_allocation(f, base_a) || Self::is_stack_allocation(f, base_b)
    }

    /// Returns `true` if executing `inst` may change or deinitialize the
    /// memory at `addr`. Destructive reads count as writes: a consuming
    /// load leaves the storage uninitialized.
    pub fn may_write_to_memory(&self, f: &Function, inst: InstId, addr: ValueId) -> bool {
        match f.kind(inst) {
            InstKind::Store { addr: dst, .. } => !self.is_no_alias(f, *dst, addr),
            InstKind::CopyAddr { src, dst, take, .. } => {
                !self.is_no_alias(f, *dst, addr)
                    || (*take && !self.is_no_alias(f, *src, addr))
            }
            InstKind::Load {
                addr: loc,
                qual: LoadQual::Take,
            }
            | InstKind::DestroyAddr { addr: loc }
            | InstKind::DeallocTemp { addr: loc }
            | InstKind::TakeEnumPayload {
                addr: loc,
                optional_like: false,
            }
            | InstKind::BeginAccess {
                addr: loc,
                kind: AccessKind::Modify,
            }
            | InstKind::OpenExistential {
                addr: loc,
                access: ExistentialAccess::Mutable,
            } => !self.is_no_alias(f, *loc, addr),
            InstKind::Apply { args, convs } | InstKind::TryApply { args, convs, .. } => args
                .iter()
                .zip(convs)
                .any(|(arg, conv)| conv.may_write_memory() && !self.is_no_alias(f, *arg, addr)),
            _ => false,
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use sable_ir::{ArgConvention, StoreQual, ValueKind};

    use super::*;

    #[test]
    fn address_never_disjoint_from_itself() {
        let mut f = Function::new("t");
        let _b0 = f.add_block();
        let a = f.add_arg(ValueKind::Address);
        let aa = AliasAnalysis::new();
        assert!(!aa.is_no_alias(&f, a, a));
    }

    #[test]
    fn two_arguments_may_alias() {
        let mut f = Function::new("t");
        let _b0 = f.add_block();
        let a = f.add_arg(ValueKind::Address);
        let b = f.add_arg(ValueKind::Address);
        let aa = AliasAnalysis::new();
        assert!(!aa.is_no_alias(&f, a, b));
    }

    #[test]
    fn temporary_disjoint_from_argument_and_other_temporary() {
        let mut f = Function::new("t");
        let b0 = f.add_block();
        let arg = f.add_arg(ValueKind::Address);
        let t0 = f.append(
            b0,
            InstKind::AllocTemp {
                dynamic_lifetime: false,
            },
        );
        let t1 = f.append(
            b0,
            InstKind::AllocTemp {
                dynamic_lifetime: false,
            },
        );
        let (Some(a0), Some(a1)) = (f.result(t0), f.result(t1)) else {
            panic!("alloc_temp produces an address");
        };
        let aa = AliasAnalysis::new();
        assert!(aa.is_no_alias(&f, a0, arg));
        assert!(aa.is_no_alias(&f, a0, a1));
    }

    #[test]
    fn projection_aliases_its_base() {
        let mut f = Function::new("t");
        let b0 = f.add_block();
        let arg = f.add_arg(ValueKind::Address);
        let p = f.append(b0, InstKind::ElemAddr { base: arg, index: 0 });
        let Some(pv) = f.result(p) else {
            panic!("elem_addr produces an address");
        };
        let aa = AliasAnalysis::new();
        assert!(!aa.is_no_alias(&f, pv, arg));
    }

    #[test]
    fn sibling_elements_are_disjoint() {
        let mut f = Function::new("t");
        let b0 = f.add_block();
        let arg = f.add_arg(ValueKind::Address);
        let p0 = f.append(b0, InstKind::ElemAddr { base: arg, index: 0 });
        let p1 = f.append(b0, InstKind::ElemAddr { base: arg, index: 1 });
        let (Some(v0), Some(v1)) = (f.result(p0), f.result(p1)) else {
            panic!("elem_addr produces an address");
        };
        let aa = AliasAnalysis::new();
        assert!(aa.is_no_alias(&f, v0, v1));
    }

    #[test]
    fn writes_and_destructive_reads() {
        let mut f = Function::new("t");
        let b0 = f.add_block();
        let a = f.add_arg(ValueKind::Address);
        let obj = f.add_arg(ValueKind::Object);
        let aa = AliasAnalysis::new();

        let st = f.append(
            b0,
            InstKind::Store {
                value: obj,
                addr: a,
                qual: StoreQual::Assign,
            },
        );
        assert!(aa.may_write_to_memory(&f, st, a));

        let take = f.append(
            b0,
            InstKind::Load {
                addr: a,
                qual: LoadQual::Take,
            },
        );
        assert!(aa.may_write_to_memory(&f, take, a));

        let read = f.append(
            b0,
            InstKind::Load {
                addr: a,
                qual: LoadQual::Copy,
            },
        );
        assert!(!aa.may_write_to_memory(&f, read, a));
    }

    #[test]
    fn copy_take_writes_through_its_source() {
        let mut f = Function::new("t");
        let b0 = f.add_block();
        let a = f.add_arg(ValueKind::Address);
        let t = f.append(
            b0,
            InstKind::AllocTemp {
                dynamic_lifetime: false,
            },
        );
        let Some(temp) = f.result(t) else {
            panic!("alloc_temp produces an address");
        };
        let c = f.append(
            b0,
            InstKind::CopyAddr {
                src: a,
                dst: temp,
                take: true,
                init: true,
            },
        );
        let aa = AliasAnalysis::new();
        assert!(aa.may_write_to_memory(&f, c, a));
        // A non-taking copy only reads its source.
        f.set_copy_is_take(c, false);
        assert!(!aa.may_write_to_memory(&f, c, a));
    }

    #[test]
    fn calls_write_through_inout_and_out_only() {
        let mut f = Function::new("t");
        let b0 = f.add_block();
        let a = f.add_arg(ValueKind::Address);
        let b = f.add_arg(ValueKind::Address);
        let aa = AliasAnalysis::new();

        let reader = f.append(
            b0,
            InstKind::Apply {
                args: vec![a],
                convs: vec![ArgConvention::IndirectInGuaranteed],
            },
        );
        assert!(!aa.may_write_to_memory(&f, reader, a));

        let writer = f.append(
            b0,
            InstKind::Apply {
                args: vec![b],
                convs: vec![ArgConvention::IndirectInout],
            },
        );
        assert!(aa.may_write_to_memory(&f, writer, a));
        assert!(aa.may_write_to_memory(&f, writer, b));
    }
}
