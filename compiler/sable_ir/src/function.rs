//! Arena-owned function graph for the Sable mid-level IR.
//!
//! A [`Function`] owns every block, instruction, and value of one function
//! body in index-addressed arenas. Def-use edges are explicit: each value
//! carries a use-list of [`Operand`] back-pointers (using instruction plus
//! operand position), and every mutation goes through a primitive that keeps
//! the lists consistent.
//!
//! # Deletion discipline
//!
//! Erasing an instruction requires its result to be unused. Rewrite passes
//! that walk a use-list therefore first [`drop_operands`](Function::drop_operands)
//! on doomed users (detaching them from the graph while they stay iterable
//! at their block position) and [`erase`](Function::erase) them only after
//! the rewrite loop finishes. Eager erasure while iterating a use-list that
//! is being rewritten is a bug in any representation.

use smallvec::{smallvec, SmallVec};

use crate::ir::{BlockId, InstId, InstKind, ValueId, ValueKind};

/// Back-pointer from a value to one use: the using instruction and the
/// operand position within it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Operand {
    /// The instruction that uses the value.
    pub inst: InstId,
    /// Position in the instruction's operand list.
    pub index: u32,
}

/// What defines a value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueDef {
    /// Function argument number.
    Arg(u32),
    /// Result of an instruction.
    Inst(InstId),
}

#[derive(Clone, Debug)]
struct ValueData {
    def: ValueDef,
    kind: ValueKind,
    uses: Vec<Operand>,
}

#[derive(Clone, Debug)]
struct InstData {
    kind: InstKind,
    block: BlockId,
    result: Option<ValueId>,
    alive: bool,
}

#[derive(Clone, Debug, Default)]
struct BlockData {
    insts: Vec<InstId>,
}

/// A complete function body.
///
/// The pass that runs over a `Function` owns it exclusively for the full
/// invocation; nothing else observes or mutates the graph concurrently.
#[derive(Clone, Debug)]
pub struct Function {
    /// The function's name (for diagnostics and logging).
    pub name: String,
    blocks: Vec<BlockData>,
    insts: Vec<InstData>,
    values: Vec<ValueData>,
    args: Vec<ValueId>,
}

impl Function {
    /// Create an empty function. The first [`add_block`](Self::add_block)
    /// call creates the entry block.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            blocks: Vec::new(),
            insts: Vec::new(),
            values: Vec::new(),
            args: Vec::new(),
        }
    }

    // ── Construction ────────────────────────────────────────────

    /// Append a new basic block.
    pub fn add_block(&mut self) -> BlockId {
        let id = BlockId::new(u32::try_from(self.blocks.len()).unwrap_or_else(|_| {
            panic!("block count exceeds u32::MAX");
        }));
        self.blocks.push(BlockData::default());
        id
    }

    /// Add a function argument of the given category.
    pub fn add_arg(&mut self, kind: ValueKind) -> ValueId {
        let arg_no = u32::try_from(self.args.len()).unwrap_or_else(|_| {
            panic!("argument count exceeds u32::MAX");
        });
        let value = self.new_value(ValueDef::Arg(arg_no), kind);
        self.args.push(value);
        value
    }

    /// Append an instruction at the end of `block`.
    pub fn append(&mut self, block: BlockId, kind: InstKind) -> InstId {
        let inst = self.create_inst(block, kind);
        self.blocks[block.index()].insts.push(inst);
        inst
    }

    /// Insert an instruction immediately before `before`, in the same block.
    pub fn insert_before(&mut self, before: InstId, kind: InstKind) -> InstId {
        let block = self.block_of(before);
        let pos = self.local_index(before);
        let inst = self.create_inst(block, kind);
        self.blocks[block.index()].insts.insert(pos, inst);
        inst
    }

    fn new_value(&mut self, def: ValueDef, kind: ValueKind) -> ValueId {
        let id = ValueId::new(u32::try_from(self.values.len()).unwrap_or_else(|_| {
            panic!("value count exceeds u32::MAX");
        }));
        self.values.push(ValueData {
            def,
            kind,
            uses: Vec::new(),
        });
        id
    }

    /// Allocate the instruction, its result value, and its use-list entries.
    /// Does not link it into a block's instruction order.
    fn create_inst(&mut self, block: BlockId, kind: InstKind) -> InstId {
        let inst = InstId::new(u32::try_from(self.insts.len()).unwrap_or_else(|_| {
            panic!("instruction count exceeds u32::MAX");
        }));
        for (i, value) in kind.operands().into_iter().enumerate() {
            self.values[value.index()].uses.push(Operand {
                inst,
                index: i as u32,
            });
        }
        let result = kind
            .result_kind()
            .map(|rk| self.new_value(ValueDef::Inst(inst), rk));
        self.insts.push(InstData {
            kind,
            block,
            result,
            alive: true,
        });
        inst
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Number of basic blocks (including any that became empty).
    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// The instructions of `block` in program order.
    pub fn insts(&self, block: BlockId) -> &[InstId] {
        &self.blocks[block.index()].insts
    }

    /// The operation of an instruction.
    pub fn kind(&self, inst: InstId) -> &InstKind {
        &self.insts[inst.index()].kind
    }

    /// The value produced by an instruction, if any.
    pub fn result(&self, inst: InstId) -> Option<ValueId> {
        self.insts[inst.index()].result
    }

    /// The block an instruction belongs to.
    pub fn block_of(&self, inst: InstId) -> BlockId {
        self.insts[inst.index()].block
    }

    /// Returns `false` once an instruction has been erased.
    pub fn is_alive(&self, inst: InstId) -> bool {
        self.insts[inst.index()].alive
    }

    /// The instruction defining a value, or `None` for function arguments.
    pub fn def_inst(&self, value: ValueId) -> Option<InstId> {
        match self.values[value.index()].def {
            ValueDef::Arg(_) => None,
            ValueDef::Inst(inst) => Some(inst),
        }
    }

    /// Whether a value is an address or an object.
    pub fn value_kind(&self, value: ValueId) -> ValueKind {
        self.values[value.index()].kind
    }

    /// The use-list of a value.
    pub fn uses(&self, value: ValueId) -> &[Operand] {
        &self.values[value.index()].uses
    }

    /// The function's arguments in declaration order.
    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    /// Position of an instruction within its block.
    ///
    /// # Panics
    ///
    /// Panics if the instruction has been erased.
    pub fn local_index(&self, inst: InstId) -> usize {
        let block = self.block_of(inst);
        self.blocks[block.index()]
            .insts
            .iter()
            .position(|&i| i == inst)
            .unwrap_or_else(|| panic!("instruction {inst:?} is not linked into its block"))
    }

    /// The instruction immediately before `inst` in its block, or `None` if
    /// `inst` is at the block head.
    pub fn prev_inst(&self, inst: InstId) -> Option<InstId> {
        let pos = self.local_index(inst);
        if pos == 0 {
            None
        } else {
            Some(self.blocks[self.block_of(inst).index()].insts[pos - 1])
        }
    }

    /// The terminator of a block, if the block is non-empty and terminated.
    pub fn terminator(&self, block: BlockId) -> Option<InstId> {
        let last = *self.blocks[block.index()].insts.last()?;
        self.kind(last).is_terminator().then_some(last)
    }

    /// Successor blocks of `block`, per its terminator.
    pub fn successors(&self, block: BlockId) -> SmallVec<[BlockId; 2]> {
        let Some(term) = self.terminator(block) else {
            return smallvec![];
        };
        match self.kind(term) {
            InstKind::Br { dest } => smallvec![*dest],
            InstKind::CondBr {
                then_dest,
                else_dest,
                ..
            } => smallvec![*then_dest, *else_dest],
            InstKind::TryApply { normal, error, .. } => smallvec![*normal, *error],
            _ => smallvec![],
        }
    }

    /// Predecessor lists for every block (deduplicated), indexed by block.
    pub fn predecessors(&self) -> Vec<Vec<BlockId>> {
        let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); self.blocks.len()];
        for index in 0..self.blocks.len() {
            let block = BlockId::new(index as u32);
            for succ in self.successors(block) {
                if !preds[succ.index()].contains(&block) {
                    preds[succ.index()].push(block);
                }
            }
        }
        preds
    }

    /// Strip pass-through access-scope markers off an address.
    ///
    /// Scope markers forward their operand address and have no memory
    /// effect of their own, so for aliasing and identity questions the
    /// underlying address is the one that matters.
    pub fn strip_access_markers(&self, value: ValueId) -> ValueId {
        let mut v = value;
        while let Some(def) = self.def_inst(v) {
            match self.kind(def) {
                InstKind::BeginAccess { addr, .. } => v = *addr,
                _ => break,
            }
        }
        v
    }

    // ── Mutation primitives ─────────────────────────────────────

    /// Point one operand at a different value, updating both use-lists.
    pub fn redirect_operand(&mut self, operand: Operand, new: ValueId) {
        let old = self.insts[operand.inst.index()].kind.operands()[operand.index as usize];
        if old == new {
            return;
        }
        self.values[old.index()]
            .uses
            .retain(|u| !(u.inst == operand.inst && u.index == operand.index));
        self.insts[operand.inst.index()]
            .kind
            .set_operand(operand.index as usize, new);
        self.values[new.index()].uses.push(operand);
    }

    /// Redirect every use of `old` to `new`.
    pub fn replace_all_uses(&mut self, old: ValueId, new: ValueId) {
        assert_ne!(old, new, "replacing a value with itself");
        let moved = std::mem::take(&mut self.values[old.index()].uses);
        for operand in &moved {
            self.insts[operand.inst.index()]
                .kind
                .set_operand(operand.index as usize, new);
        }
        self.values[new.index()].uses.extend(moved);
    }

    /// Detach an instruction from the use-lists of its operands without
    /// erasing it. The instruction keeps its block position until
    /// [`erase`](Self::erase); idempotent.
    pub fn drop_operands(&mut self, inst: InstId) {
        for value in self.insts[inst.index()].kind.operands() {
            self.values[value.index()].uses.retain(|u| u.inst != inst);
        }
    }

    /// Erase an instruction from its block.
    ///
    /// # Panics
    ///
    /// Panics if the instruction's result still has uses; erasing a
    /// referenced definition would silently corrupt the program.
    pub fn erase(&mut self, inst: InstId) {
        assert!(self.is_alive(inst), "erasing {inst:?} twice");
        if let Some(result) = self.result(inst) {
            assert!(
                self.uses(result).is_empty(),
                "erasing {inst:?} whose result {result:?} still has uses"
            );
        }
        self.drop_operands(inst);
        let pos = self.local_index(inst);
        let block = self.block_of(inst);
        self.blocks[block.index()].insts.remove(pos);
        self.insts[inst.index()].alive = false;
    }

    /// Demote or promote the `take` flag of a [`InstKind::CopyAddr`].
    ///
    /// # Panics
    ///
    /// Panics if `inst` is not a copy.
    pub fn set_copy_is_take(&mut self, inst: InstId, new_take: bool) {
        match &mut self.insts[inst.index()].kind {
            InstKind::CopyAddr { take, .. } => *take = new_take,
            other => panic!("set_copy_is_take on non-copy {other:?}"),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
