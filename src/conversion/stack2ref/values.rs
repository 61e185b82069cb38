use crate::jvm::{ArithmeticOp, JvmType, NumericType};
use crate::refs::{Effects, LocalId};
use crate::stack::{InsnId, Instruction, StackLocal};
use crate::util::Width;
use std::collections::{HashMap, HashSet};

/// Index of a value in [`Values`]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ValueId(usize);

/// Where a value on the expression stack comes from
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Origin {
    /// Computed by an instruction, from its operands
    Computed(InsnId),

    /// Extra occurrence of another value made by a `dup` variant
    Copy { shuffle: InsnId, of: ValueId },

    /// Returned by a call, which stores it straight into the value's local
    CallResult(InsnId),

    /// Exception on the stack on entry to a handler
    Caught(InsnId),
}

/// Value pushed during the traversal
///
/// The expression for the value is only built once the traversal is complete, at which point it
/// is known whether the value ends up stored in a local or inlined into its consumer.
#[derive(Debug)]
pub struct Value {
    pub origin: Origin,

    /// Values popped to compute this one, deepest first
    pub operands: Vec<ValueId>,

    /// Number of times the value is popped by a consumer
    pub uses: usize,

    /// Local holding the value (possibly merged with other locals later)
    pub local: Option<LocalId>,

    /// Effects of evaluating the value where it is consumed
    pub effects: Effects,

    /// Locals read when evaluating the value where it is consumed
    pub reads: Vec<StackLocal>,

    /// Effectful values that were under this one on the stack when it was pushed
    pub below: Vec<ValueId>,
}

impl Value {
    /// Instruction at which the value would be stored into its local
    pub fn producer(&self) -> InsnId {
        match self.origin {
            Origin::Computed(insn) | Origin::CallResult(insn) | Origin::Caught(insn) => insn,
            Origin::Copy { shuffle, .. } => shuffle,
        }
    }
}

/// Element of the expression stack
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Slot {
    pub value: ValueId,
    pub ty: JvmType,
}

impl Width for Slot {
    fn width(&self) -> usize {
        self.ty.width()
    }
}

/// Effects of an instruction which computes a value, not including its operands
pub fn instruction_effects<T>(insn: &Instruction<T>) -> Effects {
    use Instruction::*;

    match insn {
        Arithmetic(ArithmeticOp::Div | ArithmeticOp::Rem, NumericType::Int | NumericType::Long) => {
            Effects::MAY_THROW
        }
        ArrayLength | CheckCast(_) => Effects::MAY_THROW,
        ArrayLoad(_) | GetField(_) | GetStatic(_) => Effects::READS_HEAP | Effects::MAY_THROW,
        New(_) | NewArray { .. } => Effects::ALLOCATES | Effects::MAY_THROW,
        ArrayStore(_) | PutField(_) | PutStatic(_) | MonitorEnter | MonitorExit => {
            Effects::WRITES_HEAP | Effects::MAY_THROW
        }
        Throw => Effects::MAY_THROW,
        Invoke(_, _) | InvokeDynamic(_) => Effects::CALLS,
        _ => Effects::empty(),
    }
}

/// Arena of values, along with the locals they get stored into
#[derive(Debug, Default)]
pub struct Values {
    values: Vec<Value>,

    /// Union-find forest of locals that got merged
    parents: HashMap<LocalId, LocalId>,

    /// Locals which took part in a merge
    merged: HashSet<LocalId>,
}

impl Values {
    /// Add a value computed from popped operands
    ///
    /// Effects and reads are accumulated from operands which will be evaluated as part of this
    /// value (those not already stored in a local).
    pub fn push(
        &mut self,
        origin: Origin,
        operands: Vec<ValueId>,
        own_effects: Effects,
        own_reads: Option<StackLocal>,
        stack: &[Slot],
    ) -> ValueId {
        let mut effects = own_effects;
        let mut reads: Vec<StackLocal> = own_reads.into_iter().collect();
        for operand in &operands {
            let operand = &self.values[operand.0];
            if operand.local.is_none() {
                effects |= operand.effects;
                for local in &operand.reads {
                    if !reads.contains(local) {
                        reads.push(*local);
                    }
                }
            }
        }
        for operand in &operands {
            self.values[operand.0].uses += 1;
        }
        let below = stack
            .iter()
            .map(|slot| slot.value)
            .filter(|value| self.is_effectful(*value))
            .collect();

        let id = ValueId(self.values.len());
        self.values.push(Value {
            origin,
            operands,
            uses: 0,
            local: None,
            effects,
            reads,
            below,
        });
        id
    }

    /// Add a value which already lives in a local
    pub fn push_stored(&mut self, origin: Origin, local: LocalId) -> ValueId {
        let id = ValueId(self.values.len());
        self.values.push(Value {
            origin,
            operands: vec![],
            uses: 0,
            local: Some(local),
            effects: Effects::empty(),
            reads: vec![],
            below: vec![],
        });
        id
    }

    pub fn get(&self, value: ValueId) -> &Value {
        &self.values[value.0]
    }

    pub fn ids(&self) -> impl Iterator<Item = ValueId> {
        (0..self.values.len()).map(ValueId)
    }

    /// Record that a consumer popped the value
    pub fn consume(&mut self, value: ValueId) {
        self.values[value.0].uses += 1;
    }

    /// Would evaluating the value at its consumer have observable effects?
    pub fn is_effectful(&self, value: ValueId) -> bool {
        let value = &self.values[value.0];
        value.local.is_none() && !value.effects.is_empty()
    }

    /// Does evaluating the value at its consumer read the local?
    pub fn reads(&self, value: ValueId, local: StackLocal) -> bool {
        let value = &self.values[value.0];
        value.local.is_none() && value.reads.contains(&local)
    }

    /// Can the value be evaluated several times instead of being stored in a local?
    pub fn is_trivial(&self, value: ValueId, instruction: impl Fn(InsnId) -> bool) -> bool {
        let value = &self.values[value.0];
        if value.local.is_some() {
            return true;
        }
        match value.origin {
            Origin::Computed(insn) => instruction(insn),
            Origin::Copy { of, .. } => self.is_trivial(of, instruction),
            Origin::CallResult(_) | Origin::Caught(_) => true,
        }
    }

    /// Local the value is stored in, after merges
    pub fn local(&self, value: ValueId) -> Option<LocalId> {
        self.values[value.0].local.map(|local| self.find(local))
    }

    /// Store the value into a local at its producer
    ///
    /// Returns `false` if the value was already stored.
    pub fn store(&mut self, value: ValueId, fresh_local: impl FnOnce() -> LocalId) -> bool {
        let value = &mut self.values[value.0];
        if value.local.is_some() {
            return false;
        }
        value.local = Some(fresh_local());
        true
    }

    /// Store the value into an existing local
    pub fn store_into(&mut self, value: ValueId, local: LocalId) {
        self.values[value.0].local = Some(local);
        self.merged.insert(local);
    }

    pub fn find(&self, mut local: LocalId) -> LocalId {
        while let Some(parent) = self.parents.get(&local) {
            local = *parent;
        }
        local
    }

    /// Merge two locals, keeping `keep` as the representative
    pub fn union(&mut self, keep: LocalId, other: LocalId) {
        let (keep, other) = (self.find(keep), self.find(other));
        self.merged.insert(keep);
        self.merged.insert(other);
        if keep != other {
            self.parents.insert(other, keep);
        }
    }

    /// Locals which no longer stand for themselves after merging
    pub fn merged_away(&self) -> impl Iterator<Item = LocalId> + '_ {
        self.parents.keys().copied()
    }

    pub fn was_merged(&self, local: LocalId) -> bool {
        self.merged.contains(&self.find(local))
    }
}
