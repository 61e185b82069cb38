//! Conversion from stack bodies to ref bodies
//!
//! Instructions are visited once each, carrying a stack of [`values::Value`]s. The expression for
//! a value is only built at the end, once it is known whether the value is inlined into its
//! consumer or stored into a local right after it is computed. Values get stored when they are
//! used more than once, when they meet different values at a join point, or when deferring their
//! evaluation to the consumer would reorder observable effects.

mod values;
mod writer;

use self::values::{instruction_effects, Origin, Slot, ValueId, Values};
use self::writer::Operands;
use super::MethodContext;
use crate::analysis::{self, Cfg, ControlFlow, StackEmulator};
use crate::errors::Error;
use crate::jvm::{BinaryName, FieldType, JvmType};
use crate::refs::{
    Effects, Expr, LineNumber, LocalId, LocalVariable, RefBody, Statement, StmtId, TryCatchBlock,
};
use crate::stack::{InsnId, Instruction, StackBody, StackLocal};
use crate::util::ArenaKey;
use std::collections::{HashMap, HashSet};

/// Convert a stack body into an (unprocessed) ref body
pub fn convert(context: &MethodContext, stack_body: &StackBody) -> Result<RefBody, Error> {
    stack_body.check_references()?;
    let frames = StackEmulator::run(stack_body)?;
    let cfg = Cfg::new(stack_body)?;
    log::debug!(
        "Converting {} instructions ({} reachable) into statements",
        stack_body.instructions.len(),
        frames.reachable_count()
    );

    let mut converter = StackToRef::new(context, stack_body, cfg)?;
    converter.traverse()?;
    converter.finish()
}

/// State of a stack to ref conversion
struct StackToRef<'a> {
    /// Body being converted
    stack_body: &'a StackBody,

    /// Control flow of the body being converted
    cfg: Cfg<InsnId>,

    /// Body being built
    body: RefBody,

    /// Ref local standing in for each stack local (indexed by stack local)
    locals: Vec<LocalId>,

    /// Caught exception value of each live handler
    handlers: HashMap<InsnId, ValueId>,

    /// Every value pushed so far
    values: Values,

    /// Stack on the first arrival at each visited instruction
    entries: HashMap<InsnId, Vec<Slot>>,

    /// Operands and call result of instructions which become statements
    statements: HashMap<InsnId, (Vec<ValueId>, Option<ValueId>)>,

    /// Instructions left to visit, with the stack they are reached with
    worklist: Vec<(InsnId, Vec<Slot>)>,
}

impl<'a> StackToRef<'a> {
    fn new(
        context: &MethodContext,
        stack_body: &'a StackBody,
        cfg: Cfg<InsnId>,
    ) -> Result<StackToRef<'a>, Error> {
        if context.parameters.len() != stack_body.parameter_locals.len() {
            return Err(Error::ParameterCount {
                expected: stack_body.parameter_locals.len(),
                found: context.parameters.len(),
            });
        }

        let mut body = RefBody::new();
        let mut locals = vec![];
        for stack_local in stack_body.locals() {
            let ty = if stack_body.this_local == Some(stack_local) {
                Some(FieldType::object(context.owner.clone()))
            } else {
                stack_body
                    .parameter_locals
                    .iter()
                    .position(|parameter| *parameter == stack_local)
                    .map(|index| context.parameters[index].clone())
            };
            locals.push(body.new_local(ty));
        }
        body.this_local = stack_body.this_local.map(|local| locals[local.index()]);
        body.argument_locals = stack_body
            .parameter_locals
            .iter()
            .map(|local| locals[local.index()])
            .collect();

        Ok(StackToRef {
            stack_body,
            cfg,
            body,
            locals,
            handlers: HashMap::new(),
            values: Values::default(),
            entries: HashMap::new(),
            statements: HashMap::new(),
            worklist: vec![],
        })
    }

    fn local(&self, stack_local: StackLocal) -> LocalId {
        self.locals[stack_local.index()]
    }

    fn shape_error(&self, insn: InsnId, kind: crate::errors::ShapeErrorKind) -> Error {
        Error::StackShape {
            instruction: self.stack_body.describe(insn),
            kind,
        }
    }

    /// Store a value into a fresh temporary right after it is computed
    fn materialize(&mut self, value: ValueId) {
        let body = &mut self.body;
        if self.values.store(value, || body.new_synthetic_local()) {
            log::trace!(
                "Storing {:?} computed at {}",
                value,
                self.values.get(value).producer()
            );
        }
    }

    /// Visit every reachable instruction once
    fn traverse(&mut self) -> Result<(), Error> {
        if let Some(entry) = self.stack_body.entry() {
            self.worklist.push((entry, vec![]));
        }

        loop {
            while let Some((insn, stack)) = self.worklist.pop() {
                match self.entries.get(&insn) {
                    Some(existing) => {
                        let existing = existing.clone();
                        self.merge(insn, &existing, &stack)?;
                    }
                    None => {
                        self.entries.insert(insn, stack.clone());
                        self.visit(insn, stack)?;
                    }
                }
            }

            // Handlers become live once something they protect is live
            let live_handlers: Vec<InsnId> = self
                .cfg
                .regions()
                .iter()
                .filter(|region| !self.handlers.contains_key(&region.handler))
                .filter(|region| {
                    region
                        .covered
                        .iter()
                        .any(|insn| self.entries.contains_key(insn))
                })
                .map(|region| region.handler)
                .collect();
            for handler in live_handlers {
                if self.handlers.contains_key(&handler) {
                    continue;
                }
                let local = self.body.new_local(None);
                let caught = self.values.push_stored(Origin::Caught(handler), local);
                self.handlers.insert(handler, caught);
                let slot = Slot {
                    value: caught,
                    ty: JvmType::Reference,
                };
                self.worklist.push((handler, vec![slot]));
            }

            if self.worklist.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Reconcile the stack an instruction was first reached with and another incoming stack
    ///
    /// Differing values in the same slot end up stored into the same local, so that whatever
    /// consumes the slot can read it from that local.
    fn merge(&mut self, insn: InsnId, existing: &[Slot], incoming: &[Slot]) -> Result<(), Error> {
        for (old, new) in existing.iter().zip(incoming) {
            if old.value == new.value {
                continue;
            }
            log::trace!("Merging {:?} and {:?} at {}", old.value, new.value, insn);
            match (self.values.local(old.value), self.values.local(new.value)) {
                (Some(old_local), Some(new_local)) => {
                    if old_local != new_local {
                        if self.body.locals[new_local].synthetic {
                            self.values.union(old_local, new_local);
                        } else {
                            self.values.union(new_local, old_local);
                        }
                    }
                }
                (Some(local), None) => self.values.store_into(new.value, local),
                (None, Some(local)) => self.values.store_into(old.value, local),
                (None, None) => {
                    let local = self.body.new_synthetic_local();
                    self.values.store_into(old.value, local);
                    self.values.store_into(new.value, local);
                }
            }
        }

        for stack in [existing, incoming] {
            let mut seen = HashSet::new();
            for slot in stack {
                if let Some(local) = self.values.local(slot.value) {
                    if !seen.insert(local) {
                        return Err(Error::UnsupportedInstruction {
                            instruction: self.stack_body.describe(insn),
                            reason: "merging stacks would share one local between live values",
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn visit(&mut self, insn: InsnId, mut stack: Vec<Slot>) -> Result<(), Error> {
        let stack_body: &'a StackBody = self.stack_body;
        let instruction = stack_body
            .instructions
            .get(insn)
            .ok_or_else(|| Error::DanglingReference(insn.to_string()))?;
        log::trace!("Visiting {}: {:?} with {} values", insn, instruction, stack.len());

        match analysis::signature(instruction) {
            None => self.shuffle(insn, instruction, &mut stack)?,
            Some(signature) => {
                let popped = analysis::pop_expecting(&mut stack, &signature.pops, |slot| slot.ty)
                    .map_err(|kind| self.shape_error(insn, kind))?;
                let operands: Vec<ValueId> = popped.iter().map(|slot| slot.value).collect();
                self.store_region_crossing(insn, &operands);

                if writer::is_statement(instruction) {
                    self.store_before_statement(instruction, &operands, &stack);
                    for operand in &operands {
                        self.values.consume(*operand);
                    }
                    let result = match signature.push {
                        Some(ty) => {
                            let local = self.body.new_synthetic_local();
                            let value = self.values.push_stored(Origin::CallResult(insn), local);
                            stack.push(Slot { value, ty });
                            Some(value)
                        }
                        None => None,
                    };
                    self.statements.insert(insn, (operands, result));
                } else if let Some(ty) = signature.push {
                    let reads = match instruction {
                        Instruction::Load(_, local) => Some(*local),
                        _ => None,
                    };
                    let value = self.values.push(
                        Origin::Computed(insn),
                        operands,
                        instruction_effects(instruction),
                        reads,
                        &stack,
                    );
                    stack.push(Slot { value, ty });
                }
            }
        }

        for successor in self.cfg.successors(insn).to_vec() {
            self.worklist.push((successor, stack.clone()));
        }
        Ok(())
    }

    /// Apply a stack shuffle to the expression stack
    ///
    /// Dropped values with effects get stored so that their effects still happen. Duplicated
    /// values get a fresh identity for each extra occurrence.
    fn shuffle(
        &mut self,
        insn: InsnId,
        instruction: &Instruction,
        stack: &mut Vec<Slot>,
    ) -> Result<(), Error> {
        let before = stack.clone();
        analysis::shuffle(instruction, stack).map_err(|kind| self.shape_error(insn, kind))?;

        let mut counts: HashMap<ValueId, isize> = HashMap::new();
        for slot in &before {
            *counts.entry(slot.value).or_default() -= 1;
        }
        for slot in stack.iter() {
            *counts.entry(slot.value).or_default() += 1;
        }
        for slot in &before {
            if counts.get(&slot.value).map_or(false, |count| *count < 0)
                && self.values.is_effectful(slot.value)
            {
                self.materialize(slot.value);
            }
        }

        // Consumers evaluate inlined values shallowest last, so effectful values which end up
        // above a value pushed after them must be evaluated where they were computed
        let first_position =
            |value: ValueId| stack.iter().position(|slot| slot.value == value);
        for (depth, deeper) in before.iter().enumerate() {
            if !self.values.is_effectful(deeper.value) {
                continue;
            }
            let overtaken = before[depth + 1..].iter().any(|above| {
                self.values.is_effectful(above.value)
                    && matches!(
                        (first_position(deeper.value), first_position(above.value)),
                        (Some(earlier), Some(later)) if later < earlier
                    )
            });
            if overtaken {
                self.materialize(deeper.value);
            }
        }

        let mut seen = HashSet::new();
        for position in 0..stack.len() {
            let original = stack[position].value;
            if seen.insert(original) {
                continue;
            }
            let copy = self.values.push(
                Origin::Copy {
                    shuffle: insn,
                    of: original,
                },
                vec![original],
                Effects::empty(),
                None,
                &stack[..position],
            );
            stack[position].value = copy;
        }
        Ok(())
    }

    /// Store effectful operands evaluated under different protected regions than they were
    /// computed under
    fn store_region_crossing(&mut self, insn: InsnId, operands: &[ValueId]) {
        let consumer_regions = self.cfg.covering_regions(insn);
        for operand in operands {
            if !self.values.is_effectful(*operand) {
                continue;
            }
            let producer = self.values.get(*operand).producer();
            if self.cfg.covering_regions(producer) != consumer_regions {
                self.materialize(*operand);
            }
        }
    }

    /// Store values left on the stack which must be evaluated before a statement executes
    fn store_before_statement(
        &mut self,
        instruction: &Instruction,
        operands: &[ValueId],
        remaining: &[Slot],
    ) {
        let mut effects = instruction_effects(instruction);
        for operand in operands {
            if self.values.is_effectful(*operand) {
                effects |= self.values.get(*operand).effects;
            }
        }
        let written = match instruction {
            Instruction::Store(_, local) | Instruction::Increment(local, _) => Some(*local),
            _ => None,
        };
        let exits = matches!(instruction, Instruction::Return(_) | Instruction::Throw);

        for slot in remaining {
            let overwritten = written.map_or(false, |local| self.values.reads(slot.value, local));
            let reordered = self.values.is_effectful(slot.value) && (exits || !effects.is_empty());
            if overwritten || reordered {
                self.materialize(slot.value);
            }
        }
    }

    /// Store values used more than once, then values whose evaluation must precede a stored value
    fn store_remaining_values(&mut self) {
        let stack_body = self.stack_body;
        let cheap = |insn: InsnId| {
            matches!(
                stack_body.instructions.get(insn),
                Some(Instruction::Push(_) | Instruction::Load(_, _))
            )
        };
        let ids: Vec<ValueId> = self.values.ids().collect();
        for value in &ids {
            if self.values.get(*value).uses > 1 && !self.values.is_trivial(*value, cheap) {
                self.materialize(*value);
            }
        }

        let mut worklist: Vec<ValueId> = ids
            .into_iter()
            .filter(|value| {
                let value = self.values.get(*value);
                value.local.is_some() && !value.effects.is_empty()
            })
            .collect();
        while let Some(value) = worklist.pop() {
            for below in self.values.get(value).below.clone() {
                if self.values.is_effectful(below) {
                    self.materialize(below);
                    worklist.push(below);
                }
            }
        }
    }

    /// Expression reading a value where it is consumed
    fn use_value(&self, value: ValueId) -> Result<Expr, Error> {
        match self.values.local(value) {
            Some(local) => Ok(Expr::Local(local)),
            None => self.define_value(value),
        }
    }

    /// Expression computing a value
    fn define_value(&self, value: ValueId) -> Result<Expr, Error> {
        let value = self.values.get(value);
        match value.origin {
            Origin::Computed(insn) => {
                let instruction = self
                    .stack_body
                    .instructions
                    .get(insn)
                    .ok_or_else(|| Error::DanglingReference(insn.to_string()))?;
                let operands = value
                    .operands
                    .iter()
                    .map(|operand| self.use_value(*operand))
                    .collect::<Result<Vec<Expr>, Error>>()?;
                writer::expression(instruction, Operands::new(instruction, operands), |local| {
                    self.local(local)
                })
            }
            Origin::Copy { of, .. } => self.use_value(of),
            Origin::CallResult(insn) | Origin::Caught(insn) => match value.local {
                Some(local) => Ok(Expr::Local(self.values.find(local))),
                None => Err(Error::DanglingReference(insn.to_string())),
            },
        }
    }

    /// Statements for every reachable instruction, in body order
    fn statements(&mut self) -> Result<Vec<(InsnId, Statement<InsnId>)>, Error> {
        let mut produced: HashMap<InsnId, Vec<ValueId>> = HashMap::new();
        for value in self.values.ids() {
            if let Origin::Computed(_) | Origin::Copy { .. } = self.values.get(value).origin {
                produced
                    .entry(self.values.get(value).producer())
                    .or_default()
                    .push(value);
            }
        }

        let mut unused_results = vec![];
        let mut emitted = vec![];
        for insn in self.cfg.reachable().to_vec() {
            let instruction = self
                .stack_body
                .instructions
                .get(insn)
                .ok_or_else(|| Error::DanglingReference(insn.to_string()))?;

            if let Some((operands, result)) = self.statements.get(&insn) {
                let exprs = operands
                    .iter()
                    .map(|operand| self.use_value(*operand))
                    .collect::<Result<Vec<Expr>, Error>>()?;
                let result = match result {
                    Some(result) => match self.values.local(*result) {
                        Some(local)
                            if self.values.get(*result).uses == 0
                                && !self.values.was_merged(local) =>
                        {
                            unused_results.push(local);
                            None
                        }
                        local => local,
                    },
                    None => None,
                };
                let statement = writer::statement(
                    instruction,
                    Operands::new(instruction, exprs),
                    result,
                    |local| self.local(local),
                )?;
                emitted.push((insn, statement));
            }

            for value in produced.get(&insn).into_iter().flatten() {
                if let Some(local) = self.values.local(*value) {
                    let value = self.define_value(*value)?;
                    emitted.push((insn, Statement::assign_local(local, value)));
                }
            }
        }

        for local in unused_results {
            self.body.locals.remove(local);
        }
        Ok(emitted)
    }

    fn finish(mut self) -> Result<RefBody, Error> {
        self.store_remaining_values();
        let emitted = self.statements()?;
        let stack_body: &'a StackBody = self.stack_body;

        let mut placed: HashMap<InsnId, Vec<StmtId>> = HashMap::new();
        let mut pending = Vec::with_capacity(emitted.len());
        for (insn, statement) in emitted {
            let id = self.body.push(Statement::Return(None));
            placed.entry(insn).or_default().push(id);
            pending.push((id, statement));
        }

        // First statement standing in for an instruction, or for the next one if it has none
        let anchor = |insn: InsnId| -> Result<StmtId, Error> {
            stack_body
                .instructions
                .iter_from(insn)
                .find_map(|(next, _)| placed.get(&next).and_then(|ids| ids.first().copied()))
                .ok_or_else(|| Error::DanglingReference(insn.to_string()))
        };
        let spanned = |first: InsnId, last: InsnId| -> Result<Vec<StmtId>, Error> {
            let range = stack_body.instructions.range(first, last).ok_or_else(|| {
                Error::IllegalRegionRange {
                    first: first.to_string(),
                    last: last.to_string(),
                }
            })?;
            Ok(range
                .flat_map(|(insn, _)| placed.get(&insn).into_iter().flatten().copied())
                .collect())
        };

        for (id, statement) in pending {
            let mut unresolved = None;
            let resolved = statement.map_targets(|target| match anchor(*target) {
                Ok(stmt) => stmt,
                Err(_) => {
                    unresolved = Some(*target);
                    id
                }
            });
            if let Some(target) = unresolved {
                return Err(Error::DanglingReference(target.to_string()));
            }
            self.body.statements[id] = resolved;
        }

        let mut caught_types: HashMap<LocalId, Option<BinaryName>> = HashMap::new();
        for block in &stack_body.try_catch_blocks {
            let local = match self
                .handlers
                .get(&block.handler)
                .and_then(|caught| self.values.local(*caught))
            {
                Some(local) => local,
                None => continue,
            };
            let covered = spanned(block.first, block.last)?;
            let (first, last) = match (covered.first(), covered.last()) {
                (Some(first), Some(last)) => (*first, *last),
                _ => {
                    log::trace!("Dropping protected region without live statements");
                    continue;
                }
            };
            let exception = block.exception.clone();
            caught_types
                .entry(local)
                .and_modify(|common| {
                    if *common != exception {
                        *common = None;
                    }
                })
                .or_insert_with(|| exception.clone());
            self.body.try_catch_blocks.push(TryCatchBlock {
                first,
                last,
                handler: anchor(block.handler)?,
                exception,
                local,
            });
        }
        for (local, exception) in caught_types {
            let class = exception.unwrap_or(BinaryName::THROWABLE);
            self.body.locals[local].ty = Some(FieldType::object(class));
        }

        for line in &stack_body.line_numbers {
            if !self.cfg.is_reachable(line.start) {
                log::warn!("Dropping line number {} on dead code", line.line);
                continue;
            }
            self.body.line_numbers.push(LineNumber {
                start: anchor(line.start)?,
                line: line.line,
            });
        }

        for variable in &stack_body.local_variables {
            let scope = spanned(variable.start, variable.end)?;
            match (scope.first(), scope.last()) {
                (Some(start), Some(end)) => self.body.local_variables.push(LocalVariable {
                    name: variable.name.clone(),
                    descriptor: variable.descriptor.clone(),
                    signature: variable.signature.clone(),
                    start: *start,
                    end: *end,
                    local: self.locals[variable.local.index()],
                }),
                _ => log::warn!("Dropping local variable {} on dead code", variable.name),
            }
        }

        for local in self.values.merged_away().collect::<Vec<LocalId>>() {
            self.body.locals.remove(local);
        }

        log::debug!(
            "Produced {} statements and {} locals",
            self.body.statements.len(),
            self.body.locals.len()
        );
        Ok(self.body)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::*;
    use crate::stack::StackBodyBuilder;

    fn context(parameters: Vec<FieldType>) -> MethodContext {
        MethodContext {
            owner: BinaryName::from_str("demo/Main").unwrap(),
            parameters,
        }
    }

    #[test]
    fn expressions_are_inlined() {
        let mut builder = StackBodyBuilder::new(false, 0);
        builder
            .push_all(vec![
                Instruction::Push(Constant::Int(1)),
                Instruction::Push(Constant::Int(2)),
                Instruction::Arithmetic(ArithmeticOp::Add, NumericType::Int),
                Instruction::Return(Some(JvmType::Int)),
            ])
            .unwrap();
        let body = convert(&context(vec![]), &builder.finish().unwrap()).unwrap();
        assert_eq!(body.lines(), vec!["return (1 + 2)"]);
    }

    #[test]
    fn loads_before_stores() {
        let mut builder = StackBodyBuilder::new(false, 1);
        let param = builder.parameter_local(0).unwrap();
        builder
            .push_all(vec![
                Instruction::Load(JvmType::Int, param),
                Instruction::Increment(param, -1),
                Instruction::Return(Some(JvmType::Int)),
            ])
            .unwrap();
        let body = convert(&context(vec![FieldType::int()]), &builder.finish().unwrap()).unwrap();
        assert_eq!(
            body.lines(),
            vec!["l1 = l0", "l0 = (l0 - 1)", "return l1"]
        );
        assert!(body.locals[LocalId::from_index(1)].synthetic);
    }

    #[test]
    fn dropped_calls_still_happen() {
        let method = MethodRef {
            owner: BinaryName::from_str("demo/Main").unwrap(),
            name: UnqualifiedName::from_str("tick").unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::long()),
            },
            is_interface: false,
        };
        let mut builder = StackBodyBuilder::new(false, 0);
        builder
            .push_all(vec![
                Instruction::Invoke(InvokeType::Static, method),
                Instruction::Pop2,
                Instruction::Return(None),
            ])
            .unwrap();
        let body = convert(&context(vec![]), &builder.finish().unwrap()).unwrap();
        assert_eq!(body.lines(), vec!["demo/Main.tick()", "return"]);
        assert_eq!(body.locals.len(), 0);
    }

    #[test]
    fn join_points_share_locals() {
        // return arg == 0 ? 1 : 2
        let mut builder = StackBodyBuilder::new(false, 1);
        let param = builder.parameter_local(0).unwrap();
        let (other, join) = (builder.fresh_label(), builder.fresh_label());
        builder.push(Instruction::Load(JvmType::Int, param)).unwrap();
        builder.push(Instruction::If(OrdComparison::NE, other)).unwrap();
        builder.push(Instruction::Push(Constant::Int(1))).unwrap();
        builder.push(Instruction::Goto(join)).unwrap();
        builder.place_label(other).unwrap();
        builder.push(Instruction::Push(Constant::Int(2))).unwrap();
        builder.place_label(join).unwrap();
        builder.push(Instruction::Return(Some(JvmType::Int))).unwrap();

        let body = convert(&context(vec![FieldType::int()]), &builder.finish().unwrap()).unwrap();
        assert_eq!(
            body.lines(),
            vec![
                "if (l0 != 0) goto 3",
                "l1 = 1",
                "goto 4",
                "l1 = 2",
                "return l1"
            ]
        );
    }

    #[test]
    fn parameter_count_mismatch() {
        let mut builder = StackBodyBuilder::new(true, 1);
        builder.push(Instruction::Return(None)).unwrap();
        let body = builder.finish().unwrap();
        assert!(matches!(
            convert(&context(vec![]), &body),
            Err(Error::ParameterCount {
                expected: 1,
                found: 0
            })
        ));
    }
}
