use super::{Instruction, InsnId, LineNumber, LocalVariable, StackBody, StackLocal, TryCatchBlock};
use crate::errors::Error;
use crate::jvm::{BinaryName, FieldType, UnqualifiedName};
use std::collections::HashMap;
use std::fmt;

/// Opaque label
#[derive(Copy, Clone, Hash, Eq, PartialEq)]
pub struct Label(usize);

impl Label {
    /// Get the next fresh label
    pub fn next(&self) -> Label {
        Label(self.0 + 1)
    }
}

impl fmt::Debug for Label {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

/// Generates new labels
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone)]
pub struct LabelGenerator(Label);

impl LabelGenerator {
    pub fn new() -> LabelGenerator {
        LabelGenerator(Label(0))
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> Label {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl Default for LabelGenerator {
    fn default() -> Self {
        LabelGenerator::new()
    }
}

struct PendingRegion {
    start: Label,
    end: Label,
    handler: Label,
    exception: Option<BinaryName>,
}

struct PendingVariable {
    name: UnqualifiedName,
    descriptor: FieldType,
    signature: Option<String>,
    start: Label,
    end: Label,
    local: StackLocal,
}

/// Builds a [`StackBody`] from instructions supplied in program order
///
/// Jumps refer to labels, which get placed right before the instruction they denote. A label can
/// also be placed after the last instruction, which is only useful as the exclusive end of a
/// protected region or local variable scope.
pub struct StackBodyBuilder {
    body: StackBody,
    labels: LabelGenerator,
    instructions: Vec<Instruction<Label>>,

    /// Index into `instructions` each label precedes
    placed: HashMap<Label, usize>,
    regions: Vec<PendingRegion>,
    line_numbers: Vec<(Label, u16)>,
    variables: Vec<PendingVariable>,
}

impl StackBodyBuilder {
    pub fn new(has_this: bool, parameter_count: usize) -> StackBodyBuilder {
        StackBodyBuilder {
            body: StackBody::new(has_this, parameter_count),
            labels: LabelGenerator::new(),
            instructions: vec![],
            placed: HashMap::new(),
            regions: vec![],
            line_numbers: vec![],
            variables: vec![],
        }
    }

    pub fn this_local(&self) -> Option<StackLocal> {
        self.body.this_local
    }

    pub fn parameter_local(&self, index: usize) -> Option<StackLocal> {
        self.body.parameter_locals.get(index).copied()
    }

    pub fn new_local(&mut self) -> StackLocal {
        self.body.new_local()
    }

    pub fn fresh_label(&mut self) -> Label {
        self.labels.fresh_label()
    }

    /// Place a label before the next instruction pushed
    pub fn place_label(&mut self, label: Label) -> Result<(), Error> {
        if self.placed.insert(label, self.instructions.len()).is_some() {
            return Err(Error::DuplicateLabel(label));
        }
        Ok(())
    }

    pub fn push(&mut self, instruction: Instruction<Label>) -> Result<(), Error> {
        instruction.check()?;
        self.instructions.push(instruction);
        Ok(())
    }

    /// Push several instructions at once
    pub fn push_all(
        &mut self,
        instructions: impl IntoIterator<Item = Instruction<Label>>,
    ) -> Result<(), Error> {
        for instruction in instructions {
            self.push(instruction)?;
        }
        Ok(())
    }

    /// Declare a protected region from `start` (inclusive) to `end` (exclusive)
    pub fn try_catch(
        &mut self,
        start: Label,
        end: Label,
        handler: Label,
        exception: Option<BinaryName>,
    ) {
        self.regions.push(PendingRegion {
            start,
            end,
            handler,
            exception,
        });
    }

    pub fn line_number(&mut self, start: Label, line: u16) {
        self.line_numbers.push((start, line));
    }

    /// Declare a source-level local variable with scope `start` (inclusive) to `end` (exclusive)
    pub fn local_variable(
        &mut self,
        name: UnqualifiedName,
        descriptor: FieldType,
        signature: Option<String>,
        start: Label,
        end: Label,
        local: StackLocal,
    ) {
        self.variables.push(PendingVariable {
            name,
            descriptor,
            signature,
            start,
            end,
            local,
        });
    }

    /// Resolve labels and produce the body
    pub fn finish(self) -> Result<StackBody, Error> {
        let StackBodyBuilder {
            mut body,
            instructions,
            placed,
            regions,
            line_numbers,
            variables,
            ..
        } = self;

        // Add all instructions first so that labels can be resolved to instruction ids
        let mut ids: Vec<InsnId> = Vec::with_capacity(instructions.len());
        for _ in &instructions {
            ids.push(body.instructions.push_back(Instruction::Pop));
        }
        let position = |label: &Label| -> Result<usize, Error> {
            placed.get(label).copied().ok_or(Error::UnplacedLabel(*label))
        };
        let resolve = |label: &Label| -> Result<InsnId, Error> {
            ids.get(position(label)?)
                .copied()
                .ok_or(Error::UnplacedLabel(*label))
        };

        // Exclusive end label to the last instruction before it
        let range = |start: &Label, end: &Label| -> Result<(InsnId, InsnId), Error> {
            let (first, end_position) = (position(start)?, position(end)?);
            if end_position <= first || first >= ids.len() {
                return Err(Error::IllegalRegionRange {
                    first: format!("{:?}", start),
                    last: format!("{:?}", end),
                });
            }
            Ok((ids[first], ids[end_position - 1]))
        };

        for (id, instruction) in ids.iter().zip(&instructions) {
            let mut unresolved = None;
            let resolved = instruction.map_targets(|label| match resolve(label) {
                Ok(insn) => insn,
                Err(_) => {
                    unresolved = Some(*label);
                    *id
                }
            });
            if let Some(label) = unresolved {
                return Err(Error::UnplacedLabel(label));
            }
            body.instructions[*id] = resolved;
        }

        for region in regions {
            let (first, last) = range(&region.start, &region.end)?;
            body.try_catch_blocks.push(TryCatchBlock {
                first,
                last,
                handler: resolve(&region.handler)?,
                exception: region.exception,
            });
        }
        for (start, line) in line_numbers {
            body.line_numbers.push(LineNumber {
                start: resolve(&start)?,
                line,
            });
        }
        for variable in variables {
            let (start, end) = range(&variable.start, &variable.end)?;
            body.local_variables.push(LocalVariable {
                name: variable.name,
                descriptor: variable.descriptor,
                signature: variable.signature,
                start,
                end,
                local: variable.local,
            });
        }

        log::trace!(
            "Built body with {} instructions and {} protected regions",
            body.instructions.len(),
            body.try_catch_blocks.len()
        );
        Ok(body)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{Constant, JvmType, OrdComparison};

    #[test]
    fn loop_with_labels() {
        let mut builder = StackBodyBuilder::new(false, 1);
        let param = builder.parameter_local(0).unwrap();
        let (top, exit) = (builder.fresh_label(), builder.fresh_label());

        builder.place_label(top).unwrap();
        builder.push(Instruction::Load(JvmType::Int, param)).unwrap();
        builder.push(Instruction::If(OrdComparison::LE, exit)).unwrap();
        builder.push(Instruction::Increment(param, -1)).unwrap();
        builder.push(Instruction::Goto(top)).unwrap();
        builder.place_label(exit).unwrap();
        builder.push(Instruction::Return(None)).unwrap();
        builder.line_number(top, 7);

        let body = builder.finish().unwrap();
        let ids: Vec<InsnId> = body.instructions.keys().collect();
        assert_eq!(body.instructions[ids[1]], Instruction::If(OrdComparison::LE, ids[4]));
        assert_eq!(body.instructions[ids[3]], Instruction::Goto(ids[0]));
        assert_eq!(body.line_numbers, vec![LineNumber { start: ids[0], line: 7 }]);
        assert!(body.check_references().is_ok());
    }

    #[test]
    fn regions_have_exclusive_ends() {
        let mut builder = StackBodyBuilder::new(false, 0);
        let labels: Vec<Label> = (0..3).map(|_| builder.fresh_label()).collect();
        builder.place_label(labels[0]).unwrap();
        builder.push(Instruction::Push(Constant::Null)).unwrap();
        builder.push(Instruction::Throw).unwrap();
        builder.place_label(labels[1]).unwrap();
        builder.place_label(labels[2]).unwrap();
        builder.push(Instruction::Throw).unwrap();
        builder.try_catch(labels[0], labels[1], labels[2], None);

        let body = builder.finish().unwrap();
        let ids: Vec<InsnId> = body.instructions.keys().collect();
        assert_eq!(
            body.try_catch_blocks,
            vec![TryCatchBlock {
                first: ids[0],
                last: ids[1],
                handler: ids[2],
                exception: None,
            }]
        );
    }

    #[test]
    fn label_errors() {
        let mut builder = StackBodyBuilder::new(false, 0);
        let label = builder.fresh_label();
        builder.place_label(label).unwrap();
        assert!(matches!(
            builder.place_label(label),
            Err(Error::DuplicateLabel(_))
        ));

        let mut builder = StackBodyBuilder::new(false, 0);
        let nowhere = builder.fresh_label();
        builder.push(Instruction::Goto(nowhere)).unwrap();
        assert!(matches!(builder.finish(), Err(Error::UnplacedLabel(_))));

        let mut builder = StackBodyBuilder::new(false, 0);
        let (start, end) = (builder.fresh_label(), builder.fresh_label());
        builder.place_label(start).unwrap();
        builder.place_label(end).unwrap();
        builder.push(Instruction::Return(None)).unwrap();
        builder.try_catch(start, end, start, None);
        assert!(matches!(
            builder.finish(),
            Err(Error::IllegalRegionRange { .. })
        ));
    }
}
