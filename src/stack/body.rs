use super::Instruction;
use crate::errors::Error;
use crate::jvm::{BinaryName, FieldType, UnqualifiedName};
use crate::util::{arena_key, ArenaKey, InsertList};

arena_key! {
    /// Identity of an instruction in a [`StackBody`]
    pub struct InsnId("i");
}

arena_key! {
    /// Untyped local variable slot
    pub struct StackLocal("s");
}

/// Protected region
///
/// The region covers every instruction from `first` to `last` (both inclusive) in body order.
#[derive(Clone, PartialEq, Debug)]
pub struct TryCatchBlock {
    pub first: InsnId,
    pub last: InsnId,
    pub handler: InsnId,

    /// Class of exceptions caught (`None` catches everything)
    pub exception: Option<BinaryName>,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LineNumber {
    pub start: InsnId,
    pub line: u16,
}

/// Debug information about a source-level local variable
#[derive(Clone, PartialEq, Debug)]
pub struct LocalVariable {
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub signature: Option<String>,
    pub start: InsnId,

    /// Last instruction in the scope of the variable (inclusive)
    pub end: InsnId,
    pub local: StackLocal,
}

/// Method body as a sequence of stack machine instructions
#[derive(Clone, Debug, Default)]
pub struct StackBody {
    pub instructions: InsertList<InsnId, Instruction>,
    pub this_local: Option<StackLocal>,
    pub parameter_locals: Vec<StackLocal>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub line_numbers: Vec<LineNumber>,
    pub local_variables: Vec<LocalVariable>,
    local_count: usize,
}

impl StackBody {
    /// Empty body with locals for the receiver (if `has_this`) and each parameter
    pub fn new(has_this: bool, parameter_count: usize) -> StackBody {
        let mut body = StackBody::default();
        if has_this {
            body.this_local = Some(body.new_local());
        }
        for _ in 0..parameter_count {
            let local = body.new_local();
            body.parameter_locals.push(local);
        }
        body
    }

    /// Allocate a fresh local
    pub fn new_local(&mut self) -> StackLocal {
        let local = StackLocal::from_index(self.local_count);
        self.local_count += 1;
        local
    }

    /// Every local allocated so far
    pub fn locals(&self) -> impl Iterator<Item = StackLocal> {
        (0..self.local_count).map(StackLocal::from_index)
    }

    pub fn push(&mut self, instruction: Instruction) -> Result<InsnId, Error> {
        instruction.check()?;
        Ok(self.instructions.push_back(instruction))
    }

    pub fn insert_before(
        &mut self,
        location: InsnId,
        instruction: Instruction,
    ) -> Result<InsnId, Error> {
        instruction.check()?;
        self.instructions
            .insert_before(location, instruction)
            .ok_or_else(|| Error::DanglingReference(location.to_string()))
    }

    pub fn insert_after(
        &mut self,
        location: InsnId,
        instruction: Instruction,
    ) -> Result<InsnId, Error> {
        instruction.check()?;
        self.instructions
            .insert_after(location, instruction)
            .ok_or_else(|| Error::DanglingReference(location.to_string()))
    }

    /// Instructions covered by a protected region
    pub fn region(&self, block: &TryCatchBlock) -> Result<Vec<InsnId>, Error> {
        match self.instructions.range(block.first, block.last) {
            Some(range) => Ok(range.map(|(insn, _)| insn).collect()),
            None => Err(Error::IllegalRegionRange {
                first: block.first.to_string(),
                last: block.last.to_string(),
            }),
        }
    }

    /// Check that everything referred to exists and that region bounds are ordered
    pub fn check_references(&self) -> Result<(), Error> {
        let exists = |insn: &InsnId| -> Result<(), Error> {
            if self.instructions.contains(*insn) {
                Ok(())
            } else {
                Err(Error::DanglingReference(insn.to_string()))
            }
        };
        let local_exists = |local: StackLocal| -> Result<(), Error> {
            if local.index() < self.local_count {
                Ok(())
            } else {
                Err(Error::DanglingReference(local.to_string()))
            }
        };

        for (_, instruction) in self.instructions.iter() {
            for target in instruction.branch_targets() {
                exists(target)?;
            }
            if let Some(local) = instruction.local() {
                local_exists(local)?;
            }
        }
        for block in &self.try_catch_blocks {
            exists(&block.first)?;
            exists(&block.last)?;
            exists(&block.handler)?;
            self.region(block)?;
        }
        for line in &self.line_numbers {
            exists(&line.start)?;
        }
        for variable in &self.local_variables {
            exists(&variable.start)?;
            exists(&variable.end)?;
            local_exists(variable.local)?;
            if self.instructions.range(variable.start, variable.end).is_none() {
                return Err(Error::IllegalRegionRange {
                    first: variable.start.to_string(),
                    last: variable.end.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{Constant, JvmType};

    #[test]
    fn locals_and_insertion() {
        let mut body = StackBody::new(true, 2);
        assert_eq!(body.this_local, Some(StackLocal::from_index(0)));
        assert_eq!(body.parameter_locals.len(), 2);
        let fresh = body.new_local();
        assert_eq!(fresh, StackLocal::from_index(3));
        assert_eq!(body.locals().count(), 4);

        let ret = body.push(Instruction::Return(Some(JvmType::Int))).unwrap();
        let load = body
            .insert_before(ret, Instruction::Load(JvmType::Int, fresh))
            .unwrap();
        body.insert_before(load, Instruction::Push(Constant::Int(1)))
            .unwrap();
        let order: Vec<InsnId> = body.instructions.keys().collect();
        assert_eq!(order[1], load);
        assert_eq!(order[2], ret);
    }

    #[test]
    fn dangling_references() {
        let mut body = StackBody::new(false, 0);
        let first = body.push(Instruction::Push(Constant::Null)).unwrap();
        let throw = body.push(Instruction::Throw).unwrap();
        body.try_catch_blocks.push(TryCatchBlock {
            first: throw,
            last: first,
            handler: first,
            exception: None,
        });
        assert!(matches!(
            body.check_references(),
            Err(Error::IllegalRegionRange { .. })
        ));

        body.try_catch_blocks.clear();
        body.instructions.remove(first);
        body.line_numbers.push(LineNumber {
            start: first,
            line: 3,
        });
        assert!(matches!(
            body.check_references(),
            Err(Error::DanglingReference(_))
        ));
    }
}
