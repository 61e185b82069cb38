use super::{LocalId, Statement, StmtId};
use crate::errors::Error;
use crate::jvm::{BinaryName, FieldType, UnqualifiedName};
use crate::util::InsertList;
use std::collections::HashSet;

#[derive(Clone, PartialEq, Debug, Default)]
pub struct RefLocal {
    /// Declared type (`None` until typing assigns one)
    pub ty: Option<FieldType>,

    /// Introduced during conversion rather than mirroring a local of the input
    pub synthetic: bool,
}

/// Protected region
///
/// The region covers every statement from `first` to `last` (both inclusive). When the handler is
/// entered, the caught exception is in `local`.
#[derive(Clone, PartialEq, Debug)]
pub struct TryCatchBlock {
    pub first: StmtId,
    pub last: StmtId,
    pub handler: StmtId,
    pub exception: Option<BinaryName>,
    pub local: LocalId,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LineNumber {
    pub start: StmtId,
    pub line: u16,
}

#[derive(Clone, PartialEq, Debug)]
pub struct LocalVariable {
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
    pub signature: Option<String>,
    pub start: StmtId,

    /// Last statement in the scope (inclusive)
    pub end: StmtId,
    pub local: LocalId,
}

/// Method body as a sequence of statements over expression trees
#[derive(Clone, Debug, Default)]
pub struct RefBody {
    pub statements: InsertList<StmtId, Statement>,
    pub locals: InsertList<LocalId, RefLocal>,
    pub this_local: Option<LocalId>,
    pub argument_locals: Vec<LocalId>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub line_numbers: Vec<LineNumber>,
    pub local_variables: Vec<LocalVariable>,
}

impl RefBody {
    pub fn new() -> RefBody {
        RefBody::default()
    }

    pub fn new_local(&mut self, ty: Option<FieldType>) -> LocalId {
        self.locals.push_back(RefLocal {
            ty,
            synthetic: false,
        })
    }

    /// Fresh temporary local, not corresponding to any source local
    pub fn new_synthetic_local(&mut self) -> LocalId {
        self.locals.push_back(RefLocal {
            ty: None,
            synthetic: true,
        })
    }

    pub fn push(&mut self, statement: Statement) -> StmtId {
        self.statements.push_back(statement)
    }

    /// Locals whose value on entry to the method or a handler is fixed from outside the body
    pub fn fixed_locals(&self) -> HashSet<LocalId> {
        self.this_local
            .iter()
            .chain(self.argument_locals.iter())
            .copied()
            .chain(self.try_catch_blocks.iter().map(|block| block.local))
            .collect()
    }

    /// Statements covered by a protected region
    pub fn region(&self, block: &TryCatchBlock) -> Result<Vec<StmtId>, Error> {
        match self.statements.range(block.first, block.last) {
            Some(range) => Ok(range.map(|(stmt, _)| stmt).collect()),
            None => Err(Error::IllegalRegionRange {
                first: block.first.to_string(),
                last: block.last.to_string(),
            }),
        }
    }

    /// Check that everything referred to exists and that region bounds are ordered
    pub fn check_references(&self) -> Result<(), Error> {
        let exists = |stmt: &StmtId| -> Result<(), Error> {
            if self.statements.contains(*stmt) {
                Ok(())
            } else {
                Err(Error::DanglingReference(stmt.to_string()))
            }
        };
        let local_exists = |local: LocalId| -> Result<(), Error> {
            if self.locals.contains(local) {
                Ok(())
            } else {
                Err(Error::DanglingReference(local.to_string()))
            }
        };

        for (_, statement) in self.statements.iter() {
            for target in statement.branch_targets() {
                exists(target)?;
            }
            let mut missing = None;
            statement.visit_locals(&mut |local| {
                if missing.is_none() && !self.locals.contains(local) {
                    missing = Some(local);
                }
            });
            for local in statement.assigned_local().into_iter().chain(missing) {
                local_exists(local)?;
            }
        }
        for local in self.this_local.iter().chain(&self.argument_locals) {
            local_exists(*local)?;
        }
        for block in &self.try_catch_blocks {
            exists(&block.first)?;
            exists(&block.last)?;
            exists(&block.handler)?;
            local_exists(block.local)?;
            self.region(block)?;
        }
        for line in &self.line_numbers {
            exists(&line.start)?;
        }
        for variable in &self.local_variables {
            exists(&variable.start)?;
            exists(&variable.end)?;
            local_exists(variable.local)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::refs::Expr;

    #[test]
    fn fixed_locals() {
        let mut body = RefBody::new();
        let this = body.new_local(Some(FieldType::object(BinaryName::OBJECT)));
        let arg = body.new_local(Some(FieldType::int()));
        let caught = body.new_local(Some(FieldType::object(BinaryName::THROWABLE)));
        let temp = body.new_synthetic_local();
        body.this_local = Some(this);
        body.argument_locals.push(arg);

        let first = body.push(Statement::assign_local(temp, Expr::local(arg)));
        let handler = body.push(Statement::Throw(Expr::local(caught)));
        body.try_catch_blocks.push(TryCatchBlock {
            first,
            last: first,
            handler,
            exception: None,
            local: caught,
        });

        let fixed = body.fixed_locals();
        assert!(fixed.contains(&this) && fixed.contains(&arg) && fixed.contains(&caught));
        assert!(!fixed.contains(&temp));
        assert!(body.locals[temp].synthetic);
        assert!(body.check_references().is_ok());

        body.locals.remove(temp);
        assert!(matches!(
            body.check_references(),
            Err(Error::DanglingReference(_))
        ));
    }

    #[test]
    fn reads_are_checked_alongside_assignments() {
        let mut body = RefBody::new();
        let kept = body.new_local(Some(FieldType::int()));
        let dropped = body.new_local(Some(FieldType::int()));
        body.push(Statement::assign_local(kept, Expr::local(dropped)));
        assert!(body.check_references().is_ok());

        body.locals.remove(dropped);
        match body.check_references() {
            Err(Error::DanglingReference(name)) => assert_eq!(name, dropped.to_string()),
            other => panic!("expected a dangling read, got {:?}", other),
        }
    }
}
