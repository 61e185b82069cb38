use super::PostProcessor;
use crate::errors::Error;
use crate::jvm::{BinaryName, FieldType, JvmType};
use crate::refs::{Expr, InferredType, LocalId, RefBody};
use std::collections::{HashMap, HashSet};

/// Give every untyped local the type of the values assigned to it
///
/// Types of assigned values are joined: `int`-like primitives join to `int`, distinct reference
/// types to `java/lang/Object`, and `null` to whatever reference type it meets (or
/// `java/lang/Object` on its own). Anything else is a unification error. Locals fixed from
/// outside the body (`this`, arguments, caught exceptions) keep their types.
pub struct LocalTyping;

fn render(ty: &InferredType) -> String {
    match ty {
        InferredType::Known(ty) => ty.to_string(),
        InferredType::Null => String::from("null"),
        InferredType::Unknown => String::from("unknown"),
    }
}

fn is_int_like(ty: &FieldType) -> bool {
    matches!(ty, FieldType::Base(base) if JvmType::from(*base) == JvmType::Int)
}

fn join(
    local: LocalId,
    first: &InferredType,
    second: &InferredType,
) -> Result<InferredType, Error> {
    use InferredType::*;

    let joined = match (first, second) {
        (Unknown, other) | (other, Unknown) => other.clone(),
        (Null, Null) => Null,
        (Null, Known(ty @ FieldType::Ref(_))) | (Known(ty @ FieldType::Ref(_)), Null) => {
            Known(ty.clone())
        }
        (Known(first), Known(second)) if first == second => Known(first.clone()),
        (Known(first), Known(second)) if is_int_like(first) && is_int_like(second) => {
            Known(FieldType::int())
        }
        (Known(FieldType::Ref(_)), Known(FieldType::Ref(_))) => {
            Known(FieldType::object(BinaryName::OBJECT))
        }
        _ => {
            return Err(Error::TypeUnification {
                local,
                first: render(first),
                second: render(second),
            })
        }
    };
    Ok(joined)
}

impl PostProcessor for LocalTyping {
    fn name(&self) -> &'static str {
        "local typing"
    }

    fn process(&self, body: &mut RefBody) -> Result<(), Error> {
        let fixed = body.fixed_locals();
        let mut types: HashMap<LocalId, InferredType> = HashMap::new();
        let mut pending: Vec<LocalId> = vec![];
        for (local, info) in body.locals.iter() {
            match &info.ty {
                Some(ty) => {
                    types.insert(local, InferredType::Known(ty.clone()));
                }
                None if !fixed.contains(&local) => pending.push(local),
                None => (),
            }
        }

        let mut referenced: HashSet<LocalId> = HashSet::new();
        let mut assignments: Vec<(LocalId, &Expr)> = vec![];
        for (_, statement) in body.statements.iter() {
            statement.visit_locals(&mut |local| {
                referenced.insert(local);
            });
            if let Some(local) = statement.assigned_local() {
                referenced.insert(local);
                if pending.contains(&local) {
                    if let Some(value) = statement.operands().last() {
                        assignments.push((local, *value));
                    }
                }
            }
        }

        // Types only move up the lattice, so this terminates
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for (local, value) in &assignments {
                let inferred = value.infer_type(&|read| {
                    types.get(&read).cloned().unwrap_or(InferredType::Unknown)
                });
                let current = types
                    .get(local)
                    .cloned()
                    .unwrap_or(InferredType::Unknown);
                let joined = join(*local, &current, &inferred)?;
                if joined != current {
                    types.insert(*local, joined);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        log::trace!("Local types settled after {} rounds", rounds);

        let mut typed = 0;
        for local in pending {
            let ty = match types.remove(&local) {
                Some(InferredType::Known(ty)) => ty,
                Some(InferredType::Null) => FieldType::object(BinaryName::OBJECT),
                Some(InferredType::Unknown) | None if referenced.contains(&local) => {
                    return Err(Error::UntypedLocal(local))
                }
                _ => {
                    body.locals.remove(local);
                    continue;
                }
            };
            body.locals[local].ty = Some(ty);
            typed += 1;
        }
        log::debug!("Typed {} locals", typed);
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::*;
    use crate::refs::Statement;
    use crate::util::ArenaKey;

    #[test]
    fn joined_types() {
        let local = LocalId::from_index(0);
        let string = InferredType::Known(FieldType::object(BinaryName::STRING));
        let object = InferredType::Known(FieldType::object(BinaryName::OBJECT));
        let boolean = InferredType::Known(FieldType::boolean());
        let int = InferredType::Known(FieldType::int());

        assert_eq!(join(local, &InferredType::Null, &string).unwrap(), string);
        assert_eq!(join(local, &string, &object).unwrap(), object);
        assert_eq!(join(local, &boolean, &int).unwrap(), int);
        assert_eq!(join(local, &InferredType::Unknown, &boolean).unwrap(), boolean);
        assert!(matches!(
            join(local, &int, &string),
            Err(Error::TypeUnification { .. })
        ));
        assert!(matches!(
            join(local, &InferredType::Null, &int),
            Err(Error::TypeUnification { .. })
        ));
    }

    #[test]
    fn types_flow_through_copies() {
        let mut body = RefBody::new();
        let arg = body.new_local(Some(FieldType::long()));
        let first = body.new_local(None);
        let second = body.new_local(None);
        let nothing = body.new_local(None);
        let unused = body.new_synthetic_local();
        body.argument_locals.push(arg);

        // `second` is only typed once its own assignment has been seen
        body.push(Statement::assign_local(first, Expr::local(second)));
        body.push(Statement::assign_local(second, Expr::local(arg)));
        body.push(Statement::assign_local(nothing, Expr::Const(Constant::Null)));
        body.push(Statement::Return(Some(Expr::local(first))));

        LocalTyping.process(&mut body).unwrap();
        assert_eq!(body.locals[first].ty, Some(FieldType::long()));
        assert_eq!(body.locals[second].ty, Some(FieldType::long()));
        assert_eq!(
            body.locals[nothing].ty,
            Some(FieldType::object(BinaryName::OBJECT))
        );
        assert!(!body.locals.contains(unused));
    }

    #[test]
    fn mixed_assignments_fail() {
        let mut body = RefBody::new();
        let local = body.new_local(None);
        body.push(Statement::assign_local(local, Expr::int(1)));
        body.push(Statement::assign_local(local, Expr::Const(Constant::Long(1))));
        body.push(Statement::Return(None));
        assert!(matches!(
            LocalTyping.process(&mut body),
            Err(Error::TypeUnification { .. })
        ));

        let mut body = RefBody::new();
        let local = body.new_local(None);
        body.push(Statement::Return(Some(Expr::local(local))));
        assert!(matches!(
            LocalTyping.process(&mut body),
            Err(Error::UntypedLocal(_))
        ));
    }
}
