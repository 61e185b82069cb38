//! Lowering of ref bodies back into stack bodies
//!
//! Every reachable statement is written out as the instructions evaluating its operands depth
//! first, followed by the instruction consuming them. Unreachable statements are dropped. Caught
//! exceptions arrive on the stack, so handlers start by storing them into their local.

mod writer;

use super::MethodContext;
use crate::analysis::Cfg;
use crate::errors::Error;
use crate::jvm::{BinaryName, FieldType, JvmType};
use crate::refs::{Expr, InferredType, LValue, LocalId, RefBody, Statement, StmtId};
use crate::stack::{Instruction, Label, StackBody, StackBodyBuilder, StackLocal};
use std::collections::HashMap;
use writer::Locals;

pub fn convert(context: &MethodContext, body: &RefBody) -> Result<StackBody, Error> {
    body.check_references()?;
    if context.parameters.len() != body.argument_locals.len() {
        return Err(Error::ParameterCount {
            expected: body.argument_locals.len(),
            found: context.parameters.len(),
        });
    }
    let cfg = Cfg::new(body)?;
    let mut builder = StackBodyBuilder::new(body.this_local.is_some(), body.argument_locals.len());

    let mut slots: HashMap<LocalId, StackLocal> = HashMap::new();
    if let (Some(this), Some(slot)) = (body.this_local, builder.this_local()) {
        slots.insert(this, slot);
    }
    for (index, local) in body.argument_locals.iter().enumerate() {
        if let Some(slot) = builder.parameter_local(index) {
            slots.insert(*local, slot);
        }
    }
    for local in body.locals.keys() {
        slots.entry(local).or_insert_with(|| builder.new_local());
    }
    let locals = Locals::new(local_types(context, body), slots);

    // Every reachable statement is bracketed by a pair of labels
    let mut starts: HashMap<StmtId, Label> = HashMap::new();
    let mut ends: HashMap<StmtId, Label> = HashMap::new();
    for stmt in cfg.reachable() {
        starts.insert(*stmt, builder.fresh_label());
        ends.insert(*stmt, builder.fresh_label());
    }

    // Regions still covering some reachable statement, with the first and last such statement
    let mut live = vec![];
    for block in &body.try_catch_blocks {
        let covered: Vec<StmtId> = body
            .region(block)?
            .into_iter()
            .filter(|stmt| cfg.is_reachable(*stmt))
            .collect();
        match (covered.first(), covered.last()) {
            (Some(first), Some(last)) => live.push((block, *first, *last)),
            _ => log::trace!(
                "Dropping region handled at {} covering only dead code",
                block.handler
            ),
        }
    }

    // A handler only entered by throwing to it, always into the same local, can store the
    // exception right away. Other handlers are entered through a stub per local.
    let mut handler_locals: HashMap<StmtId, Vec<LocalId>> = HashMap::new();
    for (block, _, _) in &live {
        let locals = handler_locals.entry(block.handler).or_default();
        if !locals.contains(&block.local) {
            locals.push(block.local);
        }
    }
    let mut entry_stores: HashMap<StmtId, LocalId> = HashMap::new();
    let mut stubs: Vec<(StmtId, LocalId, Label)> = vec![];
    for (block, _, _) in &live {
        let shared = handler_locals
            .get(&block.handler)
            .map_or(false, |locals| locals.len() == 1);
        if shared && !cfg.has_normal_entry(block.handler) {
            entry_stores.insert(block.handler, block.local);
        } else if !stubs
            .iter()
            .any(|(handler, local, _)| *handler == block.handler && *local == block.local)
        {
            stubs.push((block.handler, block.local, builder.fresh_label()));
        }
    }

    for stmt in cfg.reachable() {
        builder.place_label(label(&starts, *stmt)?)?;
        if let Some(local) = entry_stores.get(stmt) {
            builder.push(Instruction::Store(JvmType::Reference, locals.slot(*local)?))?;
        }
        let statement = body
            .statements
            .get(*stmt)
            .ok_or_else(|| Error::DanglingReference(stmt.to_string()))?;
        let instructions = writer::statement(statement, &locals, &starts)?;
        log::trace!("{} became {} instructions", stmt, instructions.len());
        builder.push_all(instructions)?;
        builder.place_label(label(&ends, *stmt)?)?;
    }
    for (handler, local, stub) in &stubs {
        builder.place_label(*stub)?;
        builder.push(Instruction::Store(JvmType::Reference, locals.slot(*local)?))?;
        builder.push(Instruction::Goto(label(&starts, *handler)?))?;
    }

    for (block, first, last) in &live {
        let handler = match stubs
            .iter()
            .find(|(handler, local, _)| *handler == block.handler && *local == block.local)
        {
            Some((_, _, stub)) => *stub,
            None => label(&starts, block.handler)?,
        };
        builder.try_catch(
            label(&starts, *first)?,
            label(&ends, *last)?,
            handler,
            block.exception.clone(),
        );
    }

    for line in &body.line_numbers {
        match starts.get(&line.start) {
            Some(start) => builder.line_number(*start, line.line),
            None => log::warn!("Dropping line number {} attached to dead code", line.line),
        }
    }
    for variable in &body.local_variables {
        let scope: Vec<StmtId> = body
            .statements
            .range(variable.start, variable.end)
            .ok_or_else(|| Error::IllegalRegionRange {
                first: variable.start.to_string(),
                last: variable.end.to_string(),
            })?
            .map(|(stmt, _)| stmt)
            .filter(|stmt| cfg.is_reachable(*stmt))
            .collect();
        match (scope.first(), scope.last()) {
            (Some(first), Some(last)) => builder.local_variable(
                variable.name.clone(),
                variable.descriptor.clone(),
                variable.signature.clone(),
                label(&starts, *first)?,
                label(&ends, *last)?,
                locals.slot(variable.local)?,
            ),
            _ => log::warn!(
                "Dropping local variable {} scoped over dead code",
                variable.name
            ),
        }
    }

    let converted = builder.finish()?;
    log::debug!(
        "Wrote {} statements as {} instructions ({} handler stubs)",
        cfg.reachable().len(),
        converted.instructions.len(),
        stubs.len()
    );
    Ok(converted)
}

fn label(labels: &HashMap<StmtId, Label>, stmt: StmtId) -> Result<Label, Error> {
    labels
        .get(&stmt)
        .copied()
        .ok_or_else(|| Error::DanglingReference(stmt.to_string()))
}

/// Types of locals, from declarations first and then from the values assigned to them
fn local_types(context: &MethodContext, body: &RefBody) -> HashMap<LocalId, FieldType> {
    let mut types: HashMap<LocalId, FieldType> = HashMap::new();
    for (local, info) in body.locals.iter() {
        if let Some(ty) = &info.ty {
            types.insert(local, ty.clone());
        }
    }
    if let Some(this) = body.this_local {
        types
            .entry(this)
            .or_insert_with(|| FieldType::object(context.owner.clone()));
    }
    for (local, parameter) in body.argument_locals.iter().zip(&context.parameters) {
        types.entry(*local).or_insert_with(|| parameter.clone());
    }
    for block in &body.try_catch_blocks {
        let caught = block.exception.clone().unwrap_or(BinaryName::THROWABLE);
        types
            .entry(block.local)
            .or_insert_with(|| FieldType::object(caught));
    }

    let assignments: Vec<(LocalId, &Expr)> = body
        .statements
        .iter()
        .filter_map(|(_, statement)| match statement {
            Statement::Assign {
                target: LValue::Local(local),
                value,
            } => Some((*local, value)),
            _ => None,
        })
        .collect();
    loop {
        let mut changed = false;
        for (local, value) in &assignments {
            if types.contains_key(local) {
                continue;
            }
            let inferred = value.infer_type(&|read| match types.get(&read) {
                Some(ty) => InferredType::Known(ty.clone()),
                None => InferredType::Unknown,
            });
            let ty = match inferred {
                InferredType::Known(ty) => ty,
                InferredType::Null => FieldType::object(BinaryName::OBJECT),
                InferredType::Unknown => continue,
            };
            types.insert(*local, ty);
            changed = true;
        }
        if !changed {
            break;
        }
    }
    types
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::*;
    use crate::refs::{Condition, TryCatchBlock};
    use crate::stack::InsnId;
    use crate::util::ArenaKey;

    fn context(parameters: Vec<FieldType>) -> MethodContext {
        MethodContext::new(BinaryName::from_str("demo/Main").unwrap(), parameters)
    }

    fn instructions(body: &StackBody) -> Vec<Instruction> {
        body.instructions
            .iter()
            .map(|(_, instruction)| instruction.clone())
            .collect()
    }

    #[test]
    fn dead_statements_are_dropped() {
        let mut body = RefBody::new();
        let arg = body.new_local(None);
        body.argument_locals.push(arg);
        body.push(Statement::Return(Some(Expr::local(arg))));
        body.push(Statement::Return(Some(Expr::int(9))));

        let converted = convert(&context(vec![FieldType::long()]), &body).unwrap();
        assert_eq!(
            instructions(&converted),
            vec![
                Instruction::Load(JvmType::Long, StackLocal::from_index(0)),
                Instruction::Return(Some(JvmType::Long)),
            ]
        );
    }

    #[test]
    fn handlers_store_their_exception() {
        // try { tick() } catch (l0) { throw l0 }
        let tick = MethodRef {
            owner: BinaryName::from_str("demo/Main").unwrap(),
            name: UnqualifiedName::from_str("tick").unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            is_interface: false,
        };
        let mut body = RefBody::new();
        let caught = body.new_local(None);
        let call = body.push(Statement::Invoke(crate::refs::Invoke {
            target: crate::refs::InvokeTarget::Method(InvokeType::Static, tick.clone()),
            receiver: None,
            arguments: vec![],
        }));
        body.push(Statement::Return(None));
        let handler = body.push(Statement::Throw(Expr::local(caught)));
        body.try_catch_blocks.push(TryCatchBlock {
            first: call,
            last: call,
            handler,
            exception: None,
            local: caught,
        });

        let converted = convert(&context(vec![]), &body).unwrap();
        let slot = StackLocal::from_index(0);
        assert_eq!(
            instructions(&converted),
            vec![
                Instruction::Invoke(InvokeType::Static, tick),
                Instruction::Return(None),
                Instruction::Store(JvmType::Reference, slot),
                Instruction::Load(JvmType::Reference, slot),
                Instruction::Throw,
            ]
        );
        let region = &converted.try_catch_blocks[0];
        let ids: Vec<InsnId> = converted.instructions.keys().collect();
        assert_eq!((region.first, region.last, region.handler), (ids[0], ids[0], ids[2]));
    }

    #[test]
    fn shared_handlers_get_stubs() {
        // Two regions throw into the same handler but catch into different locals
        let mut body = RefBody::new();
        let arg = body.new_local(Some(FieldType::object(BinaryName::OBJECT)));
        let first = body.new_local(None);
        let second = body.new_local(None);
        body.argument_locals.push(arg);

        let monitor = body.push(Statement::MonitorEnter(Expr::local(arg)));
        let exit = body.push(Statement::MonitorExit(Expr::local(arg)));
        body.push(Statement::Return(None));
        let handler = body.push(Statement::Return(None));
        for (stmt, local) in [(monitor, first), (exit, second)] {
            body.try_catch_blocks.push(TryCatchBlock {
                first: stmt,
                last: stmt,
                handler,
                exception: None,
                local,
            });
        }

        let converted = convert(&context(vec![FieldType::object(BinaryName::OBJECT)]), &body)
            .unwrap();
        let listing = instructions(&converted);
        assert_eq!(listing.len(), 6 + 2 * 2);
        assert_eq!(
            listing[6],
            Instruction::Store(JvmType::Reference, StackLocal::from_index(1))
        );
        assert_eq!(
            listing[8],
            Instruction::Store(JvmType::Reference, StackLocal::from_index(2))
        );

        let ids: Vec<InsnId> = converted.instructions.keys().collect();
        let handlers: Vec<InsnId> = converted
            .try_catch_blocks
            .iter()
            .map(|block| block.handler)
            .collect();
        assert_eq!(handlers, vec![ids[6], ids[8]]);
        assert_eq!(converted.instructions[ids[7]], Instruction::Goto(ids[5]));
    }

    #[test]
    fn conditions_target_statements() {
        let mut body = RefBody::new();
        let arg = body.new_local(Some(FieldType::int()));
        body.argument_locals.push(arg);
        let branch = body.push(Statement::Return(None));
        body.push(Statement::Return(Some(Expr::int(0))));
        let other = body.push(Statement::Return(Some(Expr::local(arg))));
        body.statements[branch] = Statement::If {
            condition: Condition {
                comparison: OrdComparison::GT,
                lhs: Expr::local(arg),
                rhs: Expr::int(0),
            },
            target: other,
        };

        let converted = convert(&context(vec![FieldType::int()]), &body).unwrap();
        let ids: Vec<InsnId> = converted.instructions.keys().collect();
        assert_eq!(
            converted.instructions[ids[1]],
            Instruction::If(OrdComparison::GT, ids[4])
        );
    }

    #[test]
    fn untyped_locals_fail() {
        let mut body = RefBody::new();
        let local = body.new_local(None);
        body.push(Statement::Return(Some(Expr::local(local))));
        assert!(matches!(
            convert(&context(vec![]), &body),
            Err(Error::UntypedLocal(_))
        ));
        assert!(matches!(
            convert(&context(vec![FieldType::int()]), &body),
            Err(Error::ParameterCount {
                expected: 0,
                found: 1
            })
        ));
    }
}
