use super::PostProcessor;
use crate::errors::Error;
use crate::refs::{Effects, Expr, LValue, LocalId, RefBody, Statement, StmtId};
use std::collections::{HashMap, HashSet};

/// Fold a temporary back into the statement right after its assignment
///
/// A temporary qualifies when it was introduced by the conversion, is assigned once, and is read
/// once in the very next statement. The next statement must not be a jump target or handler, and
/// both statements must be covered by the same protected regions. If the folded expression has
/// effects, nothing with effects may be evaluated before the read inside the using statement.
///
/// ```text
/// l3 = l0.size()          return l0.size()
/// return l3          =>
/// ```
pub struct DirectReuseInlining;

impl PostProcessor for DirectReuseInlining {
    fn name(&self) -> &'static str {
        "direct reuse inlining"
    }

    fn process(&self, body: &mut RefBody) -> Result<(), Error> {
        let mut inlined = 0;
        while let Some((assignment, local, user)) = find_candidate(body) {
            inline(body, assignment, local, user)?;
            inlined += 1;
        }
        log::debug!("Inlined {} temporaries", inlined);
        Ok(())
    }
}

/// Effects of evaluation which happens before the first read of `local`, if there is a read
fn effects_before_read<'a>(
    operands: impl IntoIterator<Item = &'a Expr>,
    local: LocalId,
) -> Option<Effects> {
    let mut before = Effects::empty();
    for operand in operands {
        if let Expr::Local(read) = operand {
            if *read == local {
                return Some(before);
            }
        }
        if let Some(inner) = effects_before_read(operand.operands(), local) {
            return Some(before | inner);
        }
        before |= operand.effects();
    }
    None
}

fn find_candidate(body: &RefBody) -> Option<(StmtId, LocalId, StmtId)> {
    let mut assignments: HashMap<LocalId, usize> = HashMap::new();
    let mut reads: HashMap<LocalId, usize> = HashMap::new();
    let mut targets: HashSet<StmtId> = HashSet::new();
    for (_, statement) in body.statements.iter() {
        if let Some(local) = statement.assigned_local() {
            *assignments.entry(local).or_default() += 1;
        }
        statement.visit_locals(&mut |local| *reads.entry(local).or_default() += 1);
        targets.extend(statement.branch_targets().into_iter().copied());
    }
    targets.extend(body.try_catch_blocks.iter().map(|block| block.handler));
    let fixed = body.fixed_locals();

    let covering = |stmt: StmtId| -> Vec<usize> {
        body.try_catch_blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| {
                body.region(block)
                    .map_or(false, |covered| covered.contains(&stmt))
            })
            .map(|(index, _)| index)
            .collect()
    };

    for (assignment, statement) in body.statements.iter() {
        let (local, value) = match statement {
            Statement::Assign {
                target: LValue::Local(local),
                value,
            } => (*local, value),
            _ => continue,
        };
        let is_temporary = body.locals.get(local).map_or(false, |info| info.synthetic)
            && !fixed.contains(&local);
        if !is_temporary
            || assignments.get(&local) != Some(&1)
            || reads.get(&local) != Some(&1)
            || value.reads_local(local)
        {
            continue;
        }

        let user = match body.statements.next(assignment) {
            Some(user) => user,
            None => continue,
        };
        if targets.contains(&user) || covering(assignment) != covering(user) {
            continue;
        }
        let before = match body
            .statements
            .get(user)
            .and_then(|statement| effects_before_read(statement.operands(), local))
        {
            Some(before) => before,
            None => continue,
        };
        if !value.effects().commutes_with(before) {
            continue;
        }

        log::trace!("Inlining {} from {} into {}", local, assignment, user);
        return Some((assignment, local, user));
    }
    None
}

fn inline(
    body: &mut RefBody,
    assignment: StmtId,
    local: LocalId,
    user: StmtId,
) -> Result<(), Error> {
    let value = match body.statements.remove(assignment) {
        Some(Statement::Assign { value, .. }) => value,
        _ => return Err(Error::DanglingReference(assignment.to_string())),
    };
    let statement = body
        .statements
        .get_mut(user)
        .ok_or_else(|| Error::DanglingReference(user.to_string()))?;
    let mut replacement = Some(value);
    for operand in statement.operands_mut() {
        if let Some(value) = replacement.take() {
            replacement = operand.substitute_local(local, value);
        }
    }
    if replacement.is_some() {
        return Err(Error::DanglingReference(local.to_string()));
    }
    body.locals.remove(local);

    let retarget = |stmt: &mut StmtId| {
        if *stmt == assignment {
            *stmt = user;
        }
    };
    let stmts: Vec<StmtId> = body.statements.keys().collect();
    for stmt in stmts {
        if let Some(statement) = body.statements.get_mut(stmt) {
            for target in statement.branch_targets_mut() {
                retarget(target);
            }
        }
    }
    for block in &mut body.try_catch_blocks {
        retarget(&mut block.first);
        retarget(&mut block.last);
        retarget(&mut block.handler);
    }
    for line in &mut body.line_numbers {
        retarget(&mut line.start);
    }
    for variable in &mut body.local_variables {
        retarget(&mut variable.start);
        retarget(&mut variable.end);
    }
    Ok(())
}
