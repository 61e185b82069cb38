use super::Cfg;
use crate::errors::Error;
use crate::refs::{LocalId, RefBody, StmtId};
use std::collections::{BTreeSet, HashMap};

/// Where the value held by a local may have come from
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum DefSite {
    /// Value passed in when the method was called (receiver or argument)
    Entry,

    /// Exception caught by the protected region with this index
    Caught(usize),

    /// Assignment statement
    Assign(StmtId),
}

pub type DefSet = BTreeSet<DefSite>;

type State = HashMap<LocalId, DefSet>;

fn join_into(target: &mut State, incoming: &State) -> bool {
    let mut changed = false;
    for (local, defs) in incoming {
        let existing = target.entry(*local).or_default();
        for def in defs {
            changed |= existing.insert(*def);
        }
    }
    changed
}

/// Reaching definitions of every local before every reachable statement
///
/// Exceptional edges go from each covered statement (with the state before it) to the handler,
/// with the region's exception local replaced by the caught value.
#[derive(Debug, Default)]
pub struct LocalStates {
    before: HashMap<StmtId, State>,
}

impl LocalStates {
    pub fn compute(body: &RefBody, cfg: &Cfg<StmtId>) -> Result<LocalStates, Error> {
        let mut states = LocalStates::default();
        let mut worklist = vec![];

        if let Some(entry) = cfg.entry() {
            let initial: State = body
                .this_local
                .iter()
                .chain(body.argument_locals.iter())
                .map(|local| (*local, DefSet::from([DefSite::Entry])))
                .collect();
            states.propagate(entry, &initial, &mut worklist);
        }

        while let Some(stmt) = worklist.pop() {
            let mut state = match states.before.get(&stmt) {
                Some(state) => state.clone(),
                None => continue,
            };
            let statement = body
                .statements
                .get(stmt)
                .ok_or_else(|| Error::DanglingReference(stmt.to_string()))?;

            for index in cfg.covering_regions(stmt) {
                let block = &body.try_catch_blocks[index];
                let mut caught = state.clone();
                caught.insert(block.local, DefSet::from([DefSite::Caught(index)]));
                states.propagate(block.handler, &caught, &mut worklist);
            }

            if let Some(local) = statement.assigned_local() {
                state.insert(local, DefSet::from([DefSite::Assign(stmt)]));
            }
            for successor in cfg.successors(stmt) {
                states.propagate(*successor, &state, &mut worklist);
            }
        }

        log::trace!("Computed reaching definitions at {} statements", states.before.len());
        Ok(states)
    }

    fn propagate(&mut self, stmt: StmtId, state: &State, worklist: &mut Vec<StmtId>) {
        match self.before.get_mut(&stmt) {
            None => {
                self.before.insert(stmt, state.clone());
                worklist.push(stmt);
            }
            Some(existing) => {
                if join_into(existing, state) {
                    worklist.push(stmt);
                }
            }
        }
    }

    /// Definitions of a local which may reach a statement (empty if none or unreachable)
    pub fn reaching(&self, stmt: StmtId, local: LocalId) -> DefSet {
        self.before
            .get(&stmt)
            .and_then(|state| state.get(&local))
            .cloned()
            .unwrap_or_default()
    }

    pub fn is_reachable(&self, stmt: StmtId) -> bool {
        self.before.contains_key(&stmt)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::*;
    use crate::refs::{Condition, Expr, Statement, TryCatchBlock};

    #[test]
    fn definitions_through_branches() {
        let mut body = RefBody::new();
        let arg = body.new_local(Some(FieldType::int()));
        let local = body.new_local(None);
        body.argument_locals.push(arg);

        // if (arg == 0) goto else; local = 1; goto join; else: local = 2; join: return local
        let branch = body.push(Statement::Return(None));
        let then = body.push(Statement::assign_local(local, Expr::int(1)));
        let skip = body.push(Statement::Return(None));
        let otherwise = body.push(Statement::assign_local(local, Expr::int(2)));
        let join = body.push(Statement::Return(Some(Expr::local(local))));
        body.statements[branch] = Statement::If {
            condition: Condition {
                comparison: OrdComparison::EQ,
                lhs: Expr::local(arg),
                rhs: Expr::int(0),
            },
            target: otherwise,
        };
        body.statements[skip] = Statement::Goto(join);

        let cfg = Cfg::new(&body).unwrap();
        let states = LocalStates::compute(&body, &cfg).unwrap();
        assert_eq!(
            states.reaching(join, local),
            DefSet::from([DefSite::Assign(then), DefSite::Assign(otherwise)])
        );
        assert_eq!(states.reaching(then, arg), DefSet::from([DefSite::Entry]));
        assert!(states.reaching(branch, local).is_empty());
    }

    #[test]
    fn caught_definitions() {
        let mut body = RefBody::new();
        let local = body.new_local(None);
        let caught = body.new_local(Some(FieldType::object(BinaryName::THROWABLE)));

        let first = body.push(Statement::assign_local(local, Expr::int(1)));
        let last = body.push(Statement::assign_local(local, Expr::int(2)));
        body.push(Statement::Return(None));
        let handler = body.push(Statement::Throw(Expr::local(caught)));
        body.try_catch_blocks.push(TryCatchBlock {
            first,
            last,
            handler,
            exception: None,
            local: caught,
        });

        let cfg = Cfg::new(&body).unwrap();
        let states = LocalStates::compute(&body, &cfg).unwrap();
        assert_eq!(states.reaching(handler, caught), DefSet::from([DefSite::Caught(0)]));

        // Throwing from `last` happens before its assignment completes
        assert_eq!(states.reaching(handler, local), DefSet::from([DefSite::Assign(first)]));
    }
}
