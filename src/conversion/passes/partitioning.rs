use super::PostProcessor;
use crate::analysis::{Cfg, DefSite, LocalStates};
use crate::errors::Error;
use crate::refs::{LocalId, RefBody, RefLocal, StmtId};
use std::collections::{HashMap, HashSet};

/// Split locals into one local per group of connected definitions and uses
///
/// Two definitions of a local are connected when some read can see both of them. Every group
/// gets its own local, except that groups holding the value passed in on entry or the caught
/// exception of a handler keep the original local. Locals left without any use are removed.
pub struct LocalPartitioning;

/// Definition site of a particular local
type Def = (LocalId, DefSite);

/// Union-find forest over definitions
#[derive(Default)]
struct Groups {
    parents: HashMap<Def, Def>,
}

impl Groups {
    fn add(&mut self, def: Def) {
        self.parents.entry(def).or_insert(def);
    }

    fn find(&self, mut def: Def) -> Def {
        while let Some(parent) = self.parents.get(&def) {
            if *parent == def {
                break;
            }
            def = *parent;
        }
        def
    }

    fn union(&mut self, first: Def, second: Def) {
        let (first, second) = (self.find(first), self.find(second));
        if first != second {
            self.parents.insert(second, first);
        }
    }
}

/// Occurrence of a local in a statement, along with one of the definitions it belongs with
enum Occurrence {
    Read(StmtId, Def),
    Assign(StmtId, Def),
}

impl PostProcessor for LocalPartitioning {
    fn name(&self) -> &'static str {
        "local partitioning"
    }

    fn process(&self, body: &mut RefBody) -> Result<(), Error> {
        let cfg = Cfg::new(&*body)?;
        let states = LocalStates::compute(body, &cfg)?;
        let fixed = body.fixed_locals();

        let mut groups = Groups::default();
        let mut occurrences = vec![];
        for stmt in cfg.reachable() {
            let statement = body
                .statements
                .get(*stmt)
                .ok_or_else(|| Error::DanglingReference(stmt.to_string()))?;

            let mut read = vec![];
            statement.visit_locals(&mut |local| {
                if !read.contains(&local) {
                    read.push(local);
                }
            });
            for local in read {
                let defs = states.reaching(*stmt, local);
                let mut defs = defs.into_iter().map(|site| (local, site));
                if let Some(first) = defs.next() {
                    groups.add(first);
                    for other in defs {
                        groups.add(other);
                        groups.union(first, other);
                    }
                    occurrences.push(Occurrence::Read(*stmt, first));
                }
            }

            if let Some(local) = statement.assigned_local() {
                let def = (local, DefSite::Assign(*stmt));
                groups.add(def);
                occurrences.push(Occurrence::Assign(*stmt, def));
            }
        }

        let mut pinned: HashSet<Def> = HashSet::new();
        for local in body.this_local.iter().chain(&body.argument_locals) {
            pinned.insert(groups.find((*local, DefSite::Entry)));
        }
        for (index, block) in body.try_catch_blocks.iter().enumerate() {
            pinned.insert(groups.find((block.local, DefSite::Caught(index))));
        }

        // Decide the local of each group, in body order
        let mut claimed: HashSet<LocalId> = HashSet::new();
        let mut group_locals: HashMap<Def, LocalId> = HashMap::new();
        for occurrence in &occurrences {
            let def = match occurrence {
                Occurrence::Read(_, def) | Occurrence::Assign(_, def) => *def,
            };
            let root = groups.find(def);
            if group_locals.contains_key(&root) {
                continue;
            }
            let original = def.0;
            let local = if pinned.contains(&root)
                || (!fixed.contains(&original) && claimed.insert(original))
            {
                original
            } else {
                let synthetic = body.locals.get(original).map_or(true, |info| info.synthetic);
                let fresh = body.locals.push_back(RefLocal {
                    ty: None,
                    synthetic,
                });
                log::trace!("Splitting {} off {}", fresh, original);
                fresh
            };
            group_locals.insert(root, local);
        }
        let local_of = |def: Def| -> LocalId {
            group_locals
                .get(&groups.find(def))
                .copied()
                .unwrap_or(def.0)
        };

        // Debug entries follow the group of the first occurrence in their scope
        let mut variable_locals = vec![];
        for variable in &body.local_variables {
            let scope: HashSet<StmtId> = body
                .statements
                .range(variable.start, variable.end)
                .map_or_else(HashSet::new, |range| range.map(|(stmt, _)| stmt).collect());
            let local = occurrences
                .iter()
                .find_map(|occurrence| match occurrence {
                    Occurrence::Read(stmt, def) | Occurrence::Assign(stmt, def)
                        if def.0 == variable.local && scope.contains(stmt) =>
                    {
                        Some(local_of(*def))
                    }
                    _ => None,
                })
                .unwrap_or(variable.local);
            variable_locals.push(local);
        }

        let mut renamed = 0;
        for occurrence in &occurrences {
            let (stmt, def) = match occurrence {
                Occurrence::Read(stmt, def) | Occurrence::Assign(stmt, def) => (*stmt, *def),
            };
            let local = local_of(def);
            if local == def.0 {
                continue;
            }
            if let Some(statement) = body.statements.get_mut(stmt) {
                match occurrence {
                    Occurrence::Read(..) => statement.rename_reads(def.0, local),
                    Occurrence::Assign(..) => statement.rename_assignment(def.0, local),
                }
                renamed += 1;
            }
        }
        for (variable, local) in body.local_variables.iter_mut().zip(variable_locals) {
            variable.local = local;
        }

        let mut used: HashSet<LocalId> = fixed;
        for (_, statement) in body.statements.iter() {
            statement.visit_locals(&mut |local| {
                used.insert(local);
            });
            used.extend(statement.assigned_local());
        }
        let unused: Vec<LocalId> = body
            .locals
            .keys()
            .filter(|local| !used.contains(local))
            .collect();
        for local in &unused {
            body.locals.remove(*local);
        }
        body.local_variables
            .retain(|variable| !unused.contains(&variable.local));

        log::debug!(
            "Renamed {} occurrences and removed {} unused locals",
            renamed,
            unused.len()
        );
        Ok(())
    }
}
