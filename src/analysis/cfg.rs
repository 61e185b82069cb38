use crate::errors::Error;
use crate::refs::{RefBody, StmtId};
use crate::stack::{InsnId, StackBody};
use crate::util::ArenaKey;
use std::collections::{HashMap, HashSet};

/// Node-level view of a body's control flow
///
/// Implemented by both [`StackBody`] (nodes are instructions) and [`RefBody`] (nodes are
/// statements).
pub trait ControlFlow {
    type Node: ArenaKey;

    /// First node executed
    fn entry(&self) -> Option<Self::Node>;

    /// All nodes in body order
    fn nodes(&self) -> Vec<Self::Node>;

    /// Structurally next node
    fn next_node(&self, node: Self::Node) -> Option<Self::Node>;

    fn continues_execution(&self, node: Self::Node) -> bool;

    fn branch_targets(&self, node: Self::Node) -> Vec<Self::Node>;

    /// Protected regions as the list of nodes covered and the handler node
    fn regions(&self) -> Result<Vec<(Vec<Self::Node>, Self::Node)>, Error>;

    /// Render a node for error messages
    fn describe(&self, node: Self::Node) -> String;

    /// Fallthrough (if execution continues) followed by explicit branch targets
    fn successors(&self, node: Self::Node) -> Result<Vec<Self::Node>, Error> {
        let mut successors = vec![];
        if self.continues_execution(node) {
            match self.next_node(node) {
                Some(next) => successors.push(next),
                None => {
                    return Err(Error::UnexpectedEnd {
                        instruction: self.describe(node),
                    })
                }
            }
        }
        for target in self.branch_targets(node) {
            if !successors.contains(&target) {
                successors.push(target);
            }
        }
        Ok(successors)
    }
}

impl ControlFlow for StackBody {
    type Node = InsnId;

    fn entry(&self) -> Option<InsnId> {
        self.instructions.first()
    }

    fn nodes(&self) -> Vec<InsnId> {
        self.instructions.keys().collect()
    }

    fn next_node(&self, node: InsnId) -> Option<InsnId> {
        self.instructions.next(node)
    }

    fn continues_execution(&self, node: InsnId) -> bool {
        self.instructions
            .get(node)
            .map_or(false, |insn| insn.continues_execution())
    }

    fn branch_targets(&self, node: InsnId) -> Vec<InsnId> {
        self.instructions.get(node).map_or(vec![], |insn| {
            insn.branch_targets().into_iter().copied().collect()
        })
    }

    fn regions(&self) -> Result<Vec<(Vec<InsnId>, InsnId)>, Error> {
        self.try_catch_blocks
            .iter()
            .map(|block| Ok((self.region(block)?, block.handler)))
            .collect()
    }

    fn describe(&self, node: InsnId) -> String {
        match self.instructions.get(node) {
            Some(insn) => format!("{}: {:?}", node, insn),
            None => node.to_string(),
        }
    }
}

impl ControlFlow for RefBody {
    type Node = StmtId;

    fn entry(&self) -> Option<StmtId> {
        self.statements.first()
    }

    fn nodes(&self) -> Vec<StmtId> {
        self.statements.keys().collect()
    }

    fn next_node(&self, node: StmtId) -> Option<StmtId> {
        self.statements.next(node)
    }

    fn continues_execution(&self, node: StmtId) -> bool {
        self.statements
            .get(node)
            .map_or(false, |stmt| stmt.continues_execution())
    }

    fn branch_targets(&self, node: StmtId) -> Vec<StmtId> {
        self.statements.get(node).map_or(vec![], |stmt| {
            stmt.branch_targets().into_iter().copied().collect()
        })
    }

    fn regions(&self) -> Result<Vec<(Vec<StmtId>, StmtId)>, Error> {
        self.try_catch_blocks
            .iter()
            .map(|block| Ok((self.region(block)?, block.handler)))
            .collect()
    }

    fn describe(&self, node: StmtId) -> String {
        match self.statements.get(node) {
            Some(stmt) => format!("{}: {}", node, stmt),
            None => node.to_string(),
        }
    }
}

/// Protected region resolved to nodes
#[derive(Clone, Debug)]
pub struct Region<N> {
    pub covered: Vec<N>,
    pub handler: N,
}

/// Control flow graph of the reachable part of a body
///
/// Handlers are entry points too, but only once some node in one of their regions is reachable.
#[derive(Debug)]
pub struct Cfg<N> {
    order: Vec<N>,
    reachable: HashSet<N>,
    successors: HashMap<N, Vec<N>>,
    predecessors: HashMap<N, Vec<N>>,
    regions: Vec<Region<N>>,
    entry: Option<N>,
}

impl<N: ArenaKey> Cfg<N> {
    pub fn new<B: ControlFlow<Node = N>>(body: &B) -> Result<Cfg<N>, Error> {
        let regions: Vec<Region<N>> = body
            .regions()?
            .into_iter()
            .map(|(covered, handler)| Region { covered, handler })
            .collect();
        let entry = body.entry();

        let mut reachable: HashSet<N> = HashSet::new();
        let mut successors: HashMap<N, Vec<N>> = HashMap::new();
        let mut worklist: Vec<N> = entry.into_iter().collect();
        loop {
            while let Some(node) = worklist.pop() {
                if !reachable.insert(node) {
                    continue;
                }
                let node_successors = body.successors(node)?;
                worklist.extend(node_successors.iter().copied());
                successors.insert(node, node_successors);
            }

            // Handlers become live once something they protect is live
            for region in &regions {
                if !reachable.contains(&region.handler)
                    && region.covered.iter().any(|node| reachable.contains(node))
                {
                    worklist.push(region.handler);
                }
            }
            if worklist.is_empty() {
                break;
            }
        }

        let order: Vec<N> = body
            .nodes()
            .into_iter()
            .filter(|node| reachable.contains(node))
            .collect();
        let mut predecessors: HashMap<N, Vec<N>> = HashMap::new();
        for node in &order {
            for successor in successors.get(node).into_iter().flatten() {
                predecessors.entry(*successor).or_default().push(*node);
            }
        }

        Ok(Cfg {
            order,
            reachable,
            successors,
            predecessors,
            regions,
            entry,
        })
    }

    pub fn entry(&self) -> Option<N> {
        self.entry
    }

    pub fn is_reachable(&self, node: N) -> bool {
        self.reachable.contains(&node)
    }

    /// Reachable nodes, in body order
    pub fn reachable(&self) -> &[N] {
        &self.order
    }

    pub fn successors(&self, node: N) -> &[N] {
        self.successors.get(&node).map_or(&[], |nodes| nodes.as_slice())
    }

    /// Predecessors along normal (non-exceptional) edges
    pub fn predecessors(&self, node: N) -> &[N] {
        self.predecessors
            .get(&node)
            .map_or(&[], |nodes| nodes.as_slice())
    }

    /// Does control reach the node other than by throwing to it?
    ///
    /// The entry node is entered by the method being called.
    pub fn has_normal_entry(&self, node: N) -> bool {
        self.entry == Some(node) || !self.predecessors(node).is_empty()
    }

    pub fn regions(&self) -> &[Region<N>] {
        &self.regions
    }

    /// Handlers that catch exceptions thrown from a node
    pub fn handlers_of(&self, node: N) -> Vec<N> {
        self.regions
            .iter()
            .filter(|region| region.covered.contains(&node))
            .map(|region| region.handler)
            .collect()
    }

    /// Indices of regions covering a node
    pub fn covering_regions(&self, node: N) -> Vec<usize> {
        self.regions
            .iter()
            .enumerate()
            .filter(|(_, region)| region.covered.contains(&node))
            .map(|(index, _)| index)
            .collect()
    }

    pub fn is_handler(&self, node: N) -> bool {
        self.regions.iter().any(|region| region.handler == node)
    }
}
