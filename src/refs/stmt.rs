use super::{Expr, Invoke, LocalId};
use crate::jvm::{ArrayElement, FieldRef, OrdComparison};
use crate::util::arena_key;
use std::collections::BTreeMap;

arena_key! {
    /// Identity of a statement in a [`super::RefBody`]
    pub struct StmtId("st");
}

/// Destination of an assignment
#[derive(Clone, PartialEq, Debug)]
pub enum LValue {
    Local(LocalId),
    InstanceField { field: FieldRef, instance: Expr },
    StaticField(FieldRef),
    ArrayElement {
        ty: ArrayElement,
        array: Expr,
        index: Expr,
    },
}

/// Binary comparison guarding a branch
#[derive(Clone, PartialEq, Debug)]
pub struct Condition {
    pub comparison: OrdComparison,
    pub lhs: Expr,
    pub rhs: Expr,
}

/// Statement in a ref body
///
/// Like [`crate::stack::Instruction`], `T` is the type of branch targets.
#[derive(Clone, PartialEq, Debug)]
pub enum Statement<T = StmtId> {
    Assign { target: LValue, value: Expr },

    /// Invoke a method, discarding any return value
    Invoke(Invoke),
    Return(Option<Expr>),
    Throw(Expr),
    MonitorEnter(Expr),
    MonitorExit(Expr),
    Goto(T),
    If { condition: Condition, target: T },
    Switch {
        value: Expr,
        targets: BTreeMap<i32, T>,
        default: T,
    },
}

impl<T> Statement<T> {
    pub fn assign_local(local: LocalId, value: Expr) -> Statement<T> {
        Statement::Assign {
            target: LValue::Local(local),
            value,
        }
    }

    pub fn continues_execution(&self) -> bool {
        !matches!(
            self,
            Statement::Goto(_)
                | Statement::Return(_)
                | Statement::Throw(_)
                | Statement::Switch { .. }
        )
    }

    /// Explicit jump targets (not including fallthrough)
    pub fn branch_targets(&self) -> Vec<&T> {
        match self {
            Statement::Goto(target) | Statement::If { target, .. } => vec![target],
            Statement::Switch {
                targets, default, ..
            } => {
                let mut all: Vec<&T> = targets.values().collect();
                all.push(default);
                all
            }
            _ => vec![],
        }
    }

    pub fn branch_targets_mut(&mut self) -> Vec<&mut T> {
        match self {
            Statement::Goto(target) | Statement::If { target, .. } => vec![target],
            Statement::Switch {
                targets, default, ..
            } => {
                let mut all: Vec<&mut T> = targets.values_mut().collect();
                all.push(default);
                all
            }
            _ => vec![],
        }
    }

    /// Replace every branch target
    pub fn map_targets<U>(&self, mut map_target: impl FnMut(&T) -> U) -> Statement<U> {
        match self {
            Statement::Assign { target, value } => Statement::Assign {
                target: target.clone(),
                value: value.clone(),
            },
            Statement::Invoke(invoke) => Statement::Invoke(invoke.clone()),
            Statement::Return(value) => Statement::Return(value.clone()),
            Statement::Throw(value) => Statement::Throw(value.clone()),
            Statement::MonitorEnter(value) => Statement::MonitorEnter(value.clone()),
            Statement::MonitorExit(value) => Statement::MonitorExit(value.clone()),
            Statement::Goto(target) => Statement::Goto(map_target(target)),
            Statement::If { condition, target } => Statement::If {
                condition: condition.clone(),
                target: map_target(target),
            },
            Statement::Switch {
                value,
                targets,
                default,
            } => Statement::Switch {
                value: value.clone(),
                targets: targets
                    .iter()
                    .map(|(key, target)| (*key, map_target(target)))
                    .collect(),
                default: map_target(default),
            },
        }
    }

    /// Top-level expressions, in evaluation order
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            Statement::Assign { target, value } => {
                let mut operands = match target {
                    LValue::Local(_) | LValue::StaticField(_) => vec![],
                    LValue::InstanceField { instance, .. } => vec![instance],
                    LValue::ArrayElement { array, index, .. } => vec![array, index],
                };
                operands.push(value);
                operands
            }
            Statement::Invoke(invoke) => invoke.operands(),
            Statement::Return(value) => value.iter().collect(),
            Statement::Throw(value)
            | Statement::MonitorEnter(value)
            | Statement::MonitorExit(value)
            | Statement::Switch { value, .. } => vec![value],
            Statement::If { condition, .. } => vec![&condition.lhs, &condition.rhs],
            Statement::Goto(_) => vec![],
        }
    }

    /// Mutable slots of the top-level expressions, in evaluation order
    pub fn operands_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Statement::Assign { target, value } => {
                let mut operands = match target {
                    LValue::Local(_) | LValue::StaticField(_) => vec![],
                    LValue::InstanceField { instance, .. } => vec![instance],
                    LValue::ArrayElement { array, index, .. } => vec![array, index],
                };
                operands.push(value);
                operands
            }
            Statement::Invoke(invoke) => invoke.operands_mut(),
            Statement::Return(value) => value.iter_mut().collect(),
            Statement::Throw(value)
            | Statement::MonitorEnter(value)
            | Statement::MonitorExit(value)
            | Statement::Switch { value, .. } => vec![value],
            Statement::If { condition, .. } => vec![&mut condition.lhs, &mut condition.rhs],
            Statement::Goto(_) => vec![],
        }
    }

    /// Local assigned by the statement, if any
    pub fn assigned_local(&self) -> Option<LocalId> {
        match self {
            Statement::Assign {
                target: LValue::Local(local),
                ..
            } => Some(*local),
            _ => None,
        }
    }

    /// Visit every local read, in evaluation order
    pub fn visit_locals(&self, visit: &mut impl FnMut(LocalId)) {
        for operand in self.operands() {
            operand.visit_locals(visit);
        }
    }

    pub fn reads_local(&self, local: LocalId) -> bool {
        self.operands()
            .into_iter()
            .any(|operand| operand.reads_local(local))
    }

    /// Rename both reads and assignments of a local
    pub fn rename_local(&mut self, from: LocalId, to: LocalId) {
        if let Statement::Assign {
            target: LValue::Local(local),
            ..
        } = self
        {
            if *local == from {
                *local = to;
            }
        }
        for operand in self.operands_mut() {
            operand.rename_local(from, to);
        }
    }

    /// Rename reads of a local, leaving an assignment to it untouched
    pub fn rename_reads(&mut self, from: LocalId, to: LocalId) {
        for operand in self.operands_mut() {
            operand.rename_local(from, to);
        }
    }

    /// Rename the local assigned by the statement (if it is `from`)
    pub fn rename_assignment(&mut self, from: LocalId, to: LocalId) {
        if let Statement::Assign {
            target: LValue::Local(local),
            ..
        } = self
        {
            if *local == from {
                *local = to;
            }
        }
    }
}
