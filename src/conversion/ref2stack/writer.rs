use crate::errors::Error;
use crate::jvm::*;
use crate::refs::{
    BinaryOp, Cast, Condition, Expr, InferredType, Invoke, InvokeTarget, LValue, LocalId,
    Statement, StmtId,
};
use crate::stack::{Instruction, Label, StackLocal};
use crate::util::Width;
use std::collections::{BTreeMap, HashMap};
use std::convert::TryFrom;

/// Types and stack locals of the ref locals being written out
pub struct Locals {
    /// Precise type of every local whose type could be determined
    types: HashMap<LocalId, FieldType>,

    /// Stack local standing in for each ref local
    slots: HashMap<LocalId, StackLocal>,
}

impl Locals {
    pub fn new(types: HashMap<LocalId, FieldType>, slots: HashMap<LocalId, StackLocal>) -> Locals {
        Locals { types, slots }
    }

    pub fn inferred(&self, local: LocalId) -> InferredType {
        match self.types.get(&local) {
            Some(ty) => InferredType::Known(ty.clone()),
            None => InferredType::Unknown,
        }
    }

    pub fn jvm_type(&self, local: LocalId) -> Result<JvmType, Error> {
        self.types
            .get(&local)
            .map(JvmType::from)
            .ok_or(Error::UntypedLocal(local))
    }

    pub fn slot(&self, local: LocalId) -> Result<StackLocal, Error> {
        self.slots
            .get(&local)
            .copied()
            .ok_or_else(|| Error::DanglingReference(local.to_string()))
    }
}

/// Coarse type of the value of an expression
fn value_type(expr: &Expr, locals: &Locals) -> Result<JvmType, Error> {
    match expr.jvm_type(&|local| locals.inferred(local)) {
        Some(ty) => Ok(ty),
        None => match expr {
            Expr::Local(local) => Err(Error::UntypedLocal(*local)),
            other => Err(Error::UnsupportedOperand {
                operand: other.to_string(),
                expected: "an expression of known type",
            }),
        },
    }
}

fn invocation<T>(
    invoke: &Invoke,
    locals: &Locals,
    out: &mut Vec<Instruction<T>>,
) -> Result<(), Error> {
    for operand in invoke.operands() {
        expression(operand, locals, out)?;
    }
    out.push(match &invoke.target {
        InvokeTarget::Method(invoke_type, method) => {
            Instruction::Invoke(*invoke_type, method.clone())
        }
        InvokeTarget::Dynamic(call_site) => Instruction::InvokeDynamic(call_site.clone()),
    });
    Ok(())
}

/// Instructions evaluating an expression, leaving its value on top of the stack
///
/// Operands are evaluated left to right, depth first.
pub fn expression<T>(
    expr: &Expr,
    locals: &Locals,
    out: &mut Vec<Instruction<T>>,
) -> Result<(), Error> {
    let instruction = match expr {
        Expr::Const(constant) => Instruction::Push(constant.clone()),
        Expr::Local(local) => Instruction::Load(locals.jvm_type(*local)?, locals.slot(*local)?),
        Expr::Binary { op, lhs, rhs } => {
            expression(lhs, locals, out)?;
            expression(rhs, locals, out)?;
            match op {
                BinaryOp::Arithmetic(op, ty) => Instruction::Arithmetic(*op, *ty),
                BinaryOp::Bitwise(op, ty) => Instruction::Bitwise(*op, *ty),
                BinaryOp::Shift(op, ty) => Instruction::Shift(*op, *ty),
                BinaryOp::LCmp => Instruction::LCmp,
                BinaryOp::FCmp(mode, ty) => Instruction::FCmp(*mode, *ty),
            }
        }
        Expr::Neg { ty, value } => {
            expression(value, locals, out)?;
            Instruction::Neg(*ty)
        }
        Expr::ArrayLength(array) => {
            expression(array, locals, out)?;
            Instruction::ArrayLength
        }
        Expr::ArrayElement { ty, array, index } => {
            expression(array, locals, out)?;
            expression(index, locals, out)?;
            Instruction::ArrayLoad(*ty)
        }
        Expr::InstanceField { field, instance } => {
            expression(instance, locals, out)?;
            Instruction::GetField(field.clone())
        }
        Expr::StaticField(field) => Instruction::GetStatic(field.clone()),
        Expr::NewArray { ty, dimensions } => {
            let count = u8::try_from(dimensions.len()).map_err(|_| {
                Error::UnsupportedInstruction {
                    instruction: expr.to_string(),
                    reason: "arrays can be created with at most 255 dimensions",
                }
            })?;
            for dimension in dimensions {
                expression(dimension, locals, out)?;
            }
            Instruction::NewArray {
                ty: ty.clone(),
                dimensions: count,
            }
        }
        Expr::New(class) => Instruction::New(class.clone()),
        Expr::InstanceOf { ty, value } => {
            expression(value, locals, out)?;
            Instruction::InstanceOf(ty.clone())
        }
        Expr::Cast { cast, value } => {
            expression(value, locals, out)?;
            match cast {
                Cast::Primitive { from, to } => Instruction::PrimitiveCast {
                    from: *from,
                    to: *to,
                },
                Cast::Reference(ty) => Instruction::CheckCast(ty.clone()),
            }
        }
        Expr::Invoke(invoke) => return invocation(invoke, locals, out),
    };
    out.push(instruction);
    Ok(())
}

/// Constant added to an `int` local by an assignment of the form `l = l + c` or `l = l - c`
fn increment(local: LocalId, value: &Expr, locals: &Locals) -> Option<i16> {
    if locals.types.get(&local) != Some(&FieldType::int()) {
        return None;
    }
    let (op, lhs, rhs) = match value {
        Expr::Binary {
            op: BinaryOp::Arithmetic(op, NumericType::Int),
            lhs,
            rhs,
        } => (op, lhs.as_ref(), rhs.as_ref()),
        _ => return None,
    };
    match (op, lhs, rhs) {
        (ArithmeticOp::Add, Expr::Local(read), Expr::Const(Constant::Int(amount)))
            if *read == local =>
        {
            i16::try_from(*amount).ok()
        }
        (ArithmeticOp::Sub, Expr::Local(read), Expr::Const(Constant::Int(amount)))
            if *read == local =>
        {
            amount.checked_neg().and_then(|amount| i16::try_from(amount).ok())
        }
        _ => None,
    }
}

/// Instructions for a conditional jump
fn branch(
    condition: &Condition,
    target: Label,
    locals: &Locals,
    out: &mut Vec<Instruction<Label>>,
) -> Result<(), Error> {
    let Condition {
        comparison,
        lhs,
        rhs,
    } = condition;
    let is_null = |expr: &Expr| matches!(expr, Expr::Const(Constant::Null));
    let is_zero = |expr: &Expr| matches!(expr, Expr::Const(Constant::Int(0)));
    let equality = || {
        comparison
            .as_equality()
            .ok_or_else(|| Error::UnsupportedOperand {
                operand: condition.to_string(),
                expected: "an equality comparison between references",
            })
    };

    if is_null(rhs) || is_null(lhs) {
        let compared = if is_null(rhs) { lhs } else { rhs };
        expression(compared, locals, out)?;
        out.push(Instruction::IfNull(equality()?, target));
        return Ok(());
    }

    let ty = match value_type(lhs, locals) {
        Ok(ty) => ty,
        Err(_) => value_type(rhs, locals)?,
    };
    match ty {
        JvmType::Int if is_zero(rhs) => {
            expression(lhs, locals, out)?;
            out.push(Instruction::If(*comparison, target));
        }
        JvmType::Int if is_zero(lhs) => {
            expression(rhs, locals, out)?;
            out.push(Instruction::If(comparison.flip(), target));
        }
        JvmType::Int => {
            expression(lhs, locals, out)?;
            expression(rhs, locals, out)?;
            out.push(Instruction::IfICmp(*comparison, target));
        }
        JvmType::Reference => {
            expression(lhs, locals, out)?;
            expression(rhs, locals, out)?;
            out.push(Instruction::IfACmp(equality()?, target));
        }
        JvmType::Long => {
            expression(lhs, locals, out)?;
            expression(rhs, locals, out)?;
            out.push(Instruction::LCmp);
            out.push(Instruction::If(*comparison, target));
        }
        JvmType::Float | JvmType::Double => {
            expression(lhs, locals, out)?;
            expression(rhs, locals, out)?;

            // NaN has to make the comparison fail
            let mode = match comparison {
                OrdComparison::LT | OrdComparison::LE => CompareMode::G,
                _ => CompareMode::L,
            };
            out.push(Instruction::FCmp(mode, FloatingType::try_from(ty)?));
            out.push(Instruction::If(*comparison, target));
        }
    }
    Ok(())
}

/// Instructions executing a statement
///
/// `labels` has the label placed before the first instruction of every statement jumped to.
pub fn statement(
    statement: &Statement,
    locals: &Locals,
    labels: &HashMap<StmtId, Label>,
) -> Result<Vec<Instruction<Label>>, Error> {
    let label = |target: &StmtId| -> Result<Label, Error> {
        labels
            .get(target)
            .copied()
            .ok_or_else(|| Error::DanglingReference(target.to_string()))
    };

    let mut out = vec![];
    match statement {
        Statement::Assign {
            target: LValue::Local(local),
            value,
        } => match increment(*local, value, locals) {
            Some(amount) => out.push(Instruction::Increment(locals.slot(*local)?, amount)),
            None => {
                expression(value, locals, &mut out)?;
                out.push(Instruction::Store(
                    locals.jvm_type(*local)?,
                    locals.slot(*local)?,
                ));
            }
        },
        Statement::Assign {
            target: LValue::InstanceField { field, instance },
            value,
        } => {
            expression(instance, locals, &mut out)?;
            expression(value, locals, &mut out)?;
            out.push(Instruction::PutField(field.clone()));
        }
        Statement::Assign {
            target: LValue::StaticField(field),
            value,
        } => {
            expression(value, locals, &mut out)?;
            out.push(Instruction::PutStatic(field.clone()));
        }
        Statement::Assign {
            target: LValue::ArrayElement { ty, array, index },
            value,
        } => {
            expression(array, locals, &mut out)?;
            expression(index, locals, &mut out)?;
            expression(value, locals, &mut out)?;
            out.push(Instruction::ArrayStore(*ty));
        }
        Statement::Invoke(invoke) => {
            invocation(invoke, locals, &mut out)?;
            if let Some(ty) = invoke.return_type() {
                out.push(match ty.width() {
                    2 => Instruction::Pop2,
                    _ => Instruction::Pop,
                });
            }
        }
        Statement::Return(None) => out.push(Instruction::Return(None)),
        Statement::Return(Some(value)) => {
            let ty = value_type(value, locals)?;
            expression(value, locals, &mut out)?;
            out.push(Instruction::Return(Some(ty)));
        }
        Statement::Throw(value) => {
            expression(value, locals, &mut out)?;
            out.push(Instruction::Throw);
        }
        Statement::MonitorEnter(value) => {
            expression(value, locals, &mut out)?;
            out.push(Instruction::MonitorEnter);
        }
        Statement::MonitorExit(value) => {
            expression(value, locals, &mut out)?;
            out.push(Instruction::MonitorExit);
        }
        Statement::Goto(target) => out.push(Instruction::Goto(label(target)?)),
        Statement::If { condition, target } => {
            branch(condition, label(target)?, locals, &mut out)?;
        }
        Statement::Switch {
            value,
            targets,
            default,
        } => {
            expression(value, locals, &mut out)?;
            let targets = targets
                .iter()
                .map(|(key, target)| Ok((*key, label(target)?)))
                .collect::<Result<BTreeMap<i32, Label>, Error>>()?;
            out.push(Instruction::Switch {
                default: label(default)?,
                targets,
            });
        }
    }
    Ok(out)
}
