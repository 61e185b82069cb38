use crate::errors::{Error, ShapeErrorKind};
use crate::jvm::*;
use crate::refs::{
    BinaryOp, Cast, Condition, Expr, Invoke, InvokeTarget, LValue, LocalId, Statement,
};
use crate::stack::{InsnId, Instruction};
use std::vec::IntoIter;

/// Operand expressions of an instruction, in the order they were pushed
pub struct Operands<'a> {
    instruction: &'a Instruction,
    exprs: IntoIter<Expr>,
}

impl<'a> Operands<'a> {
    pub fn new(instruction: &'a Instruction, exprs: Vec<Expr>) -> Operands<'a> {
        Operands {
            instruction,
            exprs: exprs.into_iter(),
        }
    }

    fn next(&mut self) -> Result<Expr, Error> {
        self.exprs.next().ok_or_else(|| Error::StackShape {
            instruction: format!("{:?}", self.instruction),
            kind: ShapeErrorKind::EmptyStack,
        })
    }

    fn boxed(&mut self) -> Result<Box<Expr>, Error> {
        self.next().map(Box::new)
    }

    fn rest(self) -> Vec<Expr> {
        self.exprs.collect()
    }
}

fn no_value(instruction: &Instruction) -> Error {
    Error::UnsupportedInstruction {
        instruction: format!("{:?}", instruction),
        reason: "instruction does not compute a value",
    }
}

fn invoke(target: InvokeTarget, receiver: bool, mut operands: Operands) -> Result<Invoke, Error> {
    let receiver = if receiver {
        Some(operands.boxed()?)
    } else {
        None
    };
    Ok(Invoke {
        target,
        receiver,
        arguments: operands.rest(),
    })
}

/// Expression computed by an instruction
///
/// `local` maps the stack locals read by `load` to ref locals.
pub fn expression(
    instruction: &Instruction,
    mut operands: Operands,
    local: impl Fn(crate::stack::StackLocal) -> LocalId,
) -> Result<Expr, Error> {
    use Instruction::*;

    let expr = match instruction {
        Push(constant) => Expr::Const(constant.clone()),
        Load(_, stack_local) => Expr::Local(local(*stack_local)),
        Neg(ty) => Expr::Neg {
            ty: *ty,
            value: operands.boxed()?,
        },
        Arithmetic(op, ty) => binary(BinaryOp::Arithmetic(*op, *ty), operands)?,
        Bitwise(op, ty) => binary(BinaryOp::Bitwise(*op, *ty), operands)?,
        Shift(op, ty) => binary(BinaryOp::Shift(*op, *ty), operands)?,
        LCmp => binary(BinaryOp::LCmp, operands)?,
        FCmp(mode, ty) => binary(BinaryOp::FCmp(*mode, *ty), operands)?,
        NewArray { ty, .. } => Expr::NewArray {
            ty: ty.clone(),
            dimensions: operands.rest(),
        },
        ArrayLength => Expr::ArrayLength(operands.boxed()?),
        ArrayLoad(ty) => Expr::ArrayElement {
            ty: *ty,
            array: operands.boxed()?,
            index: operands.boxed()?,
        },
        New(class) => Expr::New(class.clone()),
        InstanceOf(ty) => Expr::InstanceOf {
            ty: ty.clone(),
            value: operands.boxed()?,
        },
        PrimitiveCast { from, to } => Expr::Cast {
            cast: Cast::Primitive {
                from: *from,
                to: *to,
            },
            value: operands.boxed()?,
        },
        CheckCast(ty) => Expr::Cast {
            cast: Cast::Reference(ty.clone()),
            value: operands.boxed()?,
        },
        GetField(field) => Expr::InstanceField {
            field: field.clone(),
            instance: operands.boxed()?,
        },
        GetStatic(field) => Expr::StaticField(field.clone()),
        Invoke(invoke_type, method) => Expr::Invoke(invoke(
            InvokeTarget::Method(*invoke_type, method.clone()),
            invoke_type.has_receiver(),
            operands,
        )?),
        InvokeDynamic(call_site) => Expr::Invoke(invoke(
            InvokeTarget::Dynamic(call_site.clone()),
            false,
            operands,
        )?),
        _ => return Err(no_value(instruction)),
    };
    Ok(expr)
}

fn binary(op: BinaryOp, mut operands: Operands) -> Result<Expr, Error> {
    let lhs = operands.next()?;
    let rhs = operands.next()?;
    Ok(Expr::binary(op, lhs, rhs))
}

/// Increment of an `int` local by a constant, as an assignment
pub fn increment(local: LocalId, amount: i16) -> Expr {
    let amount = i32::from(amount);
    let (op, amount) = if amount < 0 {
        (ArithmeticOp::Sub, -amount)
    } else {
        (ArithmeticOp::Add, amount)
    };
    Expr::binary(
        BinaryOp::Arithmetic(op, NumericType::Int),
        Expr::local(local),
        Expr::int(amount),
    )
}

/// Statement executing an instruction
///
/// `result` is where a call stores its return value. Branch targets are still instructions.
pub fn statement(
    instruction: &Instruction,
    mut operands: Operands,
    result: Option<LocalId>,
    local: impl Fn(crate::stack::StackLocal) -> LocalId,
) -> Result<Statement<InsnId>, Error> {
    use Instruction::*;

    let condition = |comparison, lhs, rhs| Condition {
        comparison,
        lhs,
        rhs,
    };

    let statement = match instruction {
        Store(_, stack_local) => Statement::assign_local(local(*stack_local), operands.next()?),
        Increment(stack_local, amount) => {
            let local = local(*stack_local);
            Statement::assign_local(local, increment(local, *amount))
        }
        ArrayStore(ty) => {
            let array = operands.next()?;
            let index = operands.next()?;
            Statement::Assign {
                target: LValue::ArrayElement {
                    ty: *ty,
                    array,
                    index,
                },
                value: operands.next()?,
            }
        }
        PutField(field) => {
            let instance = operands.next()?;
            Statement::Assign {
                target: LValue::InstanceField {
                    field: field.clone(),
                    instance,
                },
                value: operands.next()?,
            }
        }
        PutStatic(field) => Statement::Assign {
            target: LValue::StaticField(field.clone()),
            value: operands.next()?,
        },
        Return(None) => Statement::Return(None),
        Return(Some(_)) => Statement::Return(Some(operands.next()?)),
        Throw => Statement::Throw(operands.next()?),
        MonitorEnter => Statement::MonitorEnter(operands.next()?),
        MonitorExit => Statement::MonitorExit(operands.next()?),
        Invoke(_, _) | InvokeDynamic(_) => match expression(instruction, operands, local)? {
            Expr::Invoke(invoke) => match result {
                Some(result) => Statement::assign_local(result, Expr::Invoke(invoke)),
                None => Statement::Invoke(invoke),
            },
            _ => return Err(no_value(instruction)),
        },
        Goto(target) => Statement::Goto(*target),
        If(comparison, target) => Statement::If {
            condition: condition(*comparison, operands.next()?, Expr::int(0)),
            target: *target,
        },
        IfICmp(comparison, target) => {
            let lhs = operands.next()?;
            Statement::If {
                condition: condition(*comparison, lhs, operands.next()?),
                target: *target,
            }
        }
        IfACmp(comparison, target) => {
            let lhs = operands.next()?;
            Statement::If {
                condition: condition(OrdComparison::from(*comparison), lhs, operands.next()?),
                target: *target,
            }
        }
        IfNull(comparison, target) => Statement::If {
            condition: condition(
                OrdComparison::from(*comparison),
                operands.next()?,
                Expr::Const(Constant::Null),
            ),
            target: *target,
        },
        Switch { default, targets } => Statement::Switch {
            value: operands.next()?,
            targets: targets.clone(),
            default: *default,
        },
        other => {
            return Err(Error::UnsupportedInstruction {
                instruction: format!("{:?}", other),
                reason: "instruction is not a statement",
            })
        }
    };
    Ok(statement)
}

/// Does the instruction become a statement (as opposed to an expression pushed on the stack)?
pub fn is_statement(instruction: &Instruction) -> bool {
    use Instruction::*;

    matches!(
        instruction,
        Store(_, _)
            | Increment(_, _)
            | ArrayStore(_)
            | PutField(_)
            | PutStatic(_)
            | Return(_)
            | Throw
            | MonitorEnter
            | MonitorExit
            | Invoke(_, _)
            | InvokeDynamic(_)
            | Goto(_)
            | If(_, _)
            | IfICmp(_, _)
            | IfACmp(_, _)
            | IfNull(_, _)
            | Switch { .. }
    )
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::stack::StackLocal;
    use crate::util::ArenaKey;

    fn identity(local: StackLocal) -> LocalId {
        LocalId::from_index(local.index())
    }

    #[test]
    fn negative_increment() {
        let local = LocalId::from_index(1);
        assert_eq!(increment(local, -3).to_string(), "(l1 - 3)");
        assert_eq!(increment(local, 7).to_string(), "(l1 + 7)");
        assert_eq!(
            increment(local, i16::MIN).to_string(),
            "(l1 - 32768)"
        );
    }

    #[test]
    fn operand_order() {
        let insn = Instruction::ArrayStore(ArrayElement::Int);
        let operands = vec![Expr::local(LocalId::from_index(0)), Expr::int(1), Expr::int(2)];
        let stmt = statement(&insn, Operands::new(&insn, operands), None, identity).unwrap();
        assert_eq!(stmt.to_string(), "l0[1] = 2");

        let insn = Instruction::IfICmp(OrdComparison::LT, InsnId::from_index(4));
        let operands = vec![Expr::int(1), Expr::int(2)];
        let stmt = statement(&insn, Operands::new(&insn, operands), None, identity).unwrap();
        assert_eq!(stmt.to_string(), "if (1 < 2) goto i4");

        let insn = Instruction::Arithmetic(ArithmeticOp::Sub, NumericType::Int);
        let operands = vec![Expr::int(5)];
        assert!(matches!(
            expression(&insn, Operands::new(&insn, operands), identity),
            Err(Error::StackShape { .. })
        ));
    }
}
