use super::{BinaryOp, Cast, Condition, Expr, Invoke, InvokeTarget, LValue, RefBody, Statement};
use crate::jvm::{CompareMode, FloatingType, InvokeType, Name};
use std::fmt;

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Arithmetic(op, _) => write!(f, "{}", op),
            BinaryOp::Bitwise(op, _) => write!(f, "{}", op),
            BinaryOp::Shift(op, _) => write!(f, "{}", op),
            BinaryOp::LCmp => f.write_str("lcmp"),
            BinaryOp::FCmp(mode, ty) => {
                let prefix = match ty {
                    FloatingType::Float => 'f',
                    FloatingType::Double => 'd',
                };
                let suffix = match mode {
                    CompareMode::L => 'l',
                    CompareMode::G => 'g',
                };
                write!(f, "{}cmp{}", prefix, suffix)
            }
        }
    }
}

fn comma_separated(f: &mut fmt::Formatter<'_>, exprs: &[Expr]) -> fmt::Result {
    for (i, expr) in exprs.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", expr)?;
    }
    Ok(())
}

impl fmt::Display for Invoke {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.target, &self.receiver) {
            (InvokeTarget::Method(InvokeType::Special, method), Some(receiver)) => {
                write!(f, "{}.{}::{}(", receiver, method.owner, method.name)?
            }
            (InvokeTarget::Method(_, method), Some(receiver)) => {
                write!(f, "{}.{}(", receiver, method.name)?
            }
            (InvokeTarget::Method(_, method), None) => {
                write!(f, "{}.{}(", method.owner, method.name)?
            }
            (InvokeTarget::Dynamic(call_site), _) => write!(f, "dynamic {}(", call_site.name)?,
        }
        comma_separated(f, &self.arguments)?;
        f.write_str(")")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(constant) => write!(f, "{}", constant),
            Expr::Local(local) => write!(f, "{}", local),
            Expr::Binary { op, lhs, rhs } => write!(f, "({} {} {})", lhs, op, rhs),
            Expr::Neg { value, .. } => write!(f, "-{}", value),
            Expr::ArrayLength(array) => write!(f, "{}.length", array),
            Expr::ArrayElement { array, index, .. } => write!(f, "{}[{}]", array, index),
            Expr::InstanceField { field, instance } => write!(f, "{}.{}", instance, field.name),
            Expr::StaticField(field) => write!(f, "{}", field),
            Expr::NewArray { ty, dimensions } => {
                write!(f, "new {}(", ty)?;
                comma_separated(f, dimensions)?;
                f.write_str(")")
            }
            Expr::New(class) => write!(f, "new {}", class),
            Expr::InstanceOf { ty, value } => write!(f, "({} instanceof {})", value, ty),
            Expr::Cast {
                cast: Cast::Primitive { to, .. },
                value,
            } => write!(f, "(({}) {})", to, value),
            Expr::Cast {
                cast: Cast::Reference(ty),
                value,
            } => write!(f, "(({}) {})", ty, value),
            Expr::Invoke(invoke) => write!(f, "{}", invoke),
        }
    }
}

impl fmt::Display for LValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LValue::Local(local) => write!(f, "{}", local),
            LValue::InstanceField { field, instance } => write!(f, "{}.{}", instance, field.name),
            LValue::StaticField(field) => write!(f, "{}", field),
            LValue::ArrayElement { array, index, .. } => write!(f, "{}[{}]", array, index),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.lhs, self.comparison, self.rhs)
    }
}

impl<T: fmt::Display> fmt::Display for Statement<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Assign { target, value } => write!(f, "{} = {}", target, value),
            Statement::Invoke(invoke) => write!(f, "{}", invoke),
            Statement::Return(None) => f.write_str("return"),
            Statement::Return(Some(value)) => write!(f, "return {}", value),
            Statement::Throw(value) => write!(f, "throw {}", value),
            Statement::MonitorEnter(value) => write!(f, "monitorenter {}", value),
            Statement::MonitorExit(value) => write!(f, "monitorexit {}", value),
            Statement::Goto(target) => write!(f, "goto {}", target),
            Statement::If { condition, target } => write!(f, "if {} goto {}", condition, target),
            Statement::Switch {
                value,
                targets,
                default,
            } => {
                write!(f, "switch ({}) {{ ", value)?;
                for (key, target) in targets {
                    write!(f, "{} -> {}, ", key, target)?;
                }
                write!(f, "default -> {} }}", default)
            }
        }
    }
}

impl RefBody {
    /// Render each statement on its own line, with branch targets as statement positions
    pub fn lines(&self) -> Vec<String> {
        let positions = self.statements.positions();
        self.statements
            .iter()
            .map(|(_, statement)| {
                statement
                    .map_targets(|target| match positions.get(target) {
                        Some(position) => position.to_string(),
                        None => target.to_string(),
                    })
                    .to_string()
            })
            .collect()
    }
}

/// Numbered listing of the statements, followed by the protected regions
impl fmt::Display for RefBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let positions = self.statements.positions();
        for (position, line) in self.lines().iter().enumerate() {
            writeln!(f, "{:>3}: {}", position, line)?;
        }
        for block in &self.try_catch_blocks {
            let position = |stmt| match positions.get(&stmt) {
                Some(position) => position.to_string(),
                None => stmt.to_string(),
            };
            writeln!(
                f,
                "try {}..={} catch {} -> {} in {}",
                position(block.first),
                position(block.last),
                block
                    .exception
                    .as_ref()
                    .map_or("any", |exception| exception.as_str()),
                block.local,
                position(block.handler),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::*;
    use crate::refs::{LocalId, TryCatchBlock};
    use crate::util::ArenaKey;

    #[test]
    fn render_statements() {
        let mut body = RefBody::new();
        let local = body.new_local(Some(FieldType::int()));
        let next = body.new_local(None);
        let top = body.push(Statement::assign_local(
            next,
            Expr::binary(
                BinaryOp::Arithmetic(ArithmeticOp::Add, NumericType::Int),
                Expr::local(local),
                Expr::int(1),
            ),
        ));
        body.push(Statement::If {
            condition: Condition {
                comparison: OrdComparison::GE,
                lhs: Expr::local(next),
                rhs: Expr::int(10),
            },
            target: top,
        });
        body.push(Statement::Return(None));

        assert_eq!(
            body.lines(),
            vec!["l1 = (l0 + 1)", "if (l1 >= 10) goto 0", "return"]
        );
        assert_eq!(
            Expr::Cast {
                cast: Cast::Primitive {
                    from: NumericType::Int,
                    to: BaseType::Long
                },
                value: Box::new(Expr::local(LocalId::from_index(2))),
            }
            .to_string(),
            "((J) l2)"
        );
    }

    #[test]
    fn render_regions() {
        let mut body = RefBody::new();
        let caught = body.new_local(Some(FieldType::object(BinaryName::THROWABLE)));
        let first = body.push(Statement::Return(None));
        let handler = body.push(Statement::Throw(Expr::local(caught)));
        for exception in [BinaryName::from_str("java/io/IOException").ok(), None] {
            body.try_catch_blocks.push(TryCatchBlock {
                first,
                last: first,
                handler,
                exception,
                local: caught,
            });
        }

        assert_eq!(
            body.to_string(),
            "  0: return\n  1: throw l0\n\
             try 0..=0 catch java/io/IOException -> l0 in 1\n\
             try 0..=0 catch any -> l0 in 1\n"
        );
    }
}
