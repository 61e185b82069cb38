use super::{BinaryOp, Cast, Expr, LValue, Statement};
use crate::jvm::{ArithmeticOp, NumericType};
use bitflags::bitflags;

bitflags! {
    /// Observable effects of evaluating an expression or executing a statement
    ///
    /// Reading or writing locals is not included: those are tracked by local identity instead.
    pub struct Effects: u8 {
        const READS_HEAP = 0x01;
        const WRITES_HEAP = 0x02;
        const MAY_THROW = 0x04;
        const ALLOCATES = 0x08;

        /// Calls can do anything
        const CALLS = Self::READS_HEAP.bits
            | Self::WRITES_HEAP.bits
            | Self::MAY_THROW.bits
            | Self::ALLOCATES.bits;
    }
}

impl Effects {
    /// Can two computations with these effects be reordered?
    pub fn commutes_with(self, other: Effects) -> bool {
        self.is_empty() || other.is_empty()
    }
}

impl Expr {
    /// Effects of the expression itself, not including its operands
    pub fn own_effects(&self) -> Effects {
        match self {
            Expr::Const(_)
            | Expr::Local(_)
            | Expr::Neg { .. }
            | Expr::InstanceOf { .. }
            | Expr::Cast {
                cast: Cast::Primitive { .. },
                ..
            } => Effects::empty(),
            Expr::Binary {
                op:
                    BinaryOp::Arithmetic(
                        ArithmeticOp::Div | ArithmeticOp::Rem,
                        NumericType::Int | NumericType::Long,
                    ),
                ..
            } => Effects::MAY_THROW,
            Expr::Binary { .. } => Effects::empty(),
            Expr::ArrayLength(_)
            | Expr::Cast {
                cast: Cast::Reference(_),
                ..
            } => Effects::MAY_THROW,
            Expr::ArrayElement { .. } | Expr::InstanceField { .. } | Expr::StaticField(_) => {
                Effects::READS_HEAP | Effects::MAY_THROW
            }
            Expr::NewArray { .. } | Expr::New(_) => Effects::ALLOCATES | Effects::MAY_THROW,
            Expr::Invoke(_) => Effects::CALLS,
        }
    }

    /// Effects of evaluating the whole expression tree
    pub fn effects(&self) -> Effects {
        self.operands()
            .into_iter()
            .fold(self.own_effects(), |effects, operand| {
                effects | operand.effects()
            })
    }
}

impl<T> Statement<T> {
    /// Effects of executing the statement, including evaluating its operands
    pub fn effects(&self) -> Effects {
        let own = match self {
            Statement::Assign {
                target: LValue::Local(_),
                ..
            }
            | Statement::Goto(_)
            | Statement::If { .. }
            | Statement::Switch { .. }
            | Statement::Return(_) => Effects::empty(),
            Statement::Assign { .. } | Statement::MonitorEnter(_) | Statement::MonitorExit(_) => {
                Effects::WRITES_HEAP | Effects::MAY_THROW
            }
            Statement::Throw(_) => Effects::MAY_THROW,
            Statement::Invoke(_) => Effects::CALLS,
        };
        self.operands()
            .into_iter()
            .fold(own, |effects, operand| effects | operand.effects())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::*;
    use crate::refs::LocalId;
    use crate::util::ArenaKey;

    #[test]
    fn expression_effects() {
        let local = Expr::local(LocalId::from_index(0));
        let sum = Expr::binary(
            BinaryOp::Arithmetic(ArithmeticOp::Add, NumericType::Int),
            local.clone(),
            Expr::int(1),
        );
        assert!(sum.effects().is_empty());

        let quotient = Expr::binary(
            BinaryOp::Arithmetic(ArithmeticOp::Div, NumericType::Int),
            local.clone(),
            Expr::int(2),
        );
        assert_eq!(quotient.effects(), Effects::MAY_THROW);

        let float_quotient = Expr::binary(
            BinaryOp::Arithmetic(ArithmeticOp::Div, NumericType::Float),
            Expr::Const(Constant::Float(1.0)),
            Expr::Const(Constant::Float(0.0)),
        );
        assert!(float_quotient.effects().is_empty());

        let length = Expr::ArrayLength(Box::new(Expr::StaticField(FieldRef {
            owner: BinaryName::OBJECT,
            name: UnqualifiedName::from_str("table").unwrap(),
            descriptor: FieldType::array(FieldType::int()),
        })));
        assert!(length.effects().contains(Effects::READS_HEAP));
        assert!(!length.effects().commutes_with(Effects::WRITES_HEAP));
    }

    #[test]
    fn statement_effects() {
        let store: Statement = Statement::Assign {
            target: LValue::Local(LocalId::from_index(1)),
            value: Expr::int(3),
        };
        assert!(store.effects().is_empty());
        let throw: Statement = Statement::Throw(Expr::Const(Constant::Null));
        assert_eq!(throw.effects(), Effects::MAY_THROW);
    }
}
