use super::{InsnId, StackLocal};
use crate::errors::Error;
use crate::jvm::*;
use std::collections::BTreeMap;
use std::convert::TryFrom;
use std::fmt::Debug;

/// Instruction in a stack body
///
/// The type parameter `T` is what branch targets point to: in a finished [`super::StackBody`] that
/// is another instruction and in a [`super::StackBodyBuilder`] it is a [`super::Label`].
#[derive(Clone, PartialEq, Debug)]
pub enum Instruction<T = InsnId> {
    Push(Constant),
    Neg(NumericType),
    Arithmetic(ArithmeticOp, NumericType),
    Bitwise(BitwiseOp, IntegralType),

    /// Shift a value by an `int` amount
    Shift(ShiftType, IntegralType),

    /// Compare two `long`s, pushing `-1`, `0`, or `1`
    LCmp,

    /// Compare two floating point values, pushing `-1`, `0`, or `1`
    FCmp(CompareMode, FloatingType),

    /// Allocate an array, popping one `int` length per dimension
    NewArray {
        ty: RefType,
        dimensions: u8,
    },
    ArrayLength,
    ArrayLoad(ArrayElement),
    ArrayStore(ArrayElement),

    Swap,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,

    Load(JvmType, StackLocal),
    Store(JvmType, StackLocal),

    /// Add a constant to an `int` local
    Increment(StackLocal, i16),

    New(BinaryName),
    InstanceOf(RefType),
    PrimitiveCast {
        from: NumericType,
        to: BaseType,
    },
    CheckCast(RefType),

    Return(Option<JvmType>),
    Throw,
    MonitorEnter,
    MonitorExit,

    GetField(FieldRef),
    PutField(FieldRef),
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    Invoke(InvokeType, MethodRef),
    InvokeDynamic(CallSite),

    Goto(T),

    /// Compare an `int` against zero
    If(OrdComparison, T),

    /// Compare two `int`s
    IfICmp(OrdComparison, T),

    /// Compare two references for identity
    IfACmp(EqComparison, T),

    /// Compare a reference against `null`
    IfNull(EqComparison, T),

    /// Jump based on an `int` key (covers both table and lookup switches)
    Switch {
        default: T,
        targets: BTreeMap<i32, T>,
    },
}

impl<T> Instruction<T> {
    /// Does control flow to the next instruction (at least sometimes)?
    pub fn continues_execution(&self) -> bool {
        !matches!(
            self,
            Instruction::Goto(_)
                | Instruction::Return(_)
                | Instruction::Throw
                | Instruction::Switch { .. }
        )
    }

    /// Explicit jump targets (not including fallthrough)
    pub fn branch_targets(&self) -> Vec<&T> {
        match self {
            Instruction::Goto(target)
            | Instruction::If(_, target)
            | Instruction::IfICmp(_, target)
            | Instruction::IfACmp(_, target)
            | Instruction::IfNull(_, target) => vec![target],
            Instruction::Switch { default, targets } => {
                let mut all: Vec<&T> = targets.values().collect();
                all.push(default);
                all
            }
            _ => vec![],
        }
    }

    pub fn is_branch(&self) -> bool {
        !self.branch_targets().is_empty()
    }

    /// Does the instruction only rearrange, duplicate, or drop stack values?
    pub fn is_stack_shuffle(&self) -> bool {
        matches!(
            self,
            Instruction::Swap
                | Instruction::Pop
                | Instruction::Pop2
                | Instruction::Dup
                | Instruction::DupX1
                | Instruction::DupX2
                | Instruction::Dup2
                | Instruction::Dup2X1
                | Instruction::Dup2X2
        )
    }

    /// Replace every branch target
    pub fn map_targets<U>(&self, mut map_target: impl FnMut(&T) -> U) -> Instruction<U> {
        use Instruction::*;

        match self {
            Goto(target) => Goto(map_target(target)),
            If(op, target) => If(*op, map_target(target)),
            IfICmp(op, target) => IfICmp(*op, map_target(target)),
            IfACmp(op, target) => IfACmp(*op, map_target(target)),
            IfNull(op, target) => IfNull(*op, map_target(target)),
            Switch { default, targets } => Switch {
                default: map_target(default),
                targets: targets
                    .iter()
                    .map(|(key, target)| (*key, map_target(target)))
                    .collect(),
            },

            Push(constant) => Push(constant.clone()),
            Neg(ty) => Neg(*ty),
            Arithmetic(op, ty) => Arithmetic(*op, *ty),
            Bitwise(op, ty) => Bitwise(*op, *ty),
            Shift(op, ty) => Shift(*op, *ty),
            LCmp => LCmp,
            FCmp(mode, ty) => FCmp(*mode, *ty),
            NewArray { ty, dimensions } => NewArray {
                ty: ty.clone(),
                dimensions: *dimensions,
            },
            ArrayLength => ArrayLength,
            ArrayLoad(ty) => ArrayLoad(*ty),
            ArrayStore(ty) => ArrayStore(*ty),
            Swap => Swap,
            Pop => Pop,
            Pop2 => Pop2,
            Dup => Dup,
            DupX1 => DupX1,
            DupX2 => DupX2,
            Dup2 => Dup2,
            Dup2X1 => Dup2X1,
            Dup2X2 => Dup2X2,
            Load(ty, local) => Load(*ty, *local),
            Store(ty, local) => Store(*ty, *local),
            Increment(local, amount) => Increment(*local, *amount),
            New(class) => New(class.clone()),
            InstanceOf(ty) => InstanceOf(ty.clone()),
            PrimitiveCast { from, to } => PrimitiveCast {
                from: *from,
                to: *to,
            },
            CheckCast(ty) => CheckCast(ty.clone()),
            Return(ty) => Return(*ty),
            Throw => Throw,
            MonitorEnter => MonitorEnter,
            MonitorExit => MonitorExit,
            GetField(field) => GetField(field.clone()),
            PutField(field) => PutField(field.clone()),
            GetStatic(field) => GetStatic(field.clone()),
            PutStatic(field) => PutStatic(field.clone()),
            Invoke(typ, method) => Invoke(*typ, method.clone()),
            InvokeDynamic(call_site) => InvokeDynamic(call_site.clone()),
        }
    }

    /// Local read or written, if any
    pub fn local(&self) -> Option<StackLocal> {
        match self {
            Instruction::Load(_, local)
            | Instruction::Store(_, local)
            | Instruction::Increment(local, _) => Some(*local),
            _ => None,
        }
    }
}

impl<T: Debug> Instruction<T> {
    /// Reject operand combinations the JVM has no instruction for
    pub fn check(&self) -> Result<(), Error> {
        let unsupported = |reason: &'static str| {
            Err(Error::UnsupportedInstruction {
                instruction: format!("{:?}", self),
                reason,
            })
        };

        match self {
            Instruction::NewArray { ty, dimensions } => {
                let array_dimensions = ty.array_dimensions();
                if array_dimensions == 0 {
                    return unsupported("array creation needs an array type");
                }
                if *dimensions == 0 {
                    return unsupported("array creation needs at least one dimension");
                }
                if usize::from(*dimensions) > array_dimensions {
                    return unsupported("more dimensions than the array type has");
                }
            }
            Instruction::PrimitiveCast { from, to } => {
                let from_type = JvmType::from(*from);
                match to {
                    BaseType::Boolean => return unsupported("no conversion to boolean"),
                    BaseType::Byte | BaseType::Char | BaseType::Short
                        if from_type != JvmType::Int =>
                    {
                        return unsupported("narrowing to byte, char, or short is only from int")
                    }
                    BaseType::Int | BaseType::Long | BaseType::Float | BaseType::Double
                        if from_type == JvmType::from(*to) =>
                    {
                        return unsupported("conversion between identical types")
                    }
                    _ => (),
                }
            }
            Instruction::Invoke(InvokeType::Static, method)
            | Instruction::Invoke(InvokeType::Special, method)
                if method.name == UnqualifiedName::CLINIT =>
            {
                return unsupported("class initializers cannot be invoked");
            }
            Instruction::Invoke(InvokeType::Static, method)
                if method.name == UnqualifiedName::INIT =>
            {
                return unsupported("constructors need a receiver");
            }
            _ => (),
        }
        Ok(())
    }
}

/// Constructors which pick the instruction variant from a precise type
impl<T> Instruction<T> {
    pub fn load(ty: &FieldType, local: StackLocal) -> Instruction<T> {
        Instruction::Load(JvmType::from(ty), local)
    }

    pub fn store(ty: &FieldType, local: StackLocal) -> Instruction<T> {
        Instruction::Store(JvmType::from(ty), local)
    }

    pub fn arithmetic(op: ArithmeticOp, ty: &FieldType) -> Result<Instruction<T>, Error> {
        Ok(Instruction::Arithmetic(
            op,
            NumericType::try_from(JvmType::from(ty))?,
        ))
    }

    pub fn bitwise(op: BitwiseOp, ty: &FieldType) -> Result<Instruction<T>, Error> {
        Ok(Instruction::Bitwise(
            op,
            IntegralType::try_from(JvmType::from(ty))?,
        ))
    }

    pub fn shift(op: ShiftType, ty: &FieldType) -> Result<Instruction<T>, Error> {
        Ok(Instruction::Shift(
            op,
            IntegralType::try_from(JvmType::from(ty))?,
        ))
    }

    pub fn neg(ty: &FieldType) -> Result<Instruction<T>, Error> {
        Ok(Instruction::Neg(NumericType::try_from(JvmType::from(ty))?))
    }

    pub fn compare(mode: CompareMode, ty: &FieldType) -> Result<Instruction<T>, Error> {
        match JvmType::from(ty) {
            JvmType::Long => Ok(Instruction::LCmp),
            other => Ok(Instruction::FCmp(mode, FloatingType::try_from(other)?)),
        }
    }

    pub fn array_load(element: &FieldType) -> Instruction<T> {
        Instruction::ArrayLoad(ArrayElement::from(element))
    }

    pub fn array_store(element: &FieldType) -> Instruction<T> {
        Instruction::ArrayStore(ArrayElement::from(element))
    }

    pub fn return_value(ty: Option<&FieldType>) -> Instruction<T> {
        Instruction::Return(ty.map(JvmType::from))
    }

    pub fn primitive_cast(from: BaseType, to: BaseType) -> Result<Instruction<T>, Error> {
        Ok(Instruction::PrimitiveCast {
            from: NumericType::try_from(JvmType::from(from))?,
            to,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::ArenaKey;

    fn check(insn: Instruction) -> Result<(), Error> {
        insn.check()
    }

    #[test]
    fn array_creation() {
        let int_matrix = RefType::array(FieldType::array(FieldType::int()));
        assert!(check(Instruction::NewArray {
            ty: int_matrix.clone(),
            dimensions: 2,
        })
        .is_ok());
        assert!(matches!(
            check(Instruction::NewArray {
                ty: int_matrix.clone(),
                dimensions: 3,
            }),
            Err(Error::UnsupportedInstruction { .. })
        ));
        assert!(matches!(
            check(Instruction::NewArray {
                ty: int_matrix,
                dimensions: 0,
            }),
            Err(Error::UnsupportedInstruction { .. })
        ));
        assert!(matches!(
            check(Instruction::NewArray {
                ty: RefType::Object(BinaryName::STRING),
                dimensions: 1,
            }),
            Err(Error::UnsupportedInstruction { .. })
        ));
    }

    #[test]
    fn casts() {
        let cast = |from, to| {
            check(Instruction::PrimitiveCast { from, to })
        };
        assert!(cast(NumericType::Int, BaseType::Long).is_ok());
        assert!(cast(NumericType::Int, BaseType::Char).is_ok());
        assert!(cast(NumericType::Double, BaseType::Float).is_ok());
        assert!(cast(NumericType::Int, BaseType::Int).is_err());
        assert!(cast(NumericType::Long, BaseType::Byte).is_err());
        assert!(cast(NumericType::Int, BaseType::Boolean).is_err());
        assert!(matches!(
            Instruction::<InsnId>::primitive_cast(BaseType::Boolean, BaseType::Int),
            Ok(Instruction::PrimitiveCast {
                from: NumericType::Int,
                to: BaseType::Int
            })
        ));
    }

    #[test]
    fn typed_constructors() {
        let local = StackLocal::from_index(0);
        assert_eq!(
            Instruction::<InsnId>::load(&FieldType::boolean(), local),
            Instruction::Load(JvmType::Int, local)
        );
        assert!(matches!(
            Instruction::<InsnId>::arithmetic(
                ArithmeticOp::Add,
                &FieldType::object(BinaryName::STRING)
            ),
            Err(Error::UnsupportedOperand { .. })
        ));
        assert!(matches!(
            Instruction::<InsnId>::bitwise(BitwiseOp::Xor, &FieldType::float()),
            Err(Error::UnsupportedOperand { .. })
        ));
        assert_eq!(
            Instruction::<InsnId>::compare(CompareMode::G, &FieldType::long()).ok(),
            Some(Instruction::LCmp)
        );
    }

    #[test]
    fn targets() {
        let mut targets = BTreeMap::new();
        targets.insert(1, 10usize);
        targets.insert(5, 20usize);
        let switch = Instruction::Switch {
            default: 30usize,
            targets,
        };
        assert!(!switch.continues_execution());
        assert_eq!(switch.branch_targets(), vec![&10, &20, &30]);
        let mapped = switch.map_targets(|target| target + 1);
        assert_eq!(mapped.branch_targets(), vec![&11, &21, &31]);
        assert!(Instruction::If(OrdComparison::EQ, 0usize).continues_execution());
    }
}
