use crate::jvm::*;
use crate::util::arena_key;

arena_key! {
    /// Identity of a local in a [`super::RefBody`]
    pub struct LocalId("l");
}

/// Expression tree
#[derive(Clone, PartialEq, Debug)]
pub enum Expr {
    Const(Constant),
    Local(LocalId),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg {
        ty: NumericType,
        value: Box<Expr>,
    },
    ArrayLength(Box<Expr>),
    ArrayElement {
        ty: ArrayElement,
        array: Box<Expr>,
        index: Box<Expr>,
    },
    InstanceField {
        field: FieldRef,
        instance: Box<Expr>,
    },
    StaticField(FieldRef),

    /// New array, with one length per dimension created
    NewArray {
        ty: RefType,
        dimensions: Vec<Expr>,
    },

    /// Uninitialized object (constructed by invoking `<init>` on it)
    New(BinaryName),
    InstanceOf {
        ty: RefType,
        value: Box<Expr>,
    },
    Cast {
        cast: Cast,
        value: Box<Expr>,
    },
    Invoke(Invoke),
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BinaryOp {
    Arithmetic(ArithmeticOp, NumericType),
    Bitwise(BitwiseOp, IntegralType),

    /// Shift the left operand by the `int` right operand
    Shift(ShiftType, IntegralType),
    LCmp,
    FCmp(CompareMode, FloatingType),
}

#[derive(Clone, PartialEq, Debug)]
pub enum Cast {
    Primitive { from: NumericType, to: BaseType },
    Reference(RefType),
}

#[derive(Clone, PartialEq, Debug)]
pub enum InvokeTarget {
    Method(InvokeType, MethodRef),
    Dynamic(CallSite),
}

#[derive(Clone, PartialEq, Debug)]
pub struct Invoke {
    pub target: InvokeTarget,

    /// Object receiving the call (absent for static and dynamic calls)
    pub receiver: Option<Box<Expr>>,
    pub arguments: Vec<Expr>,
}

impl Invoke {
    pub fn descriptor(&self) -> &MethodDescriptor {
        match &self.target {
            InvokeTarget::Method(_, method) => &method.descriptor,
            InvokeTarget::Dynamic(call_site) => &call_site.descriptor,
        }
    }

    pub fn return_type(&self) -> Option<&FieldType> {
        self.descriptor().return_type.as_ref()
    }

    /// Operands in evaluation order
    pub fn operands(&self) -> Vec<&Expr> {
        self.receiver
            .iter()
            .map(|receiver| receiver.as_ref())
            .chain(self.arguments.iter())
            .collect()
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Expr> {
        self.receiver
            .iter_mut()
            .map(|receiver| receiver.as_mut())
            .chain(self.arguments.iter_mut())
            .collect()
    }
}

/// Outcome of inferring the type of an expression
#[derive(Clone, PartialEq, Debug)]
pub enum InferredType {
    Known(FieldType),

    /// The `null` constant, which fits any reference type
    Null,

    /// Depends on something not yet typed
    Unknown,
}

impl InferredType {
    pub fn known(self) -> Option<FieldType> {
        match self {
            InferredType::Known(ty) => Some(ty),
            _ => None,
        }
    }
}

pub(crate) fn numeric_field_type(ty: NumericType) -> FieldType {
    match ty {
        NumericType::Int => FieldType::int(),
        NumericType::Long => FieldType::long(),
        NumericType::Float => FieldType::float(),
        NumericType::Double => FieldType::double(),
    }
}

impl Expr {
    pub fn local(local: LocalId) -> Expr {
        Expr::Local(local)
    }

    pub fn int(value: i32) -> Expr {
        Expr::Const(Constant::Int(value))
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Direct operands, in evaluation order
    pub fn operands(&self) -> Vec<&Expr> {
        match self {
            Expr::Const(_) | Expr::Local(_) | Expr::StaticField(_) | Expr::New(_) => vec![],
            Expr::Binary { lhs, rhs, .. } => vec![&**lhs, &**rhs],
            Expr::ArrayElement { array, index, .. } => vec![&**array, &**index],
            Expr::Neg { value, .. }
            | Expr::ArrayLength(value)
            | Expr::InstanceField {
                instance: value, ..
            }
            | Expr::InstanceOf { value, .. }
            | Expr::Cast { value, .. } => vec![&**value],
            Expr::NewArray { dimensions, .. } => dimensions.iter().collect(),
            Expr::Invoke(invoke) => invoke.operands(),
        }
    }

    /// Mutable slots of the direct operands, in evaluation order
    pub fn operands_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Const(_) | Expr::Local(_) | Expr::StaticField(_) | Expr::New(_) => vec![],
            Expr::Binary { lhs, rhs, .. } => vec![&mut **lhs, &mut **rhs],
            Expr::ArrayElement { array, index, .. } => vec![&mut **array, &mut **index],
            Expr::Neg { value, .. }
            | Expr::ArrayLength(value)
            | Expr::InstanceField {
                instance: value, ..
            }
            | Expr::InstanceOf { value, .. }
            | Expr::Cast { value, .. } => vec![&mut **value],
            Expr::NewArray { dimensions, .. } => dimensions.iter_mut().collect(),
            Expr::Invoke(invoke) => invoke.operands_mut(),
        }
    }

    /// Does the expression read the given local anywhere?
    pub fn reads_local(&self, local: LocalId) -> bool {
        match self {
            Expr::Local(read) => *read == local,
            other => other
                .operands()
                .into_iter()
                .any(|operand| operand.reads_local(local)),
        }
    }

    /// Count the reads of a local
    pub fn local_reads(&self, local: LocalId) -> usize {
        match self {
            Expr::Local(read) if *read == local => 1,
            other => other
                .operands()
                .into_iter()
                .map(|operand| operand.local_reads(local))
                .sum(),
        }
    }

    /// Visit every local read, in evaluation order
    pub fn visit_locals(&self, visit: &mut impl FnMut(LocalId)) {
        match self {
            Expr::Local(local) => visit(*local),
            other => {
                for operand in other.operands() {
                    operand.visit_locals(visit);
                }
            }
        }
    }

    /// Replace every read of a local
    pub fn rename_local(&mut self, from: LocalId, to: LocalId) {
        match self {
            Expr::Local(local) if *local == from => *local = to,
            other => {
                for operand in other.operands_mut() {
                    operand.rename_local(from, to);
                }
            }
        }
    }

    /// Replace the first read of `local` (in evaluation order) with `with`
    ///
    /// Returns the replacement if no read was found.
    pub fn substitute_local(&mut self, local: LocalId, with: Expr) -> Option<Expr> {
        match self {
            Expr::Local(read) if *read == local => {
                *self = with;
                None
            }
            other => {
                let mut with = Some(with);
                for operand in other.operands_mut() {
                    if let Some(replacement) = with.take() {
                        with = operand.substitute_local(local, replacement);
                    }
                }
                with
            }
        }
    }

    /// Type of the value produced, given types of locals
    pub fn infer_type(&self, local_type: &impl Fn(LocalId) -> InferredType) -> InferredType {
        let known = InferredType::Known;
        match self {
            Expr::Const(constant) => match constant.field_type() {
                Some(ty) => known(ty),
                None => InferredType::Null,
            },
            Expr::Local(local) => local_type(*local),
            Expr::Binary { op, .. } => match op {
                BinaryOp::Arithmetic(_, ty) => known(numeric_field_type(*ty)),
                BinaryOp::Bitwise(_, ty) | BinaryOp::Shift(_, ty) => {
                    known(numeric_field_type(NumericType::from(*ty)))
                }
                BinaryOp::LCmp | BinaryOp::FCmp(_, _) => known(FieldType::int()),
            },
            Expr::Neg { ty, .. } => known(numeric_field_type(*ty)),
            Expr::ArrayLength(_) => known(FieldType::int()),
            Expr::ArrayElement { ty, array, .. } => match ty.base_type() {
                Some(base_type) => known(FieldType::Base(base_type)),
                None => match array.infer_type(local_type) {
                    InferredType::Known(FieldType::Ref(array_type)) => {
                        match array_type.element_type() {
                            Some(element_type) => known(element_type),
                            None => InferredType::Unknown,
                        }
                    }
                    _ => InferredType::Unknown,
                },
            },
            Expr::InstanceField { field, .. } | Expr::StaticField(field) => {
                known(field.descriptor.clone())
            }
            Expr::NewArray { ty, .. } => known(FieldType::Ref(ty.clone())),
            Expr::New(class) => known(FieldType::object(class.clone())),
            Expr::InstanceOf { .. } => known(FieldType::boolean()),
            Expr::Cast {
                cast: Cast::Primitive { to, .. },
                ..
            } => known(FieldType::Base(*to)),
            Expr::Cast {
                cast: Cast::Reference(ty),
                ..
            } => known(FieldType::Ref(ty.clone())),
            Expr::Invoke(invoke) => match invoke.return_type() {
                Some(ty) => known(ty.clone()),
                None => InferredType::Unknown,
            },
        }
    }

    /// Coarse type of the value produced
    pub fn jvm_type(&self, local_type: &impl Fn(LocalId) -> InferredType) -> Option<JvmType> {
        match self.infer_type(local_type) {
            InferredType::Known(ty) => Some(JvmType::from(&ty)),
            InferredType::Null => Some(JvmType::Reference),
            InferredType::Unknown => None,
        }
    }

    /// Can the expression be duplicated instead of being stored in a local?
    pub fn is_trivial(&self) -> bool {
        matches!(self, Expr::Const(_) | Expr::Local(_))
    }
}
