use super::{BinaryName, FieldType, JvmType, MethodDescriptor, RefType};
use std::fmt;

/// Constant values that can be pushed onto the stack
#[derive(Clone, PartialEq, Debug)]
pub enum Constant {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),

    /// Class literal (eg. `String.class`)
    Class(RefType),

    MethodType(MethodDescriptor),
}

impl Constant {
    /// Coarse type of the constant once it is on the stack
    pub fn jvm_type(&self) -> JvmType {
        match self {
            Constant::Int(_) => JvmType::Int,
            Constant::Long(_) => JvmType::Long,
            Constant::Float(_) => JvmType::Float,
            Constant::Double(_) => JvmType::Double,
            Constant::Null
            | Constant::String(_)
            | Constant::Class(_)
            | Constant::MethodType(_) => JvmType::Reference,
        }
    }

    /// Precise type of the constant
    ///
    /// Returns `None` for `null`, which has no type of its own.
    pub fn field_type(&self) -> Option<FieldType> {
        let typ = match self {
            Constant::Null => return None,
            Constant::Int(_) => FieldType::int(),
            Constant::Long(_) => FieldType::long(),
            Constant::Float(_) => FieldType::float(),
            Constant::Double(_) => FieldType::double(),
            Constant::String(_) => FieldType::object(BinaryName::STRING),
            Constant::Class(_) => FieldType::object(BinaryName::CLASS),
            Constant::MethodType(_) => FieldType::object(BinaryName::METHODTYPE),
        };
        Some(typ)
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Null => f.write_str("null"),
            Constant::Int(i) => write!(f, "{}", i),
            Constant::Long(l) => write!(f, "{}L", l),
            Constant::Float(x) => write!(f, "{:?}f", x),
            Constant::Double(x) => write!(f, "{:?}d", x),
            Constant::String(s) => write!(f, "{:?}", s),
            Constant::Class(typ) => write!(f, "{}.class", typ),
            Constant::MethodType(descriptor) => write!(f, "MethodType{}", descriptor),
        }
    }
}
