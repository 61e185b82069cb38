use super::{BaseType, FieldType, RefType};
use crate::errors::Error;
use crate::util::Width;
use std::convert::TryFrom;
use std::fmt;

/// Coarse categories of values on the operand stack
///
/// This is much less precise than [`FieldType`]: it only tracks what the JVM needs
/// to check the push/pop contract of instructions. Every `boolean`, `byte`, `char`, `short`, and
/// `int` is an `Int` and every object, array, or `null` is a `Reference`.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum JvmType {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl JvmType {
    pub const fn is_reference(&self) -> bool {
        matches!(self, JvmType::Reference)
    }
}

impl Width for JvmType {
    fn width(&self) -> usize {
        match self {
            JvmType::Int | JvmType::Float | JvmType::Reference => 1,
            JvmType::Long | JvmType::Double => 2,
        }
    }
}

impl From<BaseType> for JvmType {
    fn from(base_type: BaseType) -> Self {
        match base_type {
            BaseType::Int
            | BaseType::Char
            | BaseType::Short
            | BaseType::Byte
            | BaseType::Boolean => JvmType::Int,
            BaseType::Float => JvmType::Float,
            BaseType::Long => JvmType::Long,
            BaseType::Double => JvmType::Double,
        }
    }
}

impl From<&FieldType> for JvmType {
    fn from(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Base(base_type) => JvmType::from(*base_type),
            FieldType::Ref(_) => JvmType::Reference,
        }
    }
}

impl fmt::Display for JvmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JvmType::Int => "int",
            JvmType::Long => "long",
            JvmType::Float => "float",
            JvmType::Double => "double",
            JvmType::Reference => "reference",
        };
        f.write_str(name)
    }
}

/// Operand types of arithmetic instructions
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum NumericType {
    Int,
    Long,
    Float,
    Double,
}

/// Operand types of bitwise and shift instructions
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum IntegralType {
    Int,
    Long,
}

/// Operand types of IEEE-aware comparisons
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum FloatingType {
    Float,
    Double,
}

/// Element type of array load/store instructions
///
/// Unlike [`JvmType`], this keeps the narrow integer types apart since arrays store them packed.
#[derive(Debug, Copy, Clone, Hash, Eq, PartialEq)]
pub enum ArrayElement {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl From<NumericType> for JvmType {
    fn from(typ: NumericType) -> Self {
        match typ {
            NumericType::Int => JvmType::Int,
            NumericType::Long => JvmType::Long,
            NumericType::Float => JvmType::Float,
            NumericType::Double => JvmType::Double,
        }
    }
}

impl From<IntegralType> for JvmType {
    fn from(typ: IntegralType) -> Self {
        match typ {
            IntegralType::Int => JvmType::Int,
            IntegralType::Long => JvmType::Long,
        }
    }
}

impl From<FloatingType> for JvmType {
    fn from(typ: FloatingType) -> Self {
        match typ {
            FloatingType::Float => JvmType::Float,
            FloatingType::Double => JvmType::Double,
        }
    }
}

impl From<ArrayElement> for JvmType {
    fn from(typ: ArrayElement) -> Self {
        match typ {
            ArrayElement::Boolean
            | ArrayElement::Byte
            | ArrayElement::Char
            | ArrayElement::Short
            | ArrayElement::Int => JvmType::Int,
            ArrayElement::Long => JvmType::Long,
            ArrayElement::Float => JvmType::Float,
            ArrayElement::Double => JvmType::Double,
            ArrayElement::Reference => JvmType::Reference,
        }
    }
}

impl From<IntegralType> for NumericType {
    fn from(typ: IntegralType) -> Self {
        match typ {
            IntegralType::Int => NumericType::Int,
            IntegralType::Long => NumericType::Long,
        }
    }
}

impl From<FloatingType> for NumericType {
    fn from(typ: FloatingType) -> Self {
        match typ {
            FloatingType::Float => NumericType::Float,
            FloatingType::Double => NumericType::Double,
        }
    }
}

impl From<&FieldType> for ArrayElement {
    fn from(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Base(BaseType::Boolean) => ArrayElement::Boolean,
            FieldType::Base(BaseType::Byte) => ArrayElement::Byte,
            FieldType::Base(BaseType::Char) => ArrayElement::Char,
            FieldType::Base(BaseType::Short) => ArrayElement::Short,
            FieldType::Base(BaseType::Int) => ArrayElement::Int,
            FieldType::Base(BaseType::Long) => ArrayElement::Long,
            FieldType::Base(BaseType::Float) => ArrayElement::Float,
            FieldType::Base(BaseType::Double) => ArrayElement::Double,
            FieldType::Ref(_) => ArrayElement::Reference,
        }
    }
}

impl ArrayElement {
    /// Precise type of elements, if this is a primitive element type
    pub fn base_type(&self) -> Option<BaseType> {
        let base_type = match self {
            ArrayElement::Boolean => BaseType::Boolean,
            ArrayElement::Byte => BaseType::Byte,
            ArrayElement::Char => BaseType::Char,
            ArrayElement::Short => BaseType::Short,
            ArrayElement::Int => BaseType::Int,
            ArrayElement::Long => BaseType::Long,
            ArrayElement::Float => BaseType::Float,
            ArrayElement::Double => BaseType::Double,
            ArrayElement::Reference => return None,
        };
        Some(base_type)
    }

    /// Element type of loads/stores on an array of the given type
    ///
    /// Returns `None` if the type is not an array type.
    pub fn of_array(array_type: &RefType) -> Option<ArrayElement> {
        array_type
            .element_type()
            .map(|element_type| ArrayElement::from(&element_type))
    }
}

impl TryFrom<JvmType> for NumericType {
    type Error = Error;

    fn try_from(typ: JvmType) -> Result<Self, Error> {
        match typ {
            JvmType::Int => Ok(NumericType::Int),
            JvmType::Long => Ok(NumericType::Long),
            JvmType::Float => Ok(NumericType::Float),
            JvmType::Double => Ok(NumericType::Double),
            JvmType::Reference => Err(Error::UnsupportedOperand {
                operand: typ.to_string(),
                expected: "int, long, float, or double",
            }),
        }
    }
}

impl TryFrom<JvmType> for IntegralType {
    type Error = Error;

    fn try_from(typ: JvmType) -> Result<Self, Error> {
        match typ {
            JvmType::Int => Ok(IntegralType::Int),
            JvmType::Long => Ok(IntegralType::Long),
            _ => Err(Error::UnsupportedOperand {
                operand: typ.to_string(),
                expected: "int or long",
            }),
        }
    }
}

impl TryFrom<JvmType> for FloatingType {
    type Error = Error;

    fn try_from(typ: JvmType) -> Result<Self, Error> {
        match typ {
            JvmType::Float => Ok(FloatingType::Float),
            JvmType::Double => Ok(FloatingType::Double),
            _ => Err(Error::UnsupportedOperand {
                operand: typ.to_string(),
                expected: "float or double",
            }),
        }
    }
}

impl TryFrom<NumericType> for IntegralType {
    type Error = Error;

    fn try_from(typ: NumericType) -> Result<Self, Error> {
        IntegralType::try_from(JvmType::from(typ))
    }
}

impl TryFrom<NumericType> for FloatingType {
    type Error = Error;

    fn try_from(typ: NumericType) -> Result<Self, Error> {
        FloatingType::try_from(JvmType::from(typ))
    }
}
