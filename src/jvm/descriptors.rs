use super::{BinaryName, Name};
use crate::util::Width;
use std::fmt;

/// Types with a textual descriptor form (`I`, `[Ljava/lang/String;`, `(JI)V`, ...)
pub trait RenderDescriptor {
    fn render_to(&self, out: &mut String);

    fn render(&self) -> String {
        let mut out = String::new();
        self.render_to(&mut out);
        out
    }
}

/// Primitive types, as they can appear in fields, locals, and array elements
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl BaseType {
    /// Types which occupy an `int` slot once loaded
    pub const fn is_int_like(&self) -> bool {
        !matches!(self, BaseType::Long | BaseType::Float | BaseType::Double)
    }

    const fn code(&self) -> char {
        match self {
            BaseType::Boolean => 'Z',
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Short => 'S',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Float => 'F',
            BaseType::Double => 'D',
        }
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        if matches!(self, BaseType::Long | BaseType::Double) {
            2
        } else {
            1
        }
    }
}

/// Class or array type
///
/// Multi-dimensional arrays nest: `int[][]` is an array whose elements are `int[]`.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType {
    Object(BinaryName),
    Array(Box<FieldType>),
}

impl RefType {
    /// Array with elements of the given type
    pub fn array(element: FieldType) -> RefType {
        RefType::Array(Box::new(element))
    }

    pub fn array_dimensions(&self) -> usize {
        let mut dimensions = 0;
        let mut current = self;
        while let RefType::Array(element) = current {
            dimensions += 1;
            match element.as_ref() {
                FieldType::Ref(inner) => current = inner,
                FieldType::Base(_) => break,
            }
        }
        dimensions
    }

    /// Type of one element, or `None` for class types
    pub fn element_type(&self) -> Option<FieldType> {
        match self {
            RefType::Object(_) => None,
            RefType::Array(element) => Some(element.as_ref().clone()),
        }
    }
}

/// Type of a field, local variable, or parameter
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType {
    Base(BaseType),
    Ref(RefType),
}

impl FieldType {
    pub const fn int() -> FieldType {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType {
        FieldType::Base(BaseType::Double)
    }

    pub const fn boolean() -> FieldType {
        FieldType::Base(BaseType::Boolean)
    }

    pub const fn byte() -> FieldType {
        FieldType::Base(BaseType::Byte)
    }

    pub const fn object(class: BinaryName) -> FieldType {
        FieldType::Ref(RefType::Object(class))
    }

    pub fn array(element: FieldType) -> FieldType {
        FieldType::Ref(RefType::array(element))
    }
}

impl Width for FieldType {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base) => base.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

/// Parameter and return types of a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,

    /// `None` for `void`
    pub return_type: Option<FieldType>,
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, out: &mut String) {
        out.push(self.code());
    }
}

impl RenderDescriptor for RefType {
    fn render_to(&self, out: &mut String) {
        match self {
            RefType::Object(class) => {
                out.push('L');
                out.push_str(class.as_str());
                out.push(';');
            }
            RefType::Array(element) => {
                out.push('[');
                element.render_to(out);
            }
        }
    }
}

impl RenderDescriptor for FieldType {
    fn render_to(&self, out: &mut String) {
        match self {
            FieldType::Base(base) => base.render_to(out),
            FieldType::Ref(reference) => reference.render_to(out),
        }
    }
}

impl RenderDescriptor for MethodDescriptor {
    fn render_to(&self, out: &mut String) {
        out.push('(');
        self.parameters
            .iter()
            .for_each(|parameter| parameter.render_to(out));
        out.push(')');
        match &self.return_type {
            Some(return_type) => return_type.render_to(out),
            None => out.push('V'),
        }
    }
}

macro_rules! display_as_descriptor {
    ($($ty:ty),*) => {
        $(
            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.render())
                }
            }
        )*
    };
}

display_as_descriptor!(BaseType, RefType, FieldType, MethodDescriptor);
