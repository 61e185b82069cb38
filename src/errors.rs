use crate::jvm::JvmType;
use crate::refs::LocalId;
use crate::stack::Label;
use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// An instruction's pop requirement does not match the incoming stack
    StackShape {
        instruction: String,
        kind: ShapeErrorKind,
    },

    /// Execution falls off the end of the body
    UnexpectedEnd { instruction: String },

    /// The last element of a protected region does not come at or after its first element
    IllegalRegionRange { first: String, last: String },

    /// A local is assigned values whose types cannot be unified
    TypeUnification {
        local: LocalId,
        first: String,
        second: String,
    },

    /// Instruction cannot be constructed with these operands
    UnsupportedInstruction {
        instruction: String,
        reason: &'static str,
    },

    /// Type used where an instruction does not support it
    UnsupportedOperand {
        operand: String,
        expected: &'static str,
    },

    /// No coarse type can be derived for a local
    UntypedLocal(LocalId),

    /// Parameters given do not match the parameter locals of the body
    ParameterCount { expected: usize, found: usize },

    /// A label was referred to but never placed
    UnplacedLabel(Label),

    /// A label was placed twice
    DuplicateLabel(Label),

    /// Reference to an instruction, statement, or local which is not in the body
    DanglingReference(String),

    /// Error converting a particular method
    InMethod { method: String, error: Box<Error> },
}

#[derive(Debug)]
pub enum ShapeErrorKind {
    EmptyStack,
    InvalidType { expected: JvmType, found: JvmType },

    /// Stack shuffle with no form matching the widths on top of the stack
    InvalidWidth(usize),

    /// Two predecessors disagree on the stack at a join point
    IncompatibleShapes(Vec<JvmType>, Vec<JvmType>),
}

impl Error {
    /// Attach the identity of the method being converted
    pub fn in_method(self, method: impl Into<String>) -> Error {
        Error::InMethod {
            method: method.into(),
            error: Box::new(self),
        }
    }

    /// Innermost error, skipping method context
    pub fn root(&self) -> &Error {
        match self {
            Error::InMethod { error, .. } => error.root(),
            other => other,
        }
    }
}

fn render_shape(shape: &[JvmType]) -> String {
    let rendered: Vec<String> = shape.iter().map(|typ| typ.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

impl fmt::Display for ShapeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeErrorKind::EmptyStack => f.write_str("stack is empty"),
            ShapeErrorKind::InvalidType { expected, found } => {
                write!(f, "expected {} but found {}", expected, found)
            }
            ShapeErrorKind::InvalidWidth(width) => {
                write!(f, "no form applies to a value of width {}", width)
            }
            ShapeErrorKind::IncompatibleShapes(first, second) => write!(
                f,
                "incompatible stacks {} and {}",
                render_shape(first),
                render_shape(second)
            ),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::StackShape { instruction, kind } => {
                write!(f, "bad stack at `{}`: {}", instruction, kind)
            }
            Error::UnexpectedEnd { instruction } => {
                write!(f, "execution runs past the end after `{}`", instruction)
            }
            Error::IllegalRegionRange { first, last } => {
                write!(f, "protected region ends at {} before it starts at {}", last, first)
            }
            Error::TypeUnification {
                local,
                first,
                second,
            } => write!(f, "local {} is assigned both {} and {}", local, first, second),
            Error::UnsupportedInstruction {
                instruction,
                reason,
            } => write!(f, "unsupported instruction `{}`: {}", instruction, reason),
            Error::UnsupportedOperand { operand, expected } => {
                write!(f, "unsupported operand {} (expected {})", operand, expected)
            }
            Error::UntypedLocal(local) => write!(f, "cannot derive a type for local {}", local),
            Error::ParameterCount { expected, found } => write!(
                f,
                "body has {} parameter locals but {} parameters were given",
                expected, found
            ),
            Error::UnplacedLabel(label) => write!(f, "label {:?} was never placed", label),
            Error::DuplicateLabel(label) => write!(f, "label {:?} was placed twice", label),
            Error::DanglingReference(what) => write!(f, "dangling reference to {}", what),
            Error::InMethod { method, error } => write!(f, "in {}: {}", method, error),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::InMethod { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn method_context() {
        let error = Error::UnexpectedEnd {
            instruction: String::from("iadd"),
        }
        .in_method("Foo(I)");
        assert!(matches!(error.root(), Error::UnexpectedEnd { .. }));
        assert_eq!(
            error.to_string(),
            "in Foo(I): execution runs past the end after `iadd`"
        );
    }
}
