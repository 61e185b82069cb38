use super::{BinaryName, Constant, FieldType, MethodDescriptor, UnqualifiedName};
use std::fmt;

/// Symbolic reference to a field
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FieldRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Symbolic reference to a method
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct MethodRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,

    /// Is the owner an interface? (matters for `invokestatic` and `invokespecial`)
    pub is_interface: bool,
}

/// Dynamically computed call site (target of `invokedynamic`)
#[derive(Clone, PartialEq, Debug)]
pub struct CallSite {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,

    /// Static bootstrap method which links the call site
    pub bootstrap: MethodRef,
    pub bootstrap_arguments: Vec<Constant>,
}

impl fmt::Display for FieldRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.name)
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}
