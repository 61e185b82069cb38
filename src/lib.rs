//! Two intermediate representations of JVM method bodies and conversions between them
//!
//! A [`stack::StackBody`] mirrors bytecode: a sequence of instructions operating on an implicit
//! operand stack. A [`refs::RefBody`] is a sequence of statements over expression trees and named
//! locals. [`conversion::stack_to_ref`] and [`conversion::ref_to_stack`] go between the two.

pub mod analysis;
pub mod conversion;
pub mod errors;
pub mod jvm;
pub mod refs;
pub mod stack;
pub mod util;

pub use conversion::{ref_to_stack, stack_to_ref, stack_to_ref_with, Pipeline, PostProcessor};
pub use errors::{Error, ShapeErrorKind};
