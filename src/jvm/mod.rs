//! Vocabulary shared by both representations of method bodies
//!
//! Names, descriptors, constants, and member references are kept symbolic: there is no constant
//! pool and no class file layout here, only what is needed to describe what an instruction or
//! expression operates on.

mod bytecode;
mod constants;
mod descriptors;
mod jvm_type;
mod members;
mod names;

pub use bytecode::*;
pub use constants::*;
pub use descriptors::*;
pub use jvm_type::*;
pub use members::*;
pub use names::*;
