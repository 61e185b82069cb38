//! Stack machine representation of method bodies

mod body;
mod builder;
mod instruction;

pub use body::*;
pub use builder::*;
pub use instruction::*;
