//! Expression tree representation of method bodies
//!
//! There is no operand stack: every intermediate value is either part of an expression tree or
//! stored in a [`LocalId`]. Statements execute in order and branch by referring to other
//! statements.

mod body;
mod display;
mod effects;
mod expr;
mod stmt;

pub use body::*;
pub use effects::*;
pub use expr::*;
pub use stmt::*;
