//! Analyses over method bodies
//!
//! Control flow is shared between the two representations through [`ControlFlow`]. The stack
//! emulator only makes sense on stack bodies and reaching definitions only on ref bodies.

mod cfg;
mod emulator;
mod local_states;

pub use cfg::*;
pub use emulator::*;
pub use local_states::*;
