mod insert_list;

pub use insert_list::*;
pub(crate) use insert_list::arena_key;

/// Elements with a width (eg. values on the operand stack, where `long` and `double` take up two
/// slots)
pub trait Width {
    fn width(&self) -> usize;
}
