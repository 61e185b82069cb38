use std::fmt;
use std::ops::Not;

/// Arithmetic operators, available on every numeric type
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Bitwise operators, available on `int` and `long`
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum BitwiseOp {
    And,
    Or,
    Xor,
}

/// Shift operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// How `NaN` is treated by a floating point comparison
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Orderings usable in `int` comparisons and branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

impl OrdComparison {
    /// Comparison which gives the same result when the operands are swapped
    pub const fn flip(self) -> Self {
        match self {
            OrdComparison::EQ => OrdComparison::EQ,
            OrdComparison::GE => OrdComparison::LE,
            OrdComparison::GT => OrdComparison::LT,
            OrdComparison::LE => OrdComparison::GE,
            OrdComparison::LT => OrdComparison::GT,
            OrdComparison::NE => OrdComparison::NE,
        }
    }

    /// Restrict to an equality comparison, if possible
    pub const fn as_equality(self) -> Option<EqComparison> {
        match self {
            OrdComparison::EQ => Some(EqComparison::EQ),
            OrdComparison::NE => Some(EqComparison::NE),
            _ => None,
        }
    }
}

/// Equality tests, for references
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

impl From<EqComparison> for OrdComparison {
    fn from(comparison: EqComparison) -> Self {
        match comparison {
            EqComparison::EQ => OrdComparison::EQ,
            EqComparison::NE => OrdComparison::NE,
        }
    }
}

/// Dispatch kind of a method call
///
/// `invokedynamic` is kept separate since it targets a call site instead of a method.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeType {
    /// Does the invocation pop a receiver before the arguments?
    pub const fn has_receiver(&self) -> bool {
        !matches!(self, InvokeType::Static)
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Rem => "%",
        })
    }
}

impl fmt::Display for BitwiseOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BitwiseOp::And => "&",
            BitwiseOp::Or => "|",
            BitwiseOp::Xor => "^",
        })
    }
}

impl fmt::Display for ShiftType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShiftType::Left => "<<",
            ShiftType::LogicalRight => ">>>",
            ShiftType::ArithmeticRight => ">>",
        })
    }
}

impl fmt::Display for OrdComparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            OrdComparison::EQ => "==",
            OrdComparison::GE => ">=",
            OrdComparison::GT => ">",
            OrdComparison::LE => "<=",
            OrdComparison::LT => "<",
            OrdComparison::NE => "!=",
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn negate_and_flip() {
        for cmp in [
            OrdComparison::EQ,
            OrdComparison::GE,
            OrdComparison::GT,
            OrdComparison::LE,
            OrdComparison::LT,
            OrdComparison::NE,
        ] {
            assert_eq!(!!cmp, cmp);
            assert_eq!(cmp.flip().flip(), cmp);
        }
        assert_eq!(!OrdComparison::LT, OrdComparison::GE);
        assert_eq!(OrdComparison::LT.flip(), OrdComparison::GT);
        assert_eq!(OrdComparison::GE.as_equality(), None);
        assert_eq!(!EqComparison::EQ, EqComparison::NE);
    }
}
