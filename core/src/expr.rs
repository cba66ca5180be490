//! Expression trees for generated code
//!
//! Generation produces [`Expr`] values rather than text, so one compiled field can be rendered
//! in several target syntaxes (see [`crate::codegen`]) and can also be evaluated in-process.
use serde::Serialize;

use crate::field::CompiledField;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum BinOp {
    /// Bitwise and
    And,
    /// Bitwise or
    Or,
    /// Equality test, yields 0 or 1
    Eq,
    /// Short-circuit conjunction of two truth values
    LogicalAnd,
}

impl BinOp {
    /// Whether `a op (b op c)` may be printed as `a op b op c`
    pub fn is_associative(self) -> bool {
        !matches!(self, BinOp::Eq)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum ShiftDir {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Expr {
    /// A named value: the source word or an extracted field
    Var(String),
    /// Unsigned literal, printed with `width` digits of precision
    Lit { value: u64, width: u32 },
    Binary { op: BinOp, lhs: Box<Expr>, rhs: Box<Expr> },
    Shift { dir: ShiftDir, value: Box<Expr>, amount: u32 },
    /// Widen `value` to the unsigned type holding `width` bits
    Cast { value: Box<Expr>, width: u32 },
    /// Handler call; each argument is `(parameter name, value)`
    Call { callee: String, args: Vec<(String, Expr)> },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn lit(value: u64, width: u32) -> Self {
        Expr::Lit { value, width }
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary { op, lhs: Box::new(lhs), rhs: Box::new(rhs) }
    }

    pub fn shift(dir: ShiftDir, value: Expr, amount: u32) -> Self {
        Expr::Shift { dir, value: Box::new(value), amount }
    }

    pub fn cast(value: Expr, width: u32) -> Self {
        Expr::Cast { value: Box::new(value), width }
    }

    /// Left fold of `terms` with `op`; `None` for an empty list
    pub fn chain(op: BinOp, terms: impl IntoIterator<Item = Expr>) -> Option<Self> {
        terms.into_iter().reduce(|acc, term| Expr::binary(op, acc, term))
    }

    /// Operands of a left-leaning chain of `op`, in order
    pub fn flatten(&self, op: BinOp) -> Vec<&Expr> {
        match self {
            Expr::Binary { op: inner, lhs, rhs } if *inner == op && op.is_associative() => {
                let mut terms = lhs.flatten(op);
                terms.extend(rhs.flatten(op));
                terms
            }
            other => vec![other],
        }
    }

    /// Evaluate with `env` supplying variable values. Returns `None` for an unbound variable or
    /// for a call, which has no value of its own.
    pub fn eval(&self, env: &dyn Fn(&str) -> Option<u64>) -> Option<u64> {
        match self {
            Expr::Var(name) => env(name),
            Expr::Lit { value, .. } => Some(*value),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval(env)?;
                match op {
                    BinOp::LogicalAnd if lhs == 0 => Some(0),
                    BinOp::LogicalAnd => Some((rhs.eval(env)? != 0) as u64),
                    BinOp::And => Some(lhs & rhs.eval(env)?),
                    BinOp::Or => Some(lhs | rhs.eval(env)?),
                    BinOp::Eq => Some((lhs == rhs.eval(env)?) as u64),
                }
            }
            Expr::Shift { dir, value, amount } => {
                let value = value.eval(env)?;
                match dir {
                    ShiftDir::Left => value.checked_shl(*amount),
                    ShiftDir::Right => value.checked_shr(*amount),
                }
            }
            Expr::Cast { value, .. } => value.eval(env),
            Expr::Call { .. } => None,
        }
    }
}

/// Build the extraction expression of `field` reading from `source_var`.
///
/// One `(source & mask) >> shift` term per segment (`<<` when the segment moves up), combined
/// with bitwise or. Evaluated against a word, the result is the field's unsigned value of
/// `bit_length + result_offset` bits; sign extension is left to the caller.
pub fn emit_extraction(field: &CompiledField, source_var: &str) -> Expr {
    emit_extraction_from(field, &Expr::var(source_var))
}

/// [`emit_extraction`] reading from an arbitrary source expression, such as a widening cast of
/// the instruction word
pub fn emit_extraction_from(field: &CompiledField, source: &Expr) -> Expr {
    let terms = field.segments().iter().map(|seg| {
        let masked =
            Expr::binary(BinOp::And, source.clone(), Expr::lit(seg.mask, field.word_width()));
        let shift = seg.shift(field.result_offset());
        if shift >= 0 {
            Expr::shift(ShiftDir::Right, masked, shift as u32)
        } else {
            Expr::shift(ShiftDir::Left, masked, (-shift) as u32)
        }
    });
    // compiled fields always carry at least one segment
    Expr::chain(BinOp::Or, terms).unwrap_or_else(|| Expr::lit(0, field.word_width()))
}
