//! Match/dispatch builder
//!
//! An [`Operation`] from the table is resolved against the compiled fields into a
//! [`ResolvedOperation`]: every symbolic value looked up, every value checked against the width
//! of its field, and the whole encoding folded into one `(mask, pattern)` signature over the
//! instruction word. Recognizer and dispatch expressions are built from the resolved form.
use std::{fmt, sync::Arc};

use itertools::Itertools;
use serde::Serialize;

use crate::{
    codegen::ident,
    error::{Error, Location, NameKind, Result},
    expr::{BinOp, Expr},
    field::{CompiledField, FieldSet},
    table::{EncodingTable, FieldValue, Operation},
};

/// Extension and operation name, e.g. `I.addi`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct OperationId {
    pub extension: String,
    pub name: String,
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.extension, self.name)
    }
}

/// A fixed field together with its resolved value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedField {
    pub field: Arc<CompiledField>,
    pub value: u64,
}

/// An operation whose names have all been resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOperation {
    id: OperationId,
    fixed: Vec<FixedField>,
    output: Vec<Arc<CompiledField>>,
    mask: u64,
    pattern: u64,
}

impl ResolvedOperation {
    /// Resolve `op` against `table` constants and the compiled `fields`.
    ///
    /// Fails with [`Error::Reference`] when a field did not compile or a constant is missing, and
    /// with [`Error::Format`] when a value does not fit its field or two fixed fields sharing
    /// source bits disagree on them.
    pub fn resolve(op: &Operation, table: &EncodingTable, fields: &FieldSet) -> Result<Self> {
        let location = || Location::operation(&op.extension, &op.name);
        let compiled = |name: &str| {
            fields.get(name).cloned().ok_or_else(|| Error::Reference {
                location: location(),
                kind: NameKind::Field,
                name: name.to_string(),
            })
        };

        let mut mask = 0;
        let mut pattern = 0;
        let mut fixed = Vec::with_capacity(op.fixed_fields.len());
        for (name, value) in &op.fixed_fields {
            let field = compiled(name)?;
            let value = match value {
                FieldValue::Literal(n) => *n,
                FieldValue::Symbol(sym) => {
                    table.lookup_constant(sym).map_err(|_| Error::Reference {
                        location: location(),
                        kind: NameKind::Constant,
                        name: sym.clone(),
                    })?
                }
            };
            if !field.fits(value) {
                return Err(Error::format(
                    location(),
                    format!(
                        "value {value:#x} does not fit field `{name}` ({} bits, offset {})",
                        field.bit_length(),
                        field.result_offset()
                    ),
                ));
            }

            let bits = field.deposit(value);
            let shared = mask & field.source_mask();
            if pattern & shared != bits & shared {
                return Err(Error::format(
                    location(),
                    format!(
                        "`{name} = {value:#x}` contradicts bits {shared:#x} fixed by another field"
                    ),
                ));
            }
            mask |= field.source_mask();
            pattern |= bits;
            fixed.push(FixedField { field, value });
        }

        let output =
            op.output_fields.iter().map(|name| compiled(name)).collect::<Result<Vec<_>>>()?;

        Ok(Self {
            id: OperationId { extension: op.extension.clone(), name: op.name.clone() },
            fixed,
            output,
            mask,
            pattern,
        })
    }

    pub fn id(&self) -> &OperationId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn extension(&self) -> &str {
        &self.id.extension
    }

    pub fn fixed(&self) -> &[FixedField] {
        &self.fixed
    }

    pub fn output(&self) -> &[Arc<CompiledField>] {
        &self.output
    }

    /// Source bits constrained by the fixed fields
    pub fn mask(&self) -> u64 {
        self.mask
    }

    /// Required value of the bits in [`ResolvedOperation::mask`]
    pub fn pattern(&self) -> u64 {
        self.pattern
    }

    /// Number of constrained source bits
    pub fn specificity(&self) -> u32 {
        self.mask.count_ones()
    }

    /// Required value of the named field, if the operation fixes it
    pub fn fixed_value(&self, field: &str) -> Option<u64> {
        self.fixed.iter().find(|f| f.field.name() == field).map(|f| f.value)
    }

    pub fn matches(&self, word: u64) -> bool {
        word & self.mask == self.pattern
    }

    /// Output field values of `word`, in output order
    pub fn arguments(&self, word: u64) -> Vec<(String, u64)> {
        self.output.iter().map(|f| (f.name().to_string(), f.extract(word))).collect()
    }

    /// Whether some instruction word satisfies both encodings
    pub fn conflicts_with(&self, other: &ResolvedOperation) -> bool {
        let common = self.mask & other.mask;
        self.pattern & common == other.pattern & common
    }
}

/// Boolean expression testing every fixed field of `op`. An operation without fixed fields is
/// recognized by the constant `1`.
pub fn build_recognizer(op: &ResolvedOperation) -> Expr {
    build_recognizer_excluding(op, &[]).unwrap_or_else(|| Expr::lit(1, 1))
}

/// Like [`build_recognizer`], without the tests on fields named in `decided`. Returns `None`
/// when no test remains.
pub fn build_recognizer_excluding(op: &ResolvedOperation, decided: &[&str]) -> Option<Expr> {
    let tests = op.fixed.iter().filter(|f| !decided.contains(&f.field.name())).map(|f| {
        Expr::binary(
            BinOp::Eq,
            Expr::var(ident(f.field.name())),
            Expr::lit(f.value, f.field.value_width()),
        )
    });
    Expr::chain(BinOp::LogicalAnd, tests)
}

/// Handler call passing every output field bound to its own extracted variable
pub fn build_dispatch(op: &ResolvedOperation) -> Expr {
    let args = op
        .output
        .iter()
        .map(|f| {
            let name = ident(f.name());
            (name.clone(), Expr::var(name))
        })
        .collect();
    Expr::Call { callee: ident(op.name()), args }
}

/// Two operations that some instruction word satisfies at once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ambiguity {
    pub first: OperationId,
    pub second: OperationId,
    /// A word matching both
    pub example: u64,
}

impl fmt::Display for Ambiguity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}` and `{}` both match {:#x}", self.first, self.second, self.example)
    }
}

/// Every pair of operations whose encodings overlap, in declaration order
pub fn find_ambiguities<'a>(
    ops: impl IntoIterator<Item = &'a ResolvedOperation>,
) -> Vec<Ambiguity> {
    let ops: Vec<_> = ops.into_iter().collect();
    ops.into_iter()
        .tuple_combinations()
        .filter(|(a, b)| a.conflicts_with(b))
        .map(|(a, b)| Ambiguity {
            first: a.id.clone(),
            second: b.id.clone(),
            example: a.pattern | b.pattern,
        })
        .collect()
}
