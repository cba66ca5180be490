//! Encoding table model
//!
//! The table is read once from TOML and never mutated afterwards. Its layout:
//!
//! ```toml
//! ISA  = "RV32"
//! XLEN = 32
//!
//! [CONST]
//! OP_IMM = 0b0010011
//!
//! [field]
//! rd      = ["11:7"]
//! jal_imm = { bits = ["30:21", "20", "19:12", "31"], offset = 1 }
//!
//! [I]
//! addi = { match = { opcode = "OP_IMM", funct3 = 0 }, output = ["rd", "rs1", "imm"] }
//! ```
//!
//! Descriptor strings are kept raw here; they are parsed when the field is compiled so that a
//! malformed field only affects itself.
use std::str::FromStr;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::{Error, Location, NameKind, Result},
    field::MAX_WORD_WIDTH,
};

const KEY_ISA: &str = "ISA";
const KEY_WORD_WIDTH: &str = "XLEN";
const KEY_CONST: &str = "CONST";
const KEY_FIELD: &str = "field";

/// Required value of a fixed field, as written in the table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldValue {
    Literal(u64),
    /// Name of an entry in the `CONST` section
    Symbol(String),
}

/// A field declaration from the `field` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDecl {
    pub name: String,
    /// Raw bit-position strings in declaration order
    pub bits: Vec<String>,
    pub offset: u32,
}

/// One decodable instruction variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    pub extension: String,
    /// Field name to required value; all must hold for a word to match
    pub fixed_fields: IndexMap<String, FieldValue>,
    /// Fields extracted and passed to the handler on a match
    pub output_fields: Vec<String>,
}

/// A named group of operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub name: String,
    pub operations: Vec<Operation>,
}

/// In-memory form of a validated encoding table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingTable {
    isa_name: String,
    word_width: u32,
    constants: IndexMap<String, u64>,
    fields: IndexMap<String, FieldDecl>,
    extensions: IndexMap<String, Extension>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldDoc {
    Bits(Vec<String>),
    Detailed {
        bits: Vec<String>,
        #[serde(default)]
        offset: u32,
    },
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct OperationDoc {
    #[serde(rename = "match", alias = "fixed")]
    fixed: IndexMap<String, toml::Value>,
    #[serde(default, alias = "out")]
    output: Vec<String>,
}

/// Parse an integer literal written as a string: decimal, `0x`, `0b` or `0o`, with optional
/// `_` separators
pub fn parse_literal(text: &str) -> Option<u64> {
    let text = text.trim().replace('_', "");
    let (digits, radix) = match text.get(..2) {
        Some("0x") | Some("0X") => (&text[2..], 16),
        Some("0b") | Some("0B") => (&text[2..], 2),
        Some("0o") | Some("0O") => (&text[2..], 8),
        _ => (text.as_str(), 10),
    };
    if digits.is_empty() {
        return None;
    }
    u64::from_str_radix(digits, radix).ok()
}

fn integer(value: &toml::Value, location: impl Fn() -> Location) -> Result<u64> {
    match value {
        toml::Value::Integer(n) if *n >= 0 => Ok(*n as u64),
        toml::Value::Integer(n) => {
            Err(Error::format(location(), format!("negative value {n} is not allowed")))
        }
        toml::Value::String(s) => parse_literal(s).ok_or_else(|| {
            Error::format(location(), format!("`{s}` is not an integer literal"))
        }),
        other => Err(Error::format(
            location(),
            format!("expected an integer, found {}", other.type_str()),
        )),
    }
}

fn field_value(value: &toml::Value, location: impl Fn() -> Location) -> Result<FieldValue> {
    match value {
        toml::Value::String(s) => Ok(parse_literal(s)
            .map(FieldValue::Literal)
            .unwrap_or_else(|| FieldValue::Symbol(s.trim().to_string()))),
        other => integer(other, location).map(FieldValue::Literal),
    }
}

impl EncodingTable {
    /// Parse and validate a table from TOML source.
    ///
    /// Fails with [`Error::Format`] when the document is not valid TOML or a required key is
    /// missing or malformed, and with [`Error::Reference`] when an operation names a field or
    /// constant the table does not declare.
    pub fn parse(source: &str) -> Result<Self> {
        let doc: toml::Table = source
            .parse()
            .map_err(|e: toml::de::Error| Error::format(Location::Table, e.message()))?;

        let isa_name = match doc.get(KEY_ISA) {
            Some(toml::Value::String(name)) => name.clone(),
            Some(other) => {
                return Err(Error::format(
                    Location::key(KEY_ISA),
                    format!("expected a string, found {}", other.type_str()),
                ))
            }
            None => return Err(Error::format(Location::key(KEY_ISA), "missing required key")),
        };

        let word_width = match doc.get(KEY_WORD_WIDTH) {
            Some(value) => integer(value, || Location::key(KEY_WORD_WIDTH))?,
            None => {
                return Err(Error::format(Location::key(KEY_WORD_WIDTH), "missing required key"))
            }
        };
        if word_width == 0 || word_width > MAX_WORD_WIDTH as u64 {
            return Err(Error::format(
                Location::key(KEY_WORD_WIDTH),
                format!("word width {word_width} is outside 1..={MAX_WORD_WIDTH}"),
            ));
        }
        let word_width = word_width as u32;

        let mut constants = IndexMap::new();
        if let Some(section) = doc.get(KEY_CONST) {
            for (name, value) in section_table(section.clone(), KEY_CONST)? {
                let value = integer(&value, || Location::key(format!("{KEY_CONST}.{name}")))?;
                constants.insert(name, value);
            }
        }

        let mut fields = IndexMap::new();
        if let Some(section) = doc.get(KEY_FIELD) {
            for (name, value) in section_table(section.clone(), KEY_FIELD)? {
                let (bits, offset) = match value.try_into::<FieldDoc>() {
                    Ok(FieldDoc::Bits(bits)) => (bits, 0),
                    Ok(FieldDoc::Detailed { bits, offset }) => (bits, offset),
                    Err(_) => {
                        return Err(Error::format(
                            Location::field(&name),
                            "expected a list of bit positions or `{ bits = [...], offset = N }`",
                        ))
                    }
                };
                fields.insert(name.clone(), FieldDecl { name, bits, offset });
            }
        }

        let mut extensions = IndexMap::new();
        let reserved = [KEY_ISA, KEY_WORD_WIDTH, KEY_CONST, KEY_FIELD];
        for (ext_name, section) in
            doc.into_iter().filter(|(key, _)| !reserved.contains(&key.as_str()))
        {
            let operations = section_table(section, &ext_name)?
                .into_iter()
                .map(|(op_name, value)| parse_operation(&ext_name, op_name, value))
                .collect::<Result<Vec<_>>>()?;
            extensions.insert(ext_name.clone(), Extension { name: ext_name, operations });
        }

        if fields.is_empty() && extensions.is_empty() {
            return Err(Error::format(
                Location::Table,
                "table declares neither a field section nor any extension",
            ));
        }

        let table = Self { isa_name, word_width, constants, fields, extensions };
        table.check_references()?;
        Ok(table)
    }

    /// Every name an operation uses must be declared
    fn check_references(&self) -> Result<()> {
        for op in self.operations() {
            let location = || Location::operation(&op.extension, &op.name);
            for (field, value) in &op.fixed_fields {
                if !self.fields.contains_key(field) {
                    return Err(Error::Reference {
                        location: location(),
                        kind: NameKind::Field,
                        name: field.clone(),
                    });
                }
                if let FieldValue::Symbol(name) = value {
                    if !self.constants.contains_key(name) {
                        return Err(Error::Reference {
                            location: location(),
                            kind: NameKind::Constant,
                            name: name.clone(),
                        });
                    }
                }
            }
            if let Some(missing) = op.output_fields.iter().find(|f| !self.fields.contains_key(*f)) {
                return Err(Error::Reference {
                    location: location(),
                    kind: NameKind::Field,
                    name: missing.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn isa_name(&self) -> &str {
        &self.isa_name
    }

    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    /// Extension sections in declaration order
    pub fn extensions(&self) -> impl ExactSizeIterator<Item = &Extension> {
        self.extensions.values()
    }

    pub fn extension(&self, name: &str) -> Option<&Extension> {
        self.extensions.get(name)
    }

    pub fn constants(&self) -> &IndexMap<String, u64> {
        &self.constants
    }

    /// Field declarations in declaration order
    pub fn fields(&self) -> impl ExactSizeIterator<Item = &FieldDecl> {
        self.fields.values()
    }

    /// All operations of all extensions, in declaration order
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.extensions.values().flat_map(|ext| ext.operations.iter())
    }

    pub fn lookup_constant(&self, name: &str) -> Result<u64> {
        self.constants
            .get(name)
            .copied()
            .ok_or_else(|| Error::NotFound { kind: NameKind::Constant, name: name.to_string() })
    }

    pub fn lookup_field(&self, name: &str) -> Result<&FieldDecl> {
        self.fields
            .get(name)
            .ok_or_else(|| Error::NotFound { kind: NameKind::Field, name: name.to_string() })
    }

    /// Resolve a fixed-field value, looking symbols up in the `CONST` section
    pub fn resolve_value(&self, value: &FieldValue) -> Result<u64> {
        match value {
            FieldValue::Literal(n) => Ok(*n),
            FieldValue::Symbol(name) => self.lookup_constant(name),
        }
    }

    /// Keep only the requested extensions that the table declares, in request order.
    /// Unknown names are skipped with a warning.
    pub fn select_extensions<S: AsRef<str>>(&self, names: &[S]) -> Self {
        let mut extensions = IndexMap::new();
        for name in names.iter().map(AsRef::as_ref) {
            match self.extensions.get(name) {
                Some(ext) => {
                    extensions.insert(name.to_string(), ext.clone());
                }
                None => {
                    warn!(extension = name, isa = %self.isa_name, "extension not in table, skipping")
                }
            }
        }
        Self { extensions, ..self.clone() }
    }
}

impl FromStr for EncodingTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn section_table(value: toml::Value, key: &str) -> Result<toml::Table> {
    match value {
        toml::Value::Table(table) => Ok(table),
        other => Err(Error::format(
            Location::key(key),
            format!("expected a table, found {}", other.type_str()),
        )),
    }
}

fn parse_operation(extension: &str, name: String, value: toml::Value) -> Result<Operation> {
    let location = || Location::operation(extension, &name);
    let doc: OperationDoc = value.try_into().map_err(|e: toml::de::Error| {
        Error::format(location(), format!("malformed operation entry: {}", e.message()))
    })?;

    let fixed_fields = doc
        .fixed
        .iter()
        .map(|(field, value)| Ok((field.clone(), field_value(value, location)?)))
        .collect::<Result<IndexMap<_, _>>>()?;

    Ok(Operation {
        name,
        extension: extension.to_string(),
        fixed_fields,
        output_fields: doc.output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"
        ISA = "RV32"
        XLEN = 32

        [CONST]
        OP_IMM = 0b0010011
        OP_REG = "0x33"

        [field]
        opcode = ["6:0"]
        rd = ["11:7"]
        funct3 = ["14:12"]
        jal_imm = { bits = ["30:21", "20", "19:12", "31"], offset = 1 }

        [I]
        addi = { match = { opcode = "OP_IMM", funct3 = 0 }, output = ["rd"] }
        add = { fixed = { opcode = "OP_REG", funct3 = "0b000" }, out = ["rd"] }
    "#;

    #[test]
    fn test_parse_small_table() {
        let table = EncodingTable::parse(SMALL).unwrap();
        assert_eq!(table.isa_name(), "RV32");
        assert_eq!(table.word_width(), 32);
        assert_eq!(table.lookup_constant("OP_IMM").unwrap(), 0b0010011);
        assert_eq!(table.lookup_constant("OP_REG").unwrap(), 0x33);
        assert_eq!(table.lookup_field("jal_imm").unwrap().offset, 1);
        assert_eq!(table.lookup_field("rd").unwrap().bits, vec!["11:7".to_string()]);

        let ext = table.extension("I").unwrap();
        let names: Vec<&str> = ext.operations.iter().map(|op| op.name.as_str()).collect();
        assert_eq!(names, vec!["addi", "add"]);
        assert_eq!(ext.operations[1].fixed_fields["funct3"], FieldValue::Literal(0));
        assert_eq!(ext.operations[0].fixed_fields["opcode"], FieldValue::Symbol("OP_IMM".into()));
    }

    #[test]
    fn test_lookup_not_found() {
        let table = EncodingTable::parse(SMALL).unwrap();
        assert_eq!(
            table.lookup_constant("OP_LUI"),
            Err(Error::NotFound { kind: NameKind::Constant, name: "OP_LUI".into() })
        );
        assert!(matches!(table.lookup_field("rs9"), Err(Error::NotFound { .. })));
    }

    #[test]
    fn test_missing_required_keys() {
        let err = EncodingTable::parse("XLEN = 32\n[field]\nrd = [\"11:7\"]").unwrap_err();
        assert_eq!(err.location(), Some(&Location::key("ISA")));

        let err = EncodingTable::parse("ISA = \"X\"\n[field]\nrd = [\"11:7\"]").unwrap_err();
        assert_eq!(err.location(), Some(&Location::key("XLEN")));

        let err = EncodingTable::parse("ISA = \"X\"\nXLEN = 32").unwrap_err();
        assert_eq!(err.location(), Some(&Location::Table));

        let err = EncodingTable::parse("ISA = \"X\"\nXLEN = 65\n[field]\nrd = [\"1\"]").unwrap_err();
        assert_eq!(err.location(), Some(&Location::key("XLEN")));
    }

    #[test]
    fn test_unknown_names_are_reference_errors() {
        let source = SMALL.replace("\"OP_REG\", funct3", "\"OP_ALU\", funct3");
        let err = EncodingTable::parse(&source).unwrap_err();
        assert_eq!(
            err,
            Error::Reference {
                location: Location::operation("I", "add"),
                kind: NameKind::Constant,
                name: "OP_ALU".into(),
            }
        );

        let source = SMALL.replace("output = [\"rd\"]", "output = [\"rs1\"]");
        let err = EncodingTable::parse(&source).unwrap_err();
        assert!(matches!(err, Error::Reference { kind: NameKind::Field, .. }));
    }

    #[test]
    fn test_malformed_operation_entry() {
        let source = SMALL.replace("out = [\"rd\"]", "args = [\"rd\"]");
        let err = EncodingTable::parse(&source).unwrap_err();
        assert_eq!(err.location(), Some(&Location::operation("I", "add")));
    }

    #[test]
    fn test_select_extensions() {
        let source = format!("{SMALL}\n[M]\nmul = {{ match = {{ opcode = 0x33 }} }}\n");
        let table = EncodingTable::parse(&source).unwrap();
        let selected = table.select_extensions(&["M", "F"]);
        let names: Vec<&str> = selected.extensions().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["M"]);
        assert_eq!(selected.fields().len(), table.fields().len());
    }

    #[test]
    fn test_parse_literal() {
        assert_eq!(parse_literal("0b0110_011"), Some(0b0110011));
        assert_eq!(parse_literal("0x1F"), Some(31));
        assert_eq!(parse_literal("0o17"), Some(15));
        assert_eq!(parse_literal("42"), Some(42));
        assert_eq!(parse_literal("0x"), None);
        assert_eq!(parse_literal("OP_IMM"), None);
    }
}
