//! Errors raised while loading an encoding table or compiling its entries
use std::fmt;

/// Position inside the encoding table that an error refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// The document as a whole
    Table,
    /// A top-level key such as `ISA` or `CONST.OP_IMM`
    Key(String),
    /// A declaration in the `field` section
    Field { name: String },
    /// One bit-position string of a field declaration
    Descriptor { field: String, descriptor: String },
    /// An operation entry inside an extension section
    Operation { extension: String, operation: String },
}

impl Location {
    pub fn key(key: impl Into<String>) -> Self {
        Location::Key(key.into())
    }

    pub fn field(name: impl Into<String>) -> Self {
        Location::Field { name: name.into() }
    }

    pub fn operation(extension: impl Into<String>, operation: impl Into<String>) -> Self {
        Location::Operation { extension: extension.into(), operation: operation.into() }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Table => write!(f, "table"),
            Location::Key(key) => write!(f, "key \"{key}\""),
            Location::Field { name } => write!(f, "field \"{name}\""),
            Location::Descriptor { field, descriptor } => {
                write!(f, "field \"{field}\", descriptor \"{descriptor}\"")
            }
            Location::Operation { extension, operation } => {
                write!(f, "extension \"{extension}\", operation \"{operation}\"")
            }
        }
    }
}

/// Kind of name that failed to resolve
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum NameKind {
    Field,
    Constant,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NameKind::Field => write!(f, "field"),
            NameKind::Constant => write!(f, "constant"),
        }
    }
}

/// Decoder generator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Malformed bit-position descriptor or malformed table shape
    #[error("format error at {location}: {reason}")]
    Format { location: Location, reason: String },

    /// A name is used but never declared
    #[error("{location} references unknown {kind} `{name}`")]
    Reference { location: Location, kind: NameKind, name: String },

    /// Direct lookup of a name that the table does not declare
    #[error("no {kind} named `{name}` in table")]
    NotFound { kind: NameKind, name: String },

    /// Two descriptors of one field claim the same source bits
    #[error("field `{field}`: descriptors `{first}` and `{second}` both claim source bits {bits:#x}")]
    Overlap { field: String, first: String, second: String, bits: u64 },

    /// No operation recognizes the instruction word
    #[error("no operation matches instruction word {word:#x}")]
    NoMatch { word: u64 },
}

impl Error {
    pub(crate) fn format(location: Location, reason: impl Into<String>) -> Self {
        Error::Format { location, reason: reason.into() }
    }

    /// The table location this error points at, if it has one
    pub fn location(&self) -> Option<&Location> {
        match self {
            Error::Format { location, .. } | Error::Reference { location, .. } => Some(location),
            Error::NotFound { .. } | Error::Overlap { .. } | Error::NoMatch { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = Error::format(
            Location::Descriptor { field: "jal_imm".into(), descriptor: "3x".into() },
            "bit index `3x` is not a decimal number",
        );
        let msg = err.to_string();
        assert!(msg.contains("jal_imm"));
        assert!(msg.contains("3x"));

        let err = Error::Reference {
            location: Location::operation("I", "add"),
            kind: NameKind::Constant,
            name: "OP_REG".into(),
        };
        assert_eq!(
            err.to_string(),
            "extension \"I\", operation \"add\" references unknown constant `OP_REG`"
        );
    }
}
