//! Instruction decoder generator
//!
//! Reads a declarative encoding table (instruction word width, named constants, named fields
//! given as lists of bit positions, and per-extension operation encodings) and compiles it into:
//!
//! - per-field extraction expressions that reassemble scattered source bits,
//! - per-operation recognizer predicates and handler dispatch calls,
//! - a decision tree per extension that narrows an instruction word to one operation.
//!
//! ```
//! use decgen_core::{Decoder, EncodingTable};
//!
//! let table = EncodingTable::parse(r#"
//!     ISA = "RV32"
//!     XLEN = 32
//!     [field]
//!     opcode = ["6:0"]
//!     rd = ["11:7"]
//!     imm = ["31:12"]
//!     [I]
//!     lui = { match = { opcode = 0b0110111 }, output = ["rd", "imm"] }
//! "#).unwrap();
//!
//! let decoder = Decoder::build(&table);
//! let m = decoder.decode(0x1234_50B7).unwrap();
//! assert_eq!(m.operation, "lui");
//! assert_eq!(m.args, vec![("rd".to_string(), 1), ("imm".to_string(), 0x12345)]);
//! ```
pub mod codegen;
pub mod decoder;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod expr;
pub mod field;
pub mod table;
pub mod tree;

pub use codegen::{Formatter, Stmt, Syntax};
pub use decoder::{Decoder, EmitOptions, Match, Section};
pub use descriptor::{Descriptor, DescriptorError};
pub use dispatch::{
    build_dispatch, build_recognizer, find_ambiguities, Ambiguity, OperationId, ResolvedOperation,
};
pub use error::{Error, Location, NameKind, Result};
pub use expr::{emit_extraction, BinOp, Expr, ShiftDir};
pub use field::{CompiledField, FieldCompiler, FieldSet, Segment, MAX_WORD_WIDTH};
pub use table::{parse_literal, EncodingTable, Extension, FieldDecl, FieldValue, Operation};
pub use tree::{build_decision_tree, DecisionTree, Node};
