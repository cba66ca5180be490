//! Whole-table decoder: compiled fields, resolved operations and one decision tree per extension
use indexmap::IndexMap;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, warn};

use crate::{
    codegen::{container_bits, ident, Formatter, Stmt, Syntax},
    dispatch::{build_dispatch, build_recognizer, find_ambiguities, Ambiguity, ResolvedOperation},
    error::{Error, Result},
    expr::{emit_extraction, emit_extraction_from, Expr},
    field::{CompiledField, FieldCompiler, FieldSet},
    table::{EncodingTable, Extension},
    tree::DecisionTree,
};

/// A decoded instruction word
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Match {
    pub extension: String,
    pub operation: String,
    /// Output field values in output order
    pub args: Vec<(String, u64)>,
}

/// Part of the generated source
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Section {
    /// One variable per compiled field
    Fields,
    /// One boolean per operation
    Recognizers,
    /// One handler call per operation
    Dispatch,
    /// Nested switches and if chains built from the decision trees
    Body,
}

impl Section {
    pub const ALL: [Section; 4] =
        [Section::Fields, Section::Recognizers, Section::Dispatch, Section::Body];
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmitOptions {
    pub syntax: Syntax,
    /// Name of the instruction word variable
    pub source_var: String,
    /// Handler called when no operation matches
    pub fallback: String,
    pub sections: Vec<Section>,
}

impl Default for EmitOptions {
    fn default() -> Self {
        Self {
            syntax: Syntax::C,
            source_var: "inst".to_string(),
            fallback: "undef".to_string(),
            sections: Section::ALL.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Decoder {
    isa_name: String,
    word_width: u32,
    fields: FieldSet,
    trees: IndexMap<String, DecisionTree>,
    diagnostics: Vec<Error>,
    ambiguities: Vec<Ambiguity>,
}

impl Decoder {
    /// Compile every field and operation of `table`. Entries that fail are dropped and recorded
    /// in [`Decoder::diagnostics`]; the rest of the table is unaffected.
    pub fn build(table: &EncodingTable) -> Self {
        let compiler = FieldCompiler::new(table.word_width());
        let mut diagnostics = Vec::new();

        let compiled: Vec<Result<CompiledField>> = table
            .fields()
            .collect::<Vec<_>>()
            .par_iter()
            .map(|decl| compiler.compile(&decl.name, &decl.bits, decl.offset))
            .collect();
        let mut fields = FieldSet::default();
        for result in compiled {
            match result {
                Ok(field) => {
                    fields.insert(field);
                }
                Err(e) => {
                    warn!("dropping field: {e}");
                    diagnostics.push(e);
                }
            }
        }

        // trees are independent of each other
        let extensions: Vec<&Extension> = table.extensions().collect();
        let built: Vec<(String, DecisionTree, Vec<Error>)> = extensions
            .par_iter()
            .map(|ext| {
                let mut errors = Vec::new();
                let mut operations = Vec::with_capacity(ext.operations.len());
                for op in &ext.operations {
                    match ResolvedOperation::resolve(op, table, &fields) {
                        Ok(resolved) => operations.push(resolved),
                        Err(e) => errors.push(e),
                    }
                }
                (ext.name.clone(), DecisionTree::build(operations), errors)
            })
            .collect();

        let mut trees = IndexMap::with_capacity(built.len());
        for (name, tree, errors) in built {
            for e in errors {
                warn!("dropping operation: {e}");
                diagnostics.push(e);
            }
            trees.insert(name, tree);
        }

        let ambiguities = find_ambiguities(trees.values().flat_map(|tree| tree.operations()));
        for ambiguity in &ambiguities {
            warn!("ambiguous encodings: {ambiguity}");
        }

        debug!(
            isa = table.isa_name(),
            fields = fields.len(),
            extensions = trees.len(),
            diagnostics = diagnostics.len(),
            ambiguities = ambiguities.len(),
            "built decoder"
        );

        Self {
            isa_name: table.isa_name().to_string(),
            word_width: table.word_width(),
            fields,
            trees,
            diagnostics,
            ambiguities,
        }
    }

    pub fn isa_name(&self) -> &str {
        &self.isa_name
    }

    pub fn word_width(&self) -> u32 {
        self.word_width
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    /// Decision trees by extension, in table order
    pub fn trees(&self) -> &IndexMap<String, DecisionTree> {
        &self.trees
    }

    /// Errors of the entries dropped while building
    pub fn diagnostics(&self) -> &[Error] {
        &self.diagnostics
    }

    pub fn ambiguities(&self) -> &[Ambiguity] {
        &self.ambiguities
    }

    /// Decode `word`, trying extensions in table order
    pub fn decode(&self, word: u64) -> Result<Match> {
        self.trees
            .values()
            .find_map(|tree| tree.descend(word).ok())
            .map(|op| Match {
                extension: op.extension().to_string(),
                operation: op.name().to_string(),
                args: op.arguments(word),
            })
            .ok_or(Error::NoMatch { word })
    }

    fn operations(&self) -> impl Iterator<Item = &ResolvedOperation> {
        self.trees.values().flat_map(|tree| tree.operations())
    }

    /// One extraction statement per compiled field, in declaration order. A field whose value
    /// is wider than the instruction word reads from a widened copy of `source_var`.
    pub fn field_stmts(&self, source_var: &str) -> Vec<Stmt> {
        self.fields
            .iter()
            .map(|field| {
                let width = self.word_width.max(field.value_width());
                let value = if container_bits(width) > container_bits(self.word_width) {
                    emit_extraction_from(field, &Expr::cast(Expr::var(source_var), width))
                } else {
                    emit_extraction(field, source_var)
                };
                Stmt::Let { name: ident(field.name()), value, word_width: width }
            })
            .collect()
    }

    pub fn recognizer_stmts(&self) -> Vec<Stmt> {
        self.operations()
            .map(|op| Stmt::Flag {
                name: format!("is_{}", ident(op.name())),
                value: build_recognizer(op),
            })
            .collect()
    }

    pub fn dispatch_stmts(&self) -> Vec<Stmt> {
        self.operations().map(|op| Stmt::Expr(build_dispatch(op))).collect()
    }

    /// The decoder body: each extension's tree in turn, then a call to `fallback`
    pub fn body_stmts(&self, fallback: &str) -> Vec<Stmt> {
        let mut body: Vec<Stmt> = self.trees.values().flat_map(|tree| tree.to_stmts(&[])).collect();
        body.push(Stmt::Expr(Expr::Call { callee: ident(fallback), args: vec![] }));
        body
    }

    /// Render the requested sections
    pub fn emit(&self, options: &EmitOptions) -> String {
        let syntax = options.syntax;
        let mut fmt = Formatter::new();
        fmt.comment(format!(
            "{} decoder ({}-bit words), generated by decgen",
            self.isa_name, self.word_width
        ));
        for section in &options.sections {
            fmt.empty_line();
            match section {
                Section::Fields => {
                    fmt.comment("field extraction");
                    syntax.stmts(&mut fmt, &self.field_stmts(&options.source_var));
                }
                Section::Recognizers => {
                    fmt.comment("recognizers");
                    syntax.stmts(&mut fmt, &self.recognizer_stmts());
                }
                Section::Dispatch => {
                    fmt.comment("dispatch");
                    syntax.stmts(&mut fmt, &self.dispatch_stmts());
                }
                Section::Body => {
                    fmt.comment("decoder body");
                    syntax.stmts(&mut fmt, &self.body_stmts(&options.fallback));
                }
            }
        }
        fmt.finish()
    }
}
