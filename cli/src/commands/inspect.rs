use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use decgen_core::{Ambiguity, CompiledField, Decoder, EncodingTable};
use serde::Serialize;

use crate::load_table;

// Structure representing the 'inspect' subcommand.
#[derive(clap::Args)]
#[command(about = "Show the compiled fields, operations and decision trees of a table")]
pub struct DecgenInspect {
    /// Encoding table (TOML)
    table: PathBuf,

    /// Extension to include; repeat for several. All extensions when omitted.
    #[clap(short = 'e', long = "ext")]
    extensions: Vec<String>,

    /// Print machine-readable JSON
    #[clap(long)]
    json: bool,
}

#[derive(Serialize)]
struct OperationView<'a> {
    name: &'a str,
    mask: u64,
    pattern: u64,
    fixed: Vec<(&'a str, u64)>,
    output: Vec<&'a str>,
}

#[derive(Serialize)]
struct ExtensionView<'a> {
    name: &'a str,
    depth: usize,
    max_leaf: usize,
    operations: Vec<OperationView<'a>>,
}

#[derive(Serialize)]
struct TableView<'a> {
    isa: &'a str,
    word_width: u32,
    constants: Vec<(&'a str, u64)>,
    fields: Vec<&'a CompiledField>,
    extensions: Vec<ExtensionView<'a>>,
    diagnostics: Vec<String>,
    ambiguities: &'a [Ambiguity],
}

impl<'a> TableView<'a> {
    fn new(table: &'a EncodingTable, decoder: &'a Decoder) -> Self {
        let extensions = decoder
            .trees()
            .iter()
            .map(|(name, tree)| ExtensionView {
                name,
                depth: tree.root().depth(),
                max_leaf: tree.root().max_leaf(),
                operations: tree
                    .operations()
                    .iter()
                    .map(|op| OperationView {
                        name: op.name(),
                        mask: op.mask(),
                        pattern: op.pattern(),
                        fixed: op.fixed().iter().map(|f| (f.field.name(), f.value)).collect(),
                        output: op.output().iter().map(|f| f.name()).collect(),
                    })
                    .collect(),
            })
            .collect();

        Self {
            isa: decoder.isa_name(),
            word_width: decoder.word_width(),
            constants: table.constants().iter().map(|(k, v)| (k.as_str(), *v)).collect(),
            fields: decoder.fields().iter().map(|f| &**f).collect(),
            extensions,
            diagnostics: decoder.diagnostics().iter().map(ToString::to_string).collect(),
            ambiguities: decoder.ambiguities(),
        }
    }
}

impl DecgenInspect {
    pub fn run(&self) -> Result<()> {
        let table = load_table(&self.table, &self.extensions)?;
        let decoder = Decoder::build(&table);
        let view = TableView::new(&table, &decoder);

        if self.json {
            let json = serde_json::to_string_pretty(&view).context("Failed to serialize table")?;
            println!("{json}");
            return Ok(());
        }

        print_view(&view);
        Ok(())
    }
}

fn print_view(view: &TableView) {
    let digits = (view.word_width as usize).div_ceil(4);

    println!("{} {}-bit instruction words", view.isa.bold(), view.word_width);

    println!("\n{} ({})", "fields".bold(), view.fields.len());
    let name_width = view.fields.iter().map(|f| f.name().len()).max().unwrap_or(0);
    for field in &view.fields {
        let segments: Vec<String> = field
            .segments()
            .iter()
            .map(|s| format!("{:#0w$x}@{}", s.mask, s.dest_offset, w = digits + 2))
            .collect();
        println!(
            "  {:name_width$}  {:>2} bits  offset {}  {}",
            field.name().cyan(),
            field.bit_length(),
            field.result_offset(),
            segments.join(" ")
        );
    }

    for ext in &view.extensions {
        println!(
            "\n{} {} ({} operations, depth {}, longest scan {})",
            "extension".bold(),
            ext.name.green(),
            ext.operations.len(),
            ext.depth,
            ext.max_leaf
        );
        for op in &ext.operations {
            let fixed: Vec<String> =
                op.fixed.iter().map(|(name, value)| format!("{name}={value:#x}")).collect();
            println!(
                "  {:10} mask {:#0w$x} match {:#0w$x}  {}  -> {}",
                op.name,
                op.mask,
                op.pattern,
                fixed.join(" "),
                op.output.join(", "),
                w = digits + 2
            );
        }
    }

    if !view.diagnostics.is_empty() {
        println!("\n{} ({})", "diagnostics".yellow().bold(), view.diagnostics.len());
        for diagnostic in &view.diagnostics {
            println!("  {diagnostic}");
        }
    }
    if !view.ambiguities.is_empty() {
        println!("\n{} ({})", "ambiguities".yellow().bold(), view.ambiguities.len());
        for ambiguity in view.ambiguities {
            println!("  {ambiguity}");
        }
    }
}
