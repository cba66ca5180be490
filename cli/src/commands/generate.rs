use std::{fs, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use decgen_core::{Decoder, EmitOptions, Section, Syntax};
use tracing::{info, warn};

use crate::load_table;

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum SectionArg {
    Fields,
    Recognizers,
    Dispatch,
    Body,
}

impl From<SectionArg> for Section {
    fn from(arg: SectionArg) -> Self {
        match arg {
            SectionArg::Fields => Section::Fields,
            SectionArg::Recognizers => Section::Recognizers,
            SectionArg::Dispatch => Section::Dispatch,
            SectionArg::Body => Section::Body,
        }
    }
}

// Structure representing the 'generate' subcommand.
#[derive(clap::Args)]
#[command(about = "Generate field extraction, recognizer, dispatch and decoder code")]
pub struct DecgenGenerate {
    /// Encoding table (TOML)
    table: PathBuf,

    /// Extension to include; repeat for several. All extensions when omitted.
    #[clap(short = 'e', long = "ext")]
    extensions: Vec<String>,

    /// Target syntax: `c` or `rust`
    #[clap(short = 's', long, default_value = "c")]
    syntax: Syntax,

    /// Name of the instruction word variable
    #[clap(long, default_value = "inst")]
    var: String,

    /// Handler called for unrecognized words
    #[clap(long, default_value = "undef")]
    fallback: String,

    /// Sections to emit, in order. All sections when omitted.
    #[clap(long = "section", value_enum)]
    sections: Vec<SectionArg>,

    /// Write to this file instead of stdout
    #[clap(short = 'o', long)]
    output: Option<PathBuf>,

    /// Fail when any field or operation had to be dropped
    #[clap(long)]
    strict: bool,
}

impl DecgenGenerate {
    pub fn run(&self) -> Result<()> {
        let table = load_table(&self.table, &self.extensions)?;
        let decoder = Decoder::build(&table);

        if self.strict && !decoder.diagnostics().is_empty() {
            for diagnostic in decoder.diagnostics() {
                warn!("{diagnostic}");
            }
            bail!("{} table entries failed to compile", decoder.diagnostics().len());
        }

        let sections = if self.sections.is_empty() {
            Section::ALL.to_vec()
        } else {
            self.sections.iter().copied().map(Section::from).collect()
        };
        let options = EmitOptions {
            syntax: self.syntax,
            source_var: self.var.clone(),
            fallback: self.fallback.clone(),
            sections,
        };
        let code = decoder.emit(&options);

        match &self.output {
            Some(path) => {
                fs::write(path, &code)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                info!("Wrote {} decoder to {}", self.syntax, path.display());
            }
            None => print!("{code}"),
        }

        Ok(())
    }
}
