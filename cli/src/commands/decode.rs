use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;
use decgen_core::{Decoder, Error};
use serde::Serialize;

use crate::{load_table, parse_word};

// Structure representing the 'decode' subcommand.
#[derive(clap::Args)]
#[command(about = "Decode instruction words with the decision trees of a table")]
pub struct DecgenDecode {
    /// Encoding table (TOML)
    table: PathBuf,

    /// Instruction words: decimal, 0x, 0b or 0o
    #[clap(required = true)]
    words: Vec<String>,

    /// Extension to include; repeat for several. All extensions when omitted.
    #[clap(short = 'e', long = "ext")]
    extensions: Vec<String>,

    /// Print one JSON object per word
    #[clap(long)]
    json: bool,
}

#[derive(Serialize)]
struct Decoded<'a> {
    word: u64,
    #[serde(flatten)]
    result: Option<&'a decgen_core::Match>,
}

impl DecgenDecode {
    pub fn run(&self) -> Result<()> {
        let table = load_table(&self.table, &self.extensions)?;
        let decoder = Decoder::build(&table);
        let digits = (decoder.word_width() as usize).div_ceil(4) + 2;

        for text in &self.words {
            let word = parse_word(text)?;
            let result = match decoder.decode(word) {
                Ok(m) => Some(m),
                Err(Error::NoMatch { .. }) => None,
                Err(e) => return Err(e).context("Decoding failed"),
            };

            if self.json {
                let json = serde_json::to_string(&Decoded { word, result: result.as_ref() })
                    .context("Failed to serialize decoded word")?;
                println!("{json}");
                continue;
            }

            match result {
                Some(m) => {
                    let args: Vec<String> =
                        m.args.iter().map(|(name, value)| format!("{name}={value:#x}")).collect();
                    println!(
                        "{word:#0digits$x}  {}.{}  {}",
                        m.extension,
                        m.operation.green(),
                        args.join(" ")
                    );
                }
                None => println!("{word:#0digits$x}  {}", "unknown".red()),
            }
        }

        Ok(())
    }
}
