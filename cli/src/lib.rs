pub mod commands;

use std::{fs, path::Path};

use anyhow::{Context, Result};
use decgen_core::{parse_literal, EncodingTable};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the stderr log subscriber. `RUST_LOG` takes precedence over `verbose`.
pub fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

/// Read and validate an encoding table, keeping only `extensions` when any are given
pub fn load_table(path: &Path, extensions: &[String]) -> Result<EncodingTable> {
    let source = fs::read_to_string(path)
        .with_context(|| format!("Failed to read encoding table {}", path.display()))?;
    let table = EncodingTable::parse(&source)
        .with_context(|| format!("Invalid encoding table {}", path.display()))?;
    info!(
        "Loaded {} table: {}-bit words, {} fields, {} extensions",
        table.isa_name(),
        table.word_width(),
        table.fields().len(),
        table.extensions().len()
    );

    if extensions.is_empty() {
        Ok(table)
    } else {
        Ok(table.select_extensions(extensions))
    }
}

/// Parse an instruction word given as decimal, `0x`, `0b` or `0o`
pub fn parse_word(text: &str) -> Result<u64> {
    parse_literal(text).with_context(|| format!("`{text}` is not an instruction word"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_word() {
        assert_eq!(parse_word("0x0020_81B3").unwrap(), 0x0020_81B3);
        assert_eq!(parse_word("51").unwrap(), 51);
        assert!(parse_word("add").is_err());
    }

    #[test]
    fn test_load_reference_table() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../tables/rv32-dec.toml");
        let table = load_table(&path, &["M".to_string()]).unwrap();
        assert_eq!(table.extensions().len(), 1);
        assert!(load_table(Path::new("missing.toml"), &[]).is_err());
    }
}
