use anyhow::Result;
use clap::{Parser, Subcommand};
use decgen_cli::{
    commands::{DecgenDecode, DecgenGenerate, DecgenInspect},
    init_tracing,
};

/// Compile declarative instruction-encoding tables into decoder code
#[derive(Parser)]
#[command(name = "decgen", version, about, long_about = None)]
struct Cli {
    /// Log debug events; `RUST_LOG` overrides
    #[clap(short, long, global = true)]
    verbose: bool,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    Inspect(DecgenInspect),
    Generate(DecgenGenerate),
    Decode(DecgenDecode),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Command::Inspect(cmd) => cmd.run(),
        Command::Generate(cmd) => cmd.run(),
        Command::Decode(cmd) => cmd.run(),
    }
}
