//! CLI entry point for bnd-cppmodel.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

/// Build a declaration model from a CastXML document and write it as JSON.
#[derive(Parser, Debug)]
#[command(name = "bnd-cppmodel", version, about)]
struct Cli {
    /// Path to the bnd-cppmodel.toml configuration file.
    #[arg(default_value = "bnd-cppmodel.toml")]
    config: PathBuf,

    /// Output JSON path (overrides config).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the normalized AST document here (overrides `module.dump`).
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("bnd_cppmodel=info")),
        )
        .init();

    let cli = Cli::parse();
    let written = bnd_cppmodel::run(&cli.config, cli.output.as_deref(), cli.dump.as_deref())?;
    println!("{}", written.display());
    Ok(())
}
