use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tvm_rs::disassemble_listing;
use tvm_disasm::{load_hex, load_labels, write_text};

#[derive(Parser, Debug)]
#[command(author, version, about = "TVM disassembler CLI", long_about = None)]
struct Cli {
    /// Input hex stream (defaults to stdin)
    #[arg(value_name = "HEX")]
    input: Option<PathBuf>,
    /// Write output to file instead of stdout
    #[arg(short, long, value_name = "ASM")]
    output: Option<PathBuf>,
    /// Label table from the assembler; labels are synthesized when omitted
    #[arg(short, long, value_name = "LBL")]
    labels: Option<PathBuf>,
    /// Output format: text or json
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat { Text, Json }

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let bytes = load_hex(cli.input.as_deref())?;
    let labels = cli.labels.as_deref().map(load_labels).transpose()?;

    let listing = disassemble_listing(&bytes, labels.as_ref()).context("disassembling")?;
    let text = match cli.format {
        OutputFormat::Text => listing.render(),
        OutputFormat::Json => serde_json::to_string_pretty(&listing)? + "\n",
    };
    write_text(cli.output.as_deref(), &text)
}
