use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use tvm_rs::asm::assemble_with;
use tvm_rs::{AsmConfig, HexLayout};
use tvm_disasm::{read_text, write_text};

#[derive(Parser, Debug)]
#[command(author, version, about = "TVM assembler")]
struct Opts {
    /// Input assembly file, one instruction or label per line (defaults to stdin)
    #[arg(value_name = "ASM")]
    input: Option<PathBuf>,
    /// Output hex stream (defaults to stdout)
    #[arg(short, long, value_name = "HEX")]
    output: Option<PathBuf>,
    /// Also write the label table here
    #[arg(short, long, value_name = "LBL")]
    labels: Option<PathBuf>,
    /// Hex text layout
    #[arg(long, value_enum, default_value_t = Layout::PerInstruction)]
    layout: Layout,
    /// Do not emit the `$sys_enter` prelude
    #[arg(long)]
    bare: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Layout { PerInstruction, Flat }

impl From<Layout> for HexLayout {
    fn from(l: Layout) -> Self {
        match l {
            Layout::PerInstruction => HexLayout::PerInstruction,
            Layout::Flat => HexLayout::Flat,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let opts = Opts::parse();
    let source = read_text(opts.input.as_deref())?;
    let cfg = AsmConfig { sys_prelude: !opts.bare };
    let name = opts.input.as_ref().map_or_else(|| "<stdin>".to_string(), |p| p.display().to_string());
    // Nothing is written unless the whole program assembles and links.
    let program = assemble_with(cfg, &source).with_context(|| format!("assembling {name}"))?;

    write_text(opts.output.as_deref(), &program.hex(opts.layout.into()))?;
    if let Some(path) = opts.labels.as_deref() {
        write_text(Some(path), &program.labels.to_string())?;
    }
    Ok(())
}
