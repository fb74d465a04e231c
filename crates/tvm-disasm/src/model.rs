use anyhow::{Context, Result};
use std::io::{Read, Write};
use std::path::Path;

use tvm_rs::hex::parse_hex;
use tvm_rs::LabelTable;

/// Read a whole text input from `path`, or from stdin when absent.
pub fn read_text(path: Option<&Path>) -> Result<String> {
    match path {
        Some(p) => std::fs::read_to_string(p).with_context(|| format!("reading {}", p.display())),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).context("reading stdin")?;
            Ok(buf)
        }
    }
}

/// Write `text` to `path`, or to stdout when absent.
pub fn write_text(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(p) => std::fs::write(p, text).with_context(|| format!("writing {}", p.display())),
        None => {
            let mut out = std::io::stdout().lock();
            out.write_all(text.as_bytes()).context("writing stdout")?;
            out.flush().context("writing stdout")
        }
    }
}

pub fn load_hex(path: Option<&Path>) -> Result<Vec<u8>> {
    let text = read_text(path)?;
    let bytes = parse_hex(&text).context("parsing hex stream")?;
    tracing::debug!(bytes = bytes.len(), "hex stream loaded");
    Ok(bytes)
}

pub fn load_labels(path: &Path) -> Result<LabelTable> {
    let text = read_text(Some(path))?;
    LabelTable::parse(&text).with_context(|| format!("parsing label table {}", path.display()))
}
