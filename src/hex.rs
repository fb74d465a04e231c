//! Text form of a byte stream: lowercase two-digit hex bytes separated by
//! single spaces. The reader ignores line structure.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::decoder::DisasmError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum HexLayout {
    /// One instruction per line.
    #[default]
    PerInstruction,
    /// The whole stream on a single line.
    Flat,
}

/// Format `bytes`; `starts` holds the start offset of every instruction and
/// is only consulted for [`HexLayout::PerInstruction`].
pub fn format_hex(bytes: &[u8], starts: &[u32], layout: HexLayout) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    if bytes.is_empty() {
        return out;
    }
    match layout {
        HexLayout::Flat => {
            push_run(&mut out, bytes);
            out.push('\n');
        }
        HexLayout::PerInstruction => {
            let mut bounds: Vec<usize> = starts.iter().map(|&s| s as usize).filter(|&s| s < bytes.len()).collect();
            bounds.sort_unstable();
            bounds.dedup();
            if bounds.first() != Some(&0) {
                bounds.insert(0, 0);
            }
            bounds.push(bytes.len());
            for w in bounds.windows(2) {
                push_run(&mut out, &bytes[w[0]..w[1]]);
                out.push('\n');
            }
        }
    }
    out
}

fn push_run(out: &mut String, run: &[u8]) {
    for (i, b) in run.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{b:02x}");
    }
}

/// Parse whitespace-separated two-digit hex tokens.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, DisasmError> {
    text.split_whitespace()
        .enumerate()
        .map(|(index, token)| {
            let ok = token.len() == 2 && token.bytes().all(|c| c.is_ascii_hexdigit());
            if !ok {
                return Err(DisasmError::BadHexToken { index, token: token.to_string() });
            }
            u8::from_str_radix(token, 16).map_err(|_| DisasmError::BadHexToken { index, token: token.to_string() })
        })
        .collect()
}
