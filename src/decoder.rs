use serde::Serialize;

use crate::isa::tvm2::{AddrMode, Instruction, Register, Tvm2Decoder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Operand {
    Reg(Register),
    Imm(u32),
}

/// One decoded instruction, recorded at its start address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decoded {
    pub addr: u32,
    pub instr: Instruction,
    pub mode: AddrMode,
    pub dst: Option<Operand>,
    pub src: Option<Operand>,
    pub len: u8, // 1, 2, 5 or 6
}

impl Decoded {
    /// Immediate operand when it names a code address (call/jmp targets).
    pub fn code_target(&self) -> Option<u32> {
        if !crate::instructions::desc(self.instr).code_target {
            return None;
        }
        match self.dst {
            Some(Operand::Imm(v)) => Some(v),
            _ => None,
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DisasmError {
    #[error("unsupported instruction id {id} (opcode {opcode:#04x}) at {addr:#010x}")]
    UnsupportedInstruction { addr: u32, opcode: u8, id: u8 },
    #[error("illegal addressing mode {mode:#04b} (opcode {opcode:#04x}) at {addr:#010x}")]
    IllegalAddressingMode { addr: u32, opcode: u8, mode: u8 },
    #[error("truncated stream at {addr:#010x}: {instr} needs {need} bytes, {have} left")]
    TruncatedStream { addr: u32, instr: Instruction, need: usize, have: usize },
    #[error("bad hex byte {token:?} (token {index})")]
    BadHexToken { index: usize, token: String },
}

/// Read position over an immutable byte stream.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn position(&self) -> u32 {
        self.pos as u32
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    /// Next byte without advancing.
    pub fn peek_u8(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    /// Consume exactly `n` bytes, or nothing if fewer remain.
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let bytes = self.bytes;
        let end = self.pos.checked_add(n)?;
        let slice = bytes.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }
}

pub trait Decoder {
    /// Decode the instruction at the cursor. `Ok(None)` at end of stream.
    fn decode(&self, cur: &mut Cursor<'_>) -> Result<Option<Decoded>, DisasmError>;
}

/// Decode a whole stream front to back with the canonical decoder.
pub fn decode_stream(bytes: &[u8]) -> Result<Vec<Decoded>, DisasmError> {
    decode_with(&Tvm2Decoder::new(), bytes)
}

pub fn decode_with<D: Decoder>(dec: &D, bytes: &[u8]) -> Result<Vec<Decoded>, DisasmError> {
    let mut cur = Cursor::new(bytes);
    let mut out = Vec::new();
    while let Some(d) = dec.decode(&mut cur)? {
        out.push(d);
    }
    tracing::debug!(instructions = out.len(), bytes = bytes.len(), "stream decoded");
    Ok(out)
}
