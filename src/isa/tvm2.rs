use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decoder::{Cursor, Decoded, Decoder, DisasmError, Operand};
use crate::instructions::Shape;

/// TVM instruction set, 2-bit addressing-mode revision.
///
/// Opcode byte layout: `[7:2]` instruction id, `[1:0]` addressing mode.
/// Immediates are 32-bit little-endian. This revision is not binary
/// compatible with the 1-bit REG/IMM revision.
pub const MODE_BITS: u8 = 2;
pub const MODE_MASK: u8 = (1 << MODE_BITS) - 1;
pub const IMM_WIDTH: usize = 4;

/// Address the VM treats as the system-call gate.
pub const SYS_ENTER_ADDR: u32 = 0x0;
/// Address of the first user instruction when the system prelude is present.
pub const USER_ENTRY_ADDR: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum Instruction {
    Load = 1,
    Store = 2,
    Mov = 3,
    Add = 4,
    Sub = 5,
    And = 6,
    Or = 7,
    Xor = 8,
    Not = 9,
    Cmp = 10,
    Push = 11,
    Pop = 12,
    Call = 13,
    Ret = 14,
    Jmp = 15,
    Jmpz = 16,
    Jmpnz = 17,
    Jmpeq = 18,
    Jmpne = 19,
    Jmpgt = 20,
    Jmplt = 21,
    Jmpge = 22,
    Jmple = 23,
    Invoke = 24,
}

impl Instruction {
    pub const ALL: [Instruction; 24] = [
        Instruction::Load,
        Instruction::Store,
        Instruction::Mov,
        Instruction::Add,
        Instruction::Sub,
        Instruction::And,
        Instruction::Or,
        Instruction::Xor,
        Instruction::Not,
        Instruction::Cmp,
        Instruction::Push,
        Instruction::Pop,
        Instruction::Call,
        Instruction::Ret,
        Instruction::Jmp,
        Instruction::Jmpz,
        Instruction::Jmpnz,
        Instruction::Jmpeq,
        Instruction::Jmpne,
        Instruction::Jmpgt,
        Instruction::Jmplt,
        Instruction::Jmpge,
        Instruction::Jmple,
        Instruction::Invoke,
    ];

    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.id() == id)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(crate::instructions::desc(*self).mnemonic)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum AddrMode {
    Reg = 0,
    Imm = 1,
    RegIdx = 2,
}

impl AddrMode {
    pub const ALL: [AddrMode; 3] = [AddrMode::Reg, AddrMode::Imm, AddrMode::RegIdx];

    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(AddrMode::Reg),
            1 => Some(AddrMode::Imm),
            2 => Some(AddrMode::RegIdx),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Register {
    R0 = 0,
    R1 = 1,
    R2 = 2,
    R3 = 3,
    R4 = 4,
    R5 = 5,
    R6 = 6,
    R7 = 7,
    R8 = 8,
    R9 = 9,
    R10 = 10,
    R11 = 11,
    R12 = 12,
    Flags = 13,
    Sp = 14,
    Pc = 15,
}

impl Register {
    pub const ALL: [Register; 16] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
        Register::R9,
        Register::R10,
        Register::R11,
        Register::R12,
        Register::Flags,
        Register::Sp,
        Register::Pc,
    ];

    /// Every nibble names a register, so this is total.
    pub fn from_nibble(n: u8) -> Self {
        Self::ALL[(n & 0x0F) as usize]
    }

    pub fn nibble(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Register::R0 => "r0",
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::R3 => "r3",
            Register::R4 => "r4",
            Register::R5 => "r5",
            Register::R6 => "r6",
            Register::R7 => "r7",
            Register::R8 => "r8",
            Register::R9 => "r9",
            Register::R10 => "r10",
            Register::R11 => "r11",
            Register::R12 => "r12",
            Register::Flags => "flags",
            Register::Sp => "sp",
            Register::Pc => "pc",
        }
    }

    /// Case-insensitive register name lookup.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.name().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OpcodeError {
    #[error("unsupported instruction id {0}")]
    UnsupportedInstruction(u8),
    #[error("reserved addressing mode {0:#04b}")]
    ReservedMode(u8),
}

pub fn encode_opcode(instr: Instruction, mode: AddrMode) -> u8 {
    (instr.id() << MODE_BITS) | mode.bits()
}

pub fn decode_opcode(byte: u8) -> Result<(Instruction, AddrMode), OpcodeError> {
    let id = byte >> MODE_BITS;
    let instr = Instruction::from_id(id).ok_or(OpcodeError::UnsupportedInstruction(id))?;
    let bits = byte & MODE_MASK;
    let mode = AddrMode::from_bits(bits).ok_or(OpcodeError::ReservedMode(bits))?;
    Ok((instr, mode))
}

pub fn pack_regs(dst: Register, src: Register) -> u8 {
    (dst.nibble() << 4) | src.nibble()
}

pub fn unpack_regs(byte: u8) -> (Register, Register) {
    (Register::from_nibble(byte >> 4), Register::from_nibble(byte & 0x0F))
}

pub struct Tvm2Decoder;

impl Tvm2Decoder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for Tvm2Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for Tvm2Decoder {
    fn decode(&self, cur: &mut Cursor<'_>) -> Result<Option<Decoded>, DisasmError> {
        let addr = cur.position();
        // Peek only: nothing is consumed until the full length is known.
        let Some(opcode) = cur.peek_u8() else { return Ok(None); };
        let (instr, mode) = decode_opcode(opcode).map_err(|e| match e {
            OpcodeError::UnsupportedInstruction(id) => DisasmError::UnsupportedInstruction { addr, opcode, id },
            OpcodeError::ReservedMode(bits) => DisasmError::IllegalAddressingMode { addr, opcode, mode: bits },
        })?;
        let shape = crate::instructions::desc(instr).shape;
        let len = shape
            .encoded_len(mode)
            .ok_or(DisasmError::IllegalAddressingMode { addr, opcode, mode: mode.bits() })?;
        let have = cur.remaining();
        let raw = cur.take(len as usize).ok_or(DisasmError::TruncatedStream {
            addr,
            instr,
            need: len as usize,
            have,
        })?;

        let imm = |at: usize| u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);
        let (dst, src) = match (shape, mode) {
            (Shape::Nullary, _) => (None, None),
            (Shape::Reg, _) => (Some(Operand::Reg(unpack_regs(raw[1]).0)), None),
            (Shape::Imm, _) => (Some(Operand::Imm(imm(1))), None),
            (Shape::Binary | Shape::Load | Shape::Store, AddrMode::Imm) => {
                (Some(Operand::Reg(unpack_regs(raw[1]).0)), Some(Operand::Imm(imm(2))))
            }
            (Shape::Binary | Shape::Load | Shape::Store, _) => {
                let (d, s) = unpack_regs(raw[1]);
                (Some(Operand::Reg(d)), Some(Operand::Reg(s)))
            }
        };
        tracing::trace!(addr, %instr, ?mode, len, "decoded");
        Ok(Some(Decoded { addr, instr, mode, dst, src, len }))
    }
}
