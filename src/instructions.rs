use serde::Serialize;

use crate::isa::tvm2::{AddrMode, Instruction, IMM_WIDTH};

/// Operand shape of an instruction. Together with the addressing mode it
/// fixes the encoded length; both tools read lengths from here only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Shape {
    /// `ret`
    Nullary,
    /// `push rX`
    Reg,
    /// `call imm|label`
    Imm,
    /// `add rX, rY|imm|label`
    Binary,
    /// `load rX, [rY|imm|label]`
    Load,
    /// `store [rX], rY|imm|label`
    Store,
}

impl Shape {
    /// Length in bytes for `mode`, or `None` if the pair is not encodable.
    pub fn encoded_len(self, mode: AddrMode) -> Option<u8> {
        const OP: usize = 1;
        const REGS: usize = 1;
        let len = match (self, mode) {
            (Shape::Nullary, AddrMode::Reg) => OP,
            (Shape::Reg, AddrMode::Reg) => OP + REGS,
            (Shape::Imm, AddrMode::Imm) => OP + IMM_WIDTH,
            (Shape::Binary, AddrMode::Reg) => OP + REGS,
            (Shape::Binary, AddrMode::Imm) => OP + REGS + IMM_WIDTH,
            (Shape::Load | Shape::Store, AddrMode::RegIdx) => OP + REGS,
            (Shape::Load | Shape::Store, AddrMode::Imm) => OP + REGS + IMM_WIDTH,
            _ => return None,
        };
        Some(len as u8)
    }

    pub fn modes(self) -> &'static [AddrMode] {
        match self {
            Shape::Nullary | Shape::Reg => &[AddrMode::Reg],
            Shape::Imm => &[AddrMode::Imm],
            Shape::Binary => &[AddrMode::Reg, AddrMode::Imm],
            Shape::Load | Shape::Store => &[AddrMode::RegIdx, AddrMode::Imm],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct InstrDesc {
    pub instr: Instruction,
    pub mnemonic: &'static str,
    pub shape: Shape,
    /// Immediate operand is a code address (label synthesis and substitution).
    pub code_target: bool,
}

pub fn desc(instr: Instruction) -> InstrDesc {
    use Instruction::*;
    let (mnemonic, shape) = match instr {
        Load => ("load", Shape::Load),
        Store => ("store", Shape::Store),
        Mov => ("mov", Shape::Binary),
        Add => ("add", Shape::Binary),
        Sub => ("sub", Shape::Binary),
        And => ("and", Shape::Binary),
        Or => ("or", Shape::Binary),
        Xor => ("xor", Shape::Binary),
        Not => ("not", Shape::Reg),
        Cmp => ("cmp", Shape::Binary),
        Push => ("push", Shape::Reg),
        Pop => ("pop", Shape::Reg),
        Call => ("call", Shape::Imm),
        Ret => ("ret", Shape::Nullary),
        Jmp => ("jmp", Shape::Imm),
        Jmpz => ("jmpz", Shape::Imm),
        Jmpnz => ("jmpnz", Shape::Imm),
        Jmpeq => ("jmpeq", Shape::Imm),
        Jmpne => ("jmpne", Shape::Imm),
        Jmpgt => ("jmpgt", Shape::Imm),
        Jmplt => ("jmplt", Shape::Imm),
        Jmpge => ("jmpge", Shape::Imm),
        Jmple => ("jmple", Shape::Imm),
        Invoke => ("invoke", Shape::Imm),
    };
    let code_target = matches!(
        instr,
        Call | Jmp | Jmpz | Jmpnz | Jmpeq | Jmpne | Jmpgt | Jmplt | Jmpge | Jmple
    );
    InstrDesc { instr, mnemonic, shape, code_target }
}

/// Case-insensitive mnemonic lookup.
pub fn lookup(mnemonic: &str) -> Option<Instruction> {
    Instruction::ALL
        .iter()
        .copied()
        .find(|&i| desc(i).mnemonic.eq_ignore_ascii_case(mnemonic))
}
