pub mod asm;
pub mod decoder;
pub mod disasm;
pub mod hex;
pub mod instructions;
pub mod labels;

pub mod isa {
    pub mod tvm2; // 2-bit addressing-mode revision (canonical)
}

pub use asm::{assemble, AsmConfig, AsmError, Assembler, Assembly};
pub use decoder::{decode_stream, Cursor, Decoded, DisasmError, Operand};
pub use disasm::{disassemble, disassemble_listing, Listing};
pub use hex::HexLayout;
pub use isa::tvm2::{AddrMode, Instruction, Register};
pub use labels::LabelTable;
