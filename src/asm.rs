//! Two-pass assembler: one forward scan that emits bytes and records label
//! references, then a link step that patches resolved addresses in place.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::hex::{format_hex, HexLayout};
use crate::instructions::{self, Shape};
use crate::isa::tvm2::{encode_opcode, pack_regs, AddrMode, Instruction, Register, IMM_WIDTH};
use crate::labels::{self, LabelKind, LabelTable};

pub const COMMENT_START: char = ';';

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AsmError {
    #[error("line {line}: unknown mnemonic {mnemonic:?}")]
    UnknownMnemonic { line: usize, mnemonic: String },
    #[error("line {line}: malformed operand {operand:?}: {reason}")]
    MalformedOperand { line: usize, operand: String, reason: &'static str },
    #[error("line {line}: {instr} takes {expected} operand(s), found {found}")]
    WrongOperandCount { line: usize, instr: Instruction, expected: usize, found: usize },
    #[error("line {line}: undefined label {name:?}")]
    UndefinedLabel { line: usize, name: String },
    #[error("line {line}: label {name:?} already declared")]
    DuplicateLabel { line: usize, name: String },
    #[error("line {line}: malformed label {name:?}")]
    MalformedLabel { line: usize, name: String },
    #[error("line {line}: system label {name:?} cannot be declared at {addr:#010x}")]
    BadSystemLabel { line: usize, name: String, addr: u32 },
    #[error("line {line}: operand {operand:?} is neither a register, a number nor a label")]
    AmbiguousAddressingMode { line: usize, operand: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsmConfig {
    /// Emit `$sys_enter: jmp $sys_enter` ahead of the program, so user code
    /// starts at the VM entry address.
    pub sys_prelude: bool,
}

/// Linked output of one assembler run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    pub bytes: Vec<u8>,
    /// Start offset of every emitted instruction.
    pub starts: Vec<u32>,
    /// Declared labels, demangled, sorted by address.
    pub labels: LabelTable,
}

impl Assembly {
    pub fn hex(&self, layout: HexLayout) -> String {
        format_hex(&self.bytes, &self.starts, layout)
    }
}

/// Remove everything from the comment character on, plus surrounding whitespace.
pub fn strip_comment(line: &str) -> &str {
    let code = match line.find(COMMENT_START) {
        Some(p) => &line[..p],
        None => line,
    };
    code.trim()
}

/// Assemble with the default configuration (no system prelude).
pub fn assemble(source: &str) -> Result<Assembly, AsmError> {
    assemble_with(AsmConfig::default(), source)
}

pub fn assemble_with(cfg: AsmConfig, source: &str) -> Result<Assembly, AsmError> {
    let mut asm = Assembler::new(cfg);
    for (i, line) in source.lines().enumerate() {
        asm.feed_line(i + 1, line)?;
    }
    asm.finish()
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Arg {
    Reg(Register),
    Imm(u32),
    Label(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Syntax {
    Plain(Arg),
    /// `[...]`
    Mem(Arg),
}

#[derive(Debug, Clone, Copy)]
struct Fixup {
    offset: usize,
    line: usize,
}

pub struct Assembler {
    out: Vec<u8>,
    starts: Vec<u32>,
    symbols: HashMap<String, u32>,
    declared: Vec<(String, u32)>,
    pending: BTreeMap<String, Vec<Fixup>>,
    scope: String,
}

impl Assembler {
    pub fn new(cfg: AsmConfig) -> Self {
        let mut asm = Self {
            out: Vec::new(),
            starts: Vec::new(),
            symbols: HashMap::new(),
            declared: Vec::new(),
            pending: BTreeMap::new(),
            scope: String::new(),
        };
        if cfg.sys_prelude {
            for &(name, addr) in labels::SYSTEM_LABELS {
                asm.symbols.insert(name.to_string(), addr);
                asm.declared.push((name.to_string(), addr));
            }
            let gate = labels::SYSTEM_LABELS[0].0.to_string();
            asm.begin(Instruction::Jmp, AddrMode::Imm);
            asm.push_imm(0, Arg::Label(gate));
            tracing::debug!(len = asm.out.len(), "system prelude emitted");
        }
        asm
    }

    /// Current output length, i.e. the address of the next instruction.
    pub fn offset(&self) -> u32 {
        self.out.len() as u32
    }

    pub fn feed_line(&mut self, line: usize, text: &str) -> Result<(), AsmError> {
        let code = strip_comment(text);
        if code.is_empty() {
            return Ok(());
        }
        if let Some(name) = code.strip_suffix(':') {
            return self.declare(line, name.trim());
        }
        let (mnemonic, rest) = match code.split_once(char::is_whitespace) {
            Some((m, r)) => (m, r.trim()),
            None => (code, ""),
        };
        let instr = instructions::lookup(mnemonic)
            .ok_or_else(|| AsmError::UnknownMnemonic { line, mnemonic: mnemonic.to_string() })?;
        let ops = split_operands(line, rest)?;
        self.emit(line, instr, ops)
    }

    fn declare(&mut self, line: usize, name: &str) -> Result<(), AsmError> {
        if !labels::is_declarable(name) {
            return Err(AsmError::MalformedLabel { line, name: name.to_string() });
        }
        let addr = self.offset();
        let qualified = match labels::kind_of(name) {
            LabelKind::System => {
                if labels::system_label(name) != Some(addr) {
                    return Err(AsmError::BadSystemLabel { line, name: name.to_string(), addr });
                }
                name.to_string()
            }
            LabelKind::High => {
                self.scope = name.to_string();
                name.to_string()
            }
            LabelKind::Local => labels::qualify(&self.scope, name),
        };
        if self.symbols.contains_key(&qualified) {
            return Err(AsmError::DuplicateLabel { line, name: qualified });
        }
        tracing::trace!(line, label = %qualified, addr, "label declared");
        self.symbols.insert(qualified.clone(), addr);
        self.declared.push((qualified, addr));
        Ok(())
    }

    fn emit(&mut self, line: usize, instr: Instruction, ops: Vec<Syntax>) -> Result<(), AsmError> {
        let shape = instructions::desc(instr).shape;
        let expected = match shape {
            Shape::Nullary => 0,
            Shape::Reg | Shape::Imm => 1,
            Shape::Binary | Shape::Load | Shape::Store => 2,
        };
        if ops.len() != expected {
            return Err(AsmError::WrongOperandCount { line, instr, expected, found: ops.len() });
        }
        let found = ops.len();
        let mut ops = ops.into_iter();
        let mut next = || ops.next().ok_or(AsmError::WrongOperandCount { line, instr, expected, found });
        let start = self.out.len();

        let mode = match shape {
            Shape::Nullary => {
                self.begin(instr, AddrMode::Reg);
                AddrMode::Reg
            }
            Shape::Reg => {
                let r = plain_reg(line, next()?, "expected a register")?;
                self.begin(instr, AddrMode::Reg);
                self.out.push(pack_regs(r, Register::R0));
                AddrMode::Reg
            }
            Shape::Imm => {
                let arg = plain_value(line, next()?)?;
                self.begin(instr, AddrMode::Imm);
                self.push_imm(line, arg);
                AddrMode::Imm
            }
            Shape::Binary => {
                let dst = plain_reg(line, next()?, "destination must be a register")?;
                match plain_any(line, next()?)? {
                    Arg::Reg(src) => {
                        self.begin(instr, AddrMode::Reg);
                        self.out.push(pack_regs(dst, src));
                        AddrMode::Reg
                    }
                    arg => {
                        self.begin(instr, AddrMode::Imm);
                        self.out.push(pack_regs(dst, Register::R0));
                        self.push_imm(line, arg);
                        AddrMode::Imm
                    }
                }
            }
            Shape::Load => {
                let dst = plain_reg(line, next()?, "destination must be a register")?;
                let src = match next()? {
                    Syntax::Mem(arg) => arg,
                    Syntax::Plain(arg) => return Err(malformed(line, &arg, "load source must be a [memory] operand")),
                };
                self.reg_or_imm(line, instr, dst, src)
            }
            Shape::Store => {
                let dst = match next()? {
                    Syntax::Mem(Arg::Reg(r)) => r,
                    Syntax::Mem(arg) | Syntax::Plain(arg) => {
                        return Err(malformed(line, &arg, "store destination must be a [register] operand"))
                    }
                };
                let src = plain_any(line, next()?)?;
                self.reg_or_imm(line, instr, dst, src)
            }
        };

        let len = self.out.len() - start;
        debug_assert_eq!(Some(len as u8), shape.encoded_len(mode), "{instr} {mode:?}");
        tracing::trace!(line, %instr, ?mode, addr = start, len, "emit");
        Ok(())
    }

    /// Memory forms: `[reg]` is register-indirect, anything else an absolute immediate.
    fn reg_or_imm(&mut self, line: usize, instr: Instruction, reg: Register, arg: Arg) -> AddrMode {
        match arg {
            Arg::Reg(other) => {
                self.begin(instr, AddrMode::RegIdx);
                self.out.push(pack_regs(reg, other));
                AddrMode::RegIdx
            }
            arg => {
                self.begin(instr, AddrMode::Imm);
                self.out.push(pack_regs(reg, Register::R0));
                self.push_imm(line, arg);
                AddrMode::Imm
            }
        }
    }

    fn begin(&mut self, instr: Instruction, mode: AddrMode) {
        self.starts.push(self.offset());
        self.out.push(encode_opcode(instr, mode));
    }

    fn push_imm(&mut self, line: usize, arg: Arg) {
        let value = match arg {
            Arg::Imm(v) => v,
            Arg::Label(name) => {
                let qualified = labels::qualify(&self.scope, &name);
                self.pending.entry(qualified).or_default().push(Fixup { offset: self.out.len(), line });
                0
            }
            Arg::Reg(_) => unreachable!("registers are never encoded as immediates"),
        };
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    /// Link: patch every pending reference, then build the label table.
    pub fn finish(mut self) -> Result<Assembly, AsmError> {
        let mut undefined: Option<(usize, String)> = None;
        let mut patched = 0usize;
        for (name, fixups) in &self.pending {
            let addr = self.symbols.get(name).copied().or_else(|| labels::system_label(name));
            let Some(addr) = addr else {
                let first = fixups.iter().map(|f| f.line).min().unwrap_or(0);
                if undefined.as_ref().map_or(true, |(l, _)| first < *l) {
                    undefined = Some((first, name.clone()));
                }
                continue;
            };
            for f in fixups {
                self.out[f.offset..f.offset + IMM_WIDTH].copy_from_slice(&addr.to_le_bytes());
                tracing::trace!(label = %name, addr, at = f.offset, "patched");
                patched += 1;
            }
        }
        if let Some((line, name)) = undefined {
            return Err(AsmError::UndefinedLabel { line, name });
        }
        tracing::debug!(bytes = self.out.len(), patched, labels = self.declared.len(), "linked");

        // Stable sort keeps declaration order among labels sharing an address.
        self.declared.sort_by_key(|&(_, addr)| addr);
        let mut table = LabelTable::new();
        for (name, addr) in &self.declared {
            table.insert(*addr, labels::demangle(name));
        }
        Ok(Assembly { bytes: self.out, starts: self.starts, labels: table })
    }
}

fn split_operands(line: usize, rest: &str) -> Result<Vec<Syntax>, AsmError> {
    if rest.is_empty() {
        return Ok(Vec::new());
    }
    rest.split(',').map(|tok| parse_operand(line, tok.trim())).collect()
}

fn parse_operand(line: usize, tok: &str) -> Result<Syntax, AsmError> {
    if tok.is_empty() {
        return Err(AsmError::MalformedOperand { line, operand: String::new(), reason: "empty operand" });
    }
    if let Some(inner) = tok.strip_prefix('[') {
        let inner = inner
            .strip_suffix(']')
            .ok_or(AsmError::MalformedOperand { line, operand: tok.to_string(), reason: "unbalanced brackets" })?;
        return Ok(Syntax::Mem(classify(line, inner.trim())?));
    }
    if tok.ends_with(']') {
        return Err(AsmError::MalformedOperand { line, operand: tok.to_string(), reason: "unbalanced brackets" });
    }
    Ok(Syntax::Plain(classify(line, tok)?))
}

/// Register name, numeric literal, or label reference, in that order.
fn classify(line: usize, tok: &str) -> Result<Arg, AsmError> {
    if let Some(r) = Register::parse(tok) {
        return Ok(Arg::Reg(r));
    }
    if tok.starts_with('-') {
        return Err(AsmError::MalformedOperand {
            line,
            operand: tok.to_string(),
            reason: "negative literals are not supported",
        });
    }
    if tok.starts_with(|c: char| c.is_ascii_digit()) {
        return parse_num(tok).map(Arg::Imm).ok_or(AsmError::MalformedOperand {
            line,
            operand: tok.to_string(),
            reason: "bad numeric literal",
        });
    }
    if labels::is_referable(tok) {
        return Ok(Arg::Label(tok.to_string()));
    }
    Err(AsmError::AmbiguousAddressingMode { line, operand: tok.to_string() })
}

/// Decimal or `0x` hex, unsigned 32-bit.
pub fn parse_num(s: &str) -> Option<u32> {
    let (digits, radix) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => (hex, 16),
        None => (s, 10),
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return None;
    }
    u32::from_str_radix(digits, radix).ok()
}

fn arg_text(arg: &Arg) -> String {
    match arg {
        Arg::Reg(r) => r.name().to_string(),
        Arg::Imm(v) => v.to_string(),
        Arg::Label(l) => l.clone(),
    }
}

fn malformed(line: usize, arg: &Arg, reason: &'static str) -> AsmError {
    AsmError::MalformedOperand { line, operand: arg_text(arg), reason }
}

fn plain_reg(line: usize, op: Syntax, reason: &'static str) -> Result<Register, AsmError> {
    match op {
        Syntax::Plain(Arg::Reg(r)) => Ok(r),
        Syntax::Plain(arg) => Err(malformed(line, &arg, reason)),
        Syntax::Mem(arg) => Err(malformed(line, &arg, "memory operand only valid for load/store")),
    }
}

fn plain_any(line: usize, op: Syntax) -> Result<Arg, AsmError> {
    match op {
        Syntax::Plain(arg) => Ok(arg),
        Syntax::Mem(arg) => Err(malformed(line, &arg, "memory operand only valid for load/store")),
    }
}

fn plain_value(line: usize, op: Syntax) -> Result<Arg, AsmError> {
    match plain_any(line, op)? {
        Arg::Reg(r) => Err(malformed(line, &Arg::Reg(r), "expected an immediate or label")),
        arg => Ok(arg),
    }
}
