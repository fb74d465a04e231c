use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::Serialize;

use crate::decoder::{decode_stream, Decoded, DisasmError, Operand};
use crate::isa::tvm2::Instruction;
use crate::labels::{self, LabelKind, LabelTable};

/// Decoded program plus the labels used to render it.
#[derive(Debug, Clone, Serialize)]
pub struct Listing {
    pub instrs: Vec<Decoded>,
    pub labels: LabelTable,
    /// Address one past the last instruction.
    pub end: u32,
}

/// Decode `bytes` and attach labels: the supplied table when given, otherwise
/// labels synthesized from code targets.
pub fn disassemble_listing(bytes: &[u8], labels: Option<&LabelTable>) -> Result<Listing, DisasmError> {
    let instrs = decode_stream(bytes)?;
    let labels = match labels {
        Some(table) => {
            tracing::debug!(labels = table.len(), "labels imported");
            table.clone()
        }
        None => LabelTable::synthesize(&instrs),
    };
    Ok(Listing { instrs, labels, end: bytes.len() as u32 })
}

pub fn disassemble(bytes: &[u8], labels: Option<&LabelTable>) -> Result<String, DisasmError> {
    Ok(disassemble_listing(bytes, labels)?.render())
}

/// A rendered label line and the high-level scope it lives in.
#[derive(Debug, Clone, Copy)]
struct Scoped<'a> {
    name: &'a str,
    scope: &'a str,
}

impl Listing {
    pub fn render(&self) -> String {
        let scoped = self.scoped_labels();
        let at = |addr: u32| scoped.get(&addr).map(Vec::as_slice).unwrap_or(&[]);
        let mut out = String::new();
        let mut scope = "";
        for d in &self.instrs {
            write_labels(&mut out, &mut scope, at(d.addr));
            let _ = writeln!(out, "    {}", self.fmt_decoded(d, &scoped, scope));
        }
        // Labels declared after the last instruction.
        write_labels(&mut out, &mut scope, at(self.end));
        out
    }

    /// Labels that get a declaration line, i.e. those at an instruction start
    /// or at the end address, in table order with their enclosing scope.
    fn scoped_labels(&self) -> BTreeMap<u32, Vec<Scoped<'_>>> {
        let mut rendered: BTreeSet<u32> = self.instrs.iter().map(|d| d.addr).collect();
        rendered.insert(self.end);
        let mut scope = "";
        let mut out: BTreeMap<u32, Vec<Scoped<'_>>> = BTreeMap::new();
        for (addr, name) in self.labels.iter() {
            if !rendered.contains(&addr) {
                continue;
            }
            if labels::kind_of(name) == LabelKind::High {
                scope = name;
            }
            out.entry(addr).or_default().push(Scoped { name, scope });
        }
        out
    }

    /// `mnemonic dst, src`, lowercase; memory sides of load/store in brackets.
    fn fmt_decoded(&self, d: &Decoded, scoped: &BTreeMap<u32, Vec<Scoped<'_>>>, scope: &str) -> String {
        let mut s = d.instr.to_string();
        if let Some(dst) = d.dst {
            let text = match dst {
                Operand::Imm(v) if d.code_target().is_some() => scoped
                    .get(&v)
                    .and_then(|here| label_ref(here, scope))
                    .unwrap_or_else(|| v.to_string()),
                op => fmt_operand(op),
            };
            if d.instr == Instruction::Store {
                let _ = write!(s, " [{text}]");
            } else {
                let _ = write!(s, " {text}");
            }
        }
        if let Some(src) = d.src {
            if d.instr == Instruction::Load {
                let _ = write!(s, ", [{}]", fmt_operand(src));
            } else {
                let _ = write!(s, ", {}", fmt_operand(src));
            }
        }
        s
    }
}

fn write_labels<'a>(out: &mut String, scope: &mut &'a str, here: &[Scoped<'a>]) {
    for l in here {
        let _ = writeln!(out, "{}:", l.name);
        *scope = l.scope;
    }
}

/// Spelling of a reference to one of `here` from inside `scope` that resolves
/// back to the same address: a local of the current scope, else a high or
/// system name, else a local qualified with its own scope. `None` when only
/// unscoped locals remain.
fn label_ref(here: &[Scoped<'_>], scope: &str) -> Option<String> {
    if let Some(l) = here.iter().find(|l| is_local(l) && l.scope == scope) {
        return Some(l.name.to_string());
    }
    if let Some(l) = here.iter().find(|l| !is_local(l)) {
        return Some(l.name.to_string());
    }
    here.iter().find(|l| !l.scope.is_empty()).map(|l| labels::qualify(l.scope, l.name))
}

fn is_local(l: &Scoped<'_>) -> bool {
    labels::kind_of(l.name) == LabelKind::Local
}

fn fmt_operand(op: Operand) -> String {
    match op {
        Operand::Reg(r) => r.name().to_string(),
        Operand::Imm(v) => v.to_string(),
    }
}
