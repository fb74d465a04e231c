use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::decoder::Decoded;
use crate::isa::tvm2::{Register, SYS_ENTER_ADDR};

pub const LOCAL_PREFIX: char = '.';
pub const SYSTEM_PREFIX: char = '$';
/// Prefix of labels synthesized by the disassembler (`.l1`, `.l2`, ...).
pub const SYNTH_PREFIX: &str = ".l";

/// Fixed addresses that are never declared by source.
pub const SYSTEM_LABELS: &[(&str, u32)] = &[("$sys_enter", SYS_ENTER_ADDR)];

pub fn system_label(name: &str) -> Option<u32> {
    SYSTEM_LABELS.iter().find(|(n, _)| *n == name).map(|&(_, a)| a)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    High,
    Local,
    System,
}

pub fn kind_of(name: &str) -> LabelKind {
    if name.starts_with(SYSTEM_PREFIX) {
        LabelKind::System
    } else if name.starts_with(LOCAL_PREFIX) {
        LabelKind::Local
    } else {
        LabelKind::High
    }
}

fn is_ident(s: &str) -> bool {
    let mut cs = s.chars();
    matches!(cs.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && cs.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Name usable in a declaration: optional `.`/`$` prefix plus an identifier
/// that does not spell a register.
pub fn is_declarable(name: &str) -> bool {
    if Register::parse(name).is_some() {
        return false;
    }
    let body = name
        .strip_prefix(|c: char| c == LOCAL_PREFIX || c == SYSTEM_PREFIX)
        .unwrap_or(name);
    is_ident(body)
}

/// Name usable as a reference; additionally accepts a qualified `scope.local`.
pub fn is_referable(name: &str) -> bool {
    if is_declarable(name) {
        return true;
    }
    match name.split_once(LOCAL_PREFIX) {
        Some((scope, local)) => is_ident(scope) && is_ident(local),
        None => false,
    }
}

/// Qualify `name` against the current top-level scope. Only local names change.
pub fn qualify(scope: &str, name: &str) -> String {
    match kind_of(name) {
        LabelKind::Local => format!("{scope}{name}"),
        _ => name.to_string(),
    }
}

/// Strip scope qualification, keeping the last path component with its prefix.
pub fn demangle(name: &str) -> &str {
    if kind_of(name) == LabelKind::System {
        return name;
    }
    match name.rfind(LOCAL_PREFIX) {
        Some(i) => &name[i..],
        None => name,
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelTableError {
    #[error("malformed label table line {line}: {text:?}")]
    Malformed { line: usize, text: String },
}

/// Address to label-name table, sorted by address. Several names may share an
/// address; they keep insertion order and the first is used for references.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTable {
    entries: BTreeMap<u32, Vec<String>>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, addr: u32, name: impl Into<String>) {
        self.entries.entry(addr).or_default().push(name.into());
    }

    pub fn names_at(&self, addr: u32) -> &[String] {
        self.entries.get(&addr).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn name_for(&self, addr: u32) -> Option<&str> {
        self.names_at(addr).first().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &str)> + '_ {
        self.entries
            .iter()
            .flat_map(|(&a, names)| names.iter().map(move |n| (a, n.as_str())))
    }

    /// Parse `<8 hex digits>   <name>` lines; blank lines are skipped. Names
    /// must be declarable.
    pub fn parse(text: &str) -> Result<Self, LabelTableError> {
        let mut table = Self::new();
        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let bad = || LabelTableError::Malformed { line: i + 1, text: raw.to_string() };
            let (addr, name) = line.split_once(char::is_whitespace).ok_or_else(bad)?;
            let name = name.trim();
            if addr.is_empty() || addr.len() > 8 || !is_declarable(name) {
                return Err(bad());
            }
            let addr = u32::from_str_radix(addr, 16).map_err(|_| bad())?;
            table.insert(addr, name);
        }
        Ok(table)
    }

    /// Name every code target that is also an instruction start, in ascending
    /// address order: `.l1`, `.l2`, ...
    pub fn synthesize(instrs: &[Decoded]) -> Self {
        let starts: BTreeSet<u32> = instrs.iter().map(|d| d.addr).collect();
        let targets: BTreeSet<u32> = instrs
            .iter()
            .filter_map(Decoded::code_target)
            .filter(|t| starts.contains(t))
            .collect();
        let mut table = Self::new();
        for (n, addr) in targets.into_iter().enumerate() {
            table.insert(addr, format!("{SYNTH_PREFIX}{}", n + 1));
        }
        tracing::debug!(labels = table.len(), "labels synthesized");
        table
    }
}

impl fmt::Display for LabelTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (addr, name) in self.iter() {
            writeln!(f, "{addr:08x}   {name}")?;
        }
        Ok(())
    }
}
