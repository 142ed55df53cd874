use std::{fs, path::Path};

use fxhash::{FxHashMap, FxHashSet};
use lazy_static::lazy_static;
use miette::{IntoDiagnostic, Result};
use regex::Regex;

use crate::error;
use crate::symbol::SymbolTable;
use crate::word::MEMORY_SIZE;

lazy_static! {
    /// Address, range or `name[+offset]`, then an optional `// comment`.
    static ref LOCATION_LINE: Regex = Regex::new(
        r"^(?:(\d+)(?:-(\d+))?|(\w+)(?:\+(\d+))?)(?:\s+//\s*(\S.*))?$"
    )
    .unwrap();
    static ref COMMENT_LINE: Regex = Regex::new(r"^//\s*(\S.*)$").unwrap();
}

/// Multi-line commentary spanning `start..=end`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub start: u16,
    pub end: u16,
    pub lines: Vec<String>,
}

/// Address-keyed commentary used by the disassembler.
///
/// Each address holds at most one single-line comment and one block.
#[derive(Debug, Default)]
pub struct Annotations {
    singles: FxHashMap<u16, String>,
    blocks: FxHashMap<u16, Block>,
}

impl Annotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_single(&self, addr: u16) -> Option<&str> {
        self.singles.get(&addr).map(String::as_str)
    }

    pub fn get_block(&self, addr: u16) -> Option<&Block> {
        self.blocks.get(&addr)
    }

    /// Parse annotation text. Symbol names are resolved through `symbols`.
    pub fn parse(origin: &str, src: &str, symbols: &SymbolTable) -> Result<Self> {
        let mut out = Self::new();
        let mut starts = FxHashSet::default();
        let mut current: Option<Block> = None;

        for (i, line) in src.lines().enumerate() {
            let line_num = i + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(caps) = COMMENT_LINE.captures(line) {
                let Some(block) = current.as_mut() else {
                    return Err(error::annotation_orphan(origin, src, line_num));
                };
                block.lines.push(caps[1].to_string());
                continue;
            }

            let Some(caps) = LOCATION_LINE.captures(line) else {
                return Err(error::annotation_malformed(origin, src, line_num));
            };
            let (start, end) = location(&caps, symbols)
                .map_err(|msg| error::annotation_bad_location(origin, src, line_num, msg))?;
            if !starts.insert(start) {
                return Err(error::annotation_duplicate(origin, src, line_num, start));
            }

            if let Some(comment) = caps.get(5) {
                out.singles.insert(start, comment.as_str().to_string());
            }
            out.close(current.take());
            current = Some(Block {
                start,
                end,
                lines: Vec::new(),
            });
        }
        out.close(current);
        Ok(out)
    }

    pub fn read(path: &Path, symbols: &SymbolTable) -> Result<Self> {
        let src = fs::read_to_string(path).into_diagnostic()?;
        Self::parse(&path.display().to_string(), &src, symbols)
    }

    /// Keep a finished block, unless nothing was attached to it.
    fn close(&mut self, block: Option<Block>) {
        if let Some(block) = block.filter(|block| !block.lines.is_empty()) {
            self.blocks.insert(block.start, block);
        }
    }
}

fn location(caps: &regex::Captures, symbols: &SymbolTable) -> Result<(u16, u16), String> {
    let addr = |text: &str| -> Result<u16, String> {
        text.parse::<u16>()
            .ok()
            .filter(|&addr| (addr as usize) < MEMORY_SIZE)
            .ok_or_else(|| format!("Address {} is outside of memory", text))
    };

    if let Some(start) = caps.get(1) {
        let start = addr(start.as_str())?;
        let end = match caps.get(2) {
            Some(end) => addr(end.as_str())?,
            None => start,
        };
        if end < start {
            return Err(format!("Range {}-{} ends before it starts", start, end));
        }
        return Ok((start, end));
    }

    let name = &caps[3];
    let entry = symbols
        .lookup_name(name)
        .ok_or_else(|| format!("Unknown symbol `{}`", name))?;
    let Some(offset) = caps.get(4) else {
        return Ok((entry.start, entry.end));
    };
    let at = offset
        .as_str()
        .parse::<u16>()
        .ok()
        .and_then(|offset| entry.start.checked_add(offset))
        .filter(|&at| at <= entry.end)
        .ok_or_else(|| format!("Offset {} extends beyond `{}`", offset.as_str(), name))?;
    Ok((at, at))
}
