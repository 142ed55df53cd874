use std::io::Write;

use crate::annotation::Annotations;
use crate::error::DisasmError;
use crate::isa::{Instruction, MAX_INSTRUCTION_LEN};
use crate::symbol::SymbolTable;

/// Width of the right-aligned address name column.
const NAME_WIDTH: usize = 30;
/// Width of the rendered instruction column, when followed by a comment.
const INSTR_WIDTH: usize = 30;
/// Name column plus its `:  ` separator.
const LISTING_INDENT: usize = NAME_WIDTH + 3;
/// Raw address (`{:5}:  `), four raw words and a separator.
const FULL_INDENT: usize = 8 + MAX_INSTRUCTION_LEN * 6 + 1;

/// Renders a word stream as a listing, without executing it.
pub struct Disassembler<'a> {
    symbols: &'a SymbolTable,
    annotations: &'a Annotations,
    /// Also print raw addresses and operand words.
    full: bool,
}

impl<'a> Disassembler<'a> {
    pub fn new(symbols: &'a SymbolTable, annotations: &'a Annotations) -> Self {
        Self {
            symbols,
            annotations,
            full: false,
        }
    }

    pub fn full(mut self, full: bool) -> Self {
        self.full = full;
        self
    }

    /// Write the listing of `words`, starting at address `start`.
    ///
    /// With a `limit`, no instruction starting `limit` or more words after `start` is decoded.
    /// The first undecodable instruction aborts the listing.
    pub fn write_listing(
        &self,
        out: &mut impl Write,
        words: &[u16],
        start: u16,
        limit: Option<usize>,
    ) -> Result<(), DisasmError> {
        let end = match limit {
            Some(limit) => (start as usize).saturating_add(limit).min(words.len()),
            None => words.len(),
        };
        let indent = if self.full {
            LISTING_INDENT + FULL_INDENT
        } else {
            LISTING_INDENT
        };

        let mut addr = start as usize;
        // End address of the block currently being listed
        let mut block_end: Option<u16> = None;

        while addr < end {
            let at = addr as u16;

            if let Some(block) = self.annotations.get_block(at) {
                writeln!(out)?;
                for line in &block.lines {
                    writeln!(out, "{:indent$}// {}", "", line, indent = indent)?;
                }
                block_end = Some(block.end);
            }

            let (instr, len) = Instruction::decode(words, addr)
                .map_err(|error| DisasmError::Decode { addr: at, error })?;

            write!(out, "{:>NAME_WIDTH$}:  ", self.symbols.addr_to_name(at))?;
            if self.full {
                self.write_raw(out, at, &words[addr..addr + len])?;
            }

            let text = instr.render(self.symbols).to_string();
            match self.annotations.get_single(at) {
                Some(comment) => writeln!(out, "{:<INSTR_WIDTH$}// {}", text, comment)?,
                None => writeln!(out, "{}", text)?,
            }

            addr += len;
            if block_end.is_some_and(|end| addr > end as usize) {
                writeln!(out)?;
                block_end = None;
            }
        }
        Ok(())
    }

    fn write_raw(&self, out: &mut impl Write, addr: u16, raw: &[u16]) -> Result<(), DisasmError> {
        write!(out, "{:5}:  ", addr)?;
        for word in raw {
            write!(out, "{:5} ", word)?;
        }
        for _ in raw.len()..MAX_INSTRUCTION_LEN {
            write!(out, "      ")?;
        }
        write!(out, " ")?;
        Ok(())
    }
}
