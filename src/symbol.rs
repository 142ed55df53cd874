use std::{fs, path::Path};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use miette::{bail, miette, IntoDiagnostic, Result};
use regex::Regex;

use crate::error::{self, SymbolError};
use crate::word::MEMORY_SIZE;

type FxIndexMap<K, V> = IndexMap<K, V, FxBuildHasher>;

lazy_static! {
    /// `name start[-end] [# comment]`
    static ref ENTRY: Regex =
        Regex::new(r"^(\w+)\s+([0-9]+)(?:-([0-9]+))?(?:\s*#.*)?$").unwrap();
    /// `name[+offset]`
    static ref NAME_WITH_OFFSET: Regex = Regex::new(r"^(\w+)(?:\+(\d+))?$").unwrap();
}

/// Named, inclusive address range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SymbolEntry {
    pub name: String,
    pub start: u16,
    pub end: u16,
}

impl SymbolEntry {
    pub fn contains(&self, addr: u16) -> bool {
        self.start <= addr && addr <= self.end
    }

    /// `name` at the start of the entry, `name+offset` elsewhere.
    pub fn offset_name(&self, offset: u16) -> String {
        if offset == 0 {
            self.name.clone()
        } else {
            format!("{}+{}", self.name, offset)
        }
    }
}

/// Interval map from address ranges to names, searchable both ways.
///
/// Entries are kept sorted by start address; ranges never overlap, so the
/// only candidate for an address is the entry with the greatest start not
/// above it.
#[derive(Debug, Default)]
pub struct SymbolTable {
    entries: FxIndexMap<String, SymbolEntry>,
    /// Indices into `entries`, sorted by start address.
    by_start: Vec<usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry_at(&self, sorted: usize) -> &SymbolEntry {
        &self.entries[self.by_start[sorted]]
    }

    pub fn add(&mut self, name: &str, start: u16, end: u16) -> Result<(), SymbolError> {
        if self.entries.contains_key(name) {
            return Err(SymbolError::DuplicateName {
                name: name.to_string(),
            });
        }
        if start > end {
            return Err(SymbolError::InvertedRange {
                name: name.to_string(),
                start,
                end,
            });
        }
        if end as usize >= MEMORY_SIZE {
            return Err(SymbolError::AddressOutOfRange {
                name: name.to_string(),
                addr: end,
            });
        }

        let pos = self
            .by_start
            .partition_point(|&i| self.entries[i].start <= start);
        // Predecessor must end before us, successor must start after us
        let neighbours = [pos.checked_sub(1), Some(pos)];
        for sorted in neighbours.into_iter().flatten() {
            let Some(&index) = self.by_start.get(sorted) else {
                continue;
            };
            let other = &self.entries[index];
            if other.start <= end && start <= other.end {
                return Err(SymbolError::Overlap {
                    name: name.to_string(),
                    other: other.name.clone(),
                });
            }
        }

        let entry = SymbolEntry {
            name: name.to_string(),
            start,
            end,
        };
        let (index, _) = self.entries.insert_full(name.to_string(), entry);
        self.by_start.insert(pos, index);
        Ok(())
    }

    /// Entry containing `addr`, with the offset of `addr` from its start.
    pub fn lookup_addr(&self, addr: u16) -> Option<(&SymbolEntry, u16)> {
        let pos = self
            .by_start
            .partition_point(|&i| self.entries[i].start <= addr);
        let entry = self.entry_at(pos.checked_sub(1)?);
        entry
            .contains(addr)
            .then(|| (entry, addr - entry.start))
    }

    pub fn lookup_name(&self, name: &str) -> Option<&SymbolEntry> {
        self.entries.get(name)
    }

    /// Symbolic form of `addr`, falling back to the decimal address.
    pub fn addr_to_name(&self, addr: u16) -> String {
        match self.lookup_addr(addr) {
            Some((entry, offset)) => entry.offset_name(offset),
            None => addr.to_string(),
        }
    }

    /// Resolve `1234`, `0x4d2`, `name` or `name+3` to an address.
    pub fn resolve_location(&self, text: &str) -> Result<u16> {
        let text = text.trim();
        if let Some(addr) = parse_number(text) {
            return Ok(addr);
        }

        let Some(caps) = NAME_WITH_OFFSET.captures(text) else {
            bail!("`{}` is neither an address nor a symbol", text);
        };
        let name = &caps[1];
        let Some(entry) = self.lookup_name(name) else {
            bail!("Unknown symbol `{}`", name);
        };
        let Some(offset) = caps.get(2) else {
            return Ok(entry.start);
        };
        let offset: u16 = offset
            .as_str()
            .parse()
            .map_err(|_| miette!("Bad offset in `{}`", text))?;
        match entry.start.checked_add(offset) {
            Some(addr) if addr <= entry.end => Ok(addr),
            _ => bail!("Offset in `{}` extends beyond `{}`", text, name),
        }
    }

    /// Parse the text format: one `name start[-end]` entry per line.
    ///
    /// `origin` names the source in diagnostics.
    pub fn parse(origin: &str, src: &str) -> Result<Self> {
        let mut table = Self::new();
        for (i, line) in src.lines().enumerate() {
            let line_num = i + 1;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let Some(caps) = ENTRY.captures(line) else {
                return Err(error::symtab_malformed(origin, src, line_num));
            };
            let start_text = &caps[2];
            let end_text = caps.get(3).map_or(start_text, |end| end.as_str());
            let start: u16 = start_text
                .parse()
                .map_err(|_| error::symtab_bad_number(origin, src, line_num, start_text))?;
            let end: u16 = end_text
                .parse()
                .map_err(|_| error::symtab_bad_number(origin, src, line_num, end_text))?;

            table
                .add(&caps[1], start, end)
                .map_err(|e| error::symtab_rejected(origin, src, line_num, e))?;
        }
        Ok(table)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let src = fs::read_to_string(path).into_diagnostic()?;
        Self::parse(&path.display().to_string(), &src)
    }
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_number(text: &str) -> Option<u16> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> SymbolTable {
        let mut table = SymbolTable::new();
        table.add("f", 10, 20).unwrap();
        table.add("g", 30, 50).unwrap();
        table
    }

    #[test]
    fn lookup_by_address() {
        let table = table();
        let found = |addr| table.lookup_addr(addr).map(|(e, offs)| (e.name.as_str(), offs));
        assert_eq!(found(15), Some(("f", 5)));
        assert_eq!(found(25), None);
        assert_eq!(found(30), Some(("g", 0)));
        assert_eq!(found(9), None);
        assert_eq!(found(10), Some(("f", 0)));
        assert_eq!(found(20), Some(("f", 10)));
        assert_eq!(found(50), Some(("g", 20)));
        assert_eq!(found(51), None);
        assert_eq!(found(0), None);
    }

    #[test]
    fn lookup_by_name() {
        let table = table();
        assert_eq!(
            table.lookup_name("g"),
            Some(&SymbolEntry {
                name: "g".to_string(),
                start: 30,
                end: 50
            })
        );
        assert_eq!(table.lookup_name("h"), None);
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut table = SymbolTable::new();
        table.add("c", 40, 41).unwrap();
        table.add("a", 2, 5).unwrap();
        table.add("b", 8, 10).unwrap();
        assert_eq!(table.addr_to_name(2), "a");
        assert_eq!(table.addr_to_name(9), "b+1");
        assert_eq!(table.addr_to_name(41), "c+1");
        assert_eq!(table.addr_to_name(6), "6");
    }

    #[test]
    fn rejects_bad_entries() {
        let mut table = table();
        assert_eq!(
            table.add("f", 100, 200),
            Err(SymbolError::DuplicateName {
                name: "f".to_string()
            })
        );
        assert_eq!(
            table.add("h", 20, 25),
            Err(SymbolError::Overlap {
                name: "h".to_string(),
                other: "f".to_string()
            })
        );
        assert_eq!(
            table.add("h", 21, 30),
            Err(SymbolError::Overlap {
                name: "h".to_string(),
                other: "g".to_string()
            })
        );
        assert_eq!(
            table.add("h", 5, 60),
            Err(SymbolError::Overlap {
                name: "h".to_string(),
                other: "f".to_string()
            })
        );
        assert!(matches!(
            table.add("h", 9, 8),
            Err(SymbolError::InvertedRange { .. })
        ));
        assert!(matches!(
            table.add("h", 32760, 32768),
            Err(SymbolError::AddressOutOfRange { .. })
        ));
        table.add("h", 21, 29).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn resolves_locations() {
        let table = table();
        assert_eq!(table.resolve_location("1234").unwrap(), 1234);
        assert_eq!(table.resolve_location("0x10").unwrap(), 16);
        assert_eq!(table.resolve_location("g").unwrap(), 30);
        assert_eq!(table.resolve_location("f+4").unwrap(), 14);
        assert_eq!(table.resolve_location("f+10").unwrap(), 20);
        assert!(table.resolve_location("f+11").is_err());
        assert!(table.resolve_location("nope").is_err());
        assert!(table.resolve_location("a b").is_err());
    }

    #[test]
    fn parses_text_format() {
        let src = "
            # comment
            a 4
            b 8-10  # another comment
        ";
        let table = SymbolTable::parse("test", src).unwrap();
        assert_eq!(
            table.lookup_name("a"),
            Some(&SymbolEntry {
                name: "a".to_string(),
                start: 4,
                end: 4
            })
        );
        assert_eq!(
            table.lookup_name("b"),
            Some(&SymbolEntry {
                name: "b".to_string(),
                start: 8,
                end: 10
            })
        );
    }

    #[test]
    fn parse_errors_name_line() {
        let err = SymbolTable::parse("test", "a 4\na 6\n").unwrap_err();
        assert!(err.to_string().contains("line 2"), "{}", err);
        assert!(err.to_string().contains("already exists"), "{}", err);

        let err = SymbolTable::parse("test", "a 4\n\nb four\n").unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);

        let err = SymbolTable::parse("test", "a 70000\n").unwrap_err();
        assert!(err.to_string().contains("line 1"), "{}", err);
    }
}
