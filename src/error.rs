use std::{error::Error, fmt, io, ops::Range};

use miette::{miette, LabeledSpan, NamedSource, Report, Severity};

use crate::isa::Opcode;

/// Error decoding a single instruction.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DecodeError {
    /// No opcode word could be read.
    EndOfStream,
    UnknownOpcode {
        value: u16,
    },
    /// Stream ended before every operand of `opcode` was read.
    Truncated {
        opcode: Opcode,
        expected: usize,
        found: usize,
    },
    /// A result position held something other than a register reference.
    NotARegister {
        opcode: Opcode,
        position: usize,
        value: u16,
    },
    /// Word above the register range.
    InvalidOperand {
        value: u16,
    },
}

/// Memory access outside of the address space.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct AddressOutOfRange {
    pub addr: u16,
}

/// Fatal error raised while executing a program.
#[derive(Debug)]
pub enum MachineError {
    Decode { pc: u16, error: DecodeError },
    AddressOutOfRange { pc: u16, addr: u16 },
    /// `pop` with an empty stack.
    StackUnderflow { pc: u16 },
    DivisionByZero { pc: u16 },
    /// `in` could not read another byte.
    InputExhausted { pc: u16 },
    Io(io::Error),
}

/// Error inserting into a symbol table.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SymbolError {
    DuplicateName { name: String },
    InvertedRange { name: String, start: u16, end: u16 },
    Overlap { name: String, other: String },
    AddressOutOfRange { name: String, addr: u16 },
}

/// Error loading a program image.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ImageError {
    Misaligned { bytes: usize },
    TooLarge { words: usize },
    /// Read past the end of the image.
    OutOfBounds { addr: usize },
}

/// Error producing a disassembly listing.
#[derive(Debug)]
pub enum DisasmError {
    Decode { addr: u16, error: DecodeError },
    Io(io::Error),
}

impl Error for DecodeError {}
impl Error for AddressOutOfRange {}
impl Error for SymbolError {}
impl Error for ImageError {}

impl Error for MachineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode { error, .. } => Some(error),
            Self::Io(error) => Some(error),
            _ => None,
        }
    }
}

impl Error for DisasmError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Decode { error, .. } => Some(error),
            Self::Io(error) => Some(error),
        }
    }
}

impl From<io::Error> for MachineError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<io::Error> for DisasmError {
    fn from(error: io::Error) -> Self {
        Self::Io(error)
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndOfStream => write!(f, "Unexpected end of word stream"),
            Self::UnknownOpcode { value } => write!(f, "Unknown opcode {}", value),
            Self::Truncated {
                opcode,
                expected,
                found,
            } => write!(
                f,
                "Truncated `{}` (expected {} operands, found {})",
                opcode.mnemonic(),
                expected,
                found
            ),
            Self::NotARegister {
                opcode,
                position,
                value,
            } => write!(
                f,
                "Operand {} of `{}` must be a register, found {}",
                position,
                opcode.mnemonic(),
                value
            ),
            Self::InvalidOperand { value } => {
                write!(f, "Operand {} is neither a literal nor a register", value)
            }
        }
    }
}

impl fmt::Display for AddressOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address {} is outside of memory", self.addr)
    }
}

impl fmt::Display for MachineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { pc, error } => write!(f, "Bad instruction at {}: {}", pc, error),
            Self::AddressOutOfRange { pc, addr } => {
                write!(f, "Address {} is outside of memory (at {})", addr, pc)
            }
            Self::StackUnderflow { pc } => write!(f, "Pop from empty stack at {}", pc),
            Self::DivisionByZero { pc } => write!(f, "Modulo by zero at {}", pc),
            Self::InputExhausted { pc } => write!(f, "Input ended while reading at {}", pc),
            Self::Io(error) => write!(f, "I/O failure: {}", error),
        }
    }
}

impl fmt::Display for SymbolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name } => write!(f, "`{}` already exists in table", name),
            Self::InvertedRange { name, start, end } => {
                write!(f, "Range of `{}` ends before it starts ({}-{})", name, start, end)
            }
            Self::Overlap { name, other } => {
                write!(f, "Range of `{}` overlaps with `{}`", name, other)
            }
            Self::AddressOutOfRange { name, addr } => {
                write!(f, "Address {} of `{}` is outside of memory", addr, name)
            }
        }
    }
}

impl fmt::Display for ImageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned { bytes } => {
                write!(f, "Image is not aligned to 16 bits ({} bytes)", bytes)
            }
            Self::TooLarge { words } => {
                write!(f, "Image of {} words does not fit in memory", words)
            }
            Self::OutOfBounds { addr } => write!(f, "Address {} is past end of image", addr),
        }
    }
}

impl fmt::Display for DisasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode { addr, error } => write!(f, "Bad instruction at {}: {}", addr, error),
            Self::Io(error) => write!(f, "I/O failure: {}", error),
        }
    }
}

// Text format errors

/// Byte range of a 1-based line within `src`, excluding the line terminator.
pub fn line_span(src: &str, line: usize) -> Range<usize> {
    let mut offs = 0;
    for (i, text) in src.split_inclusive('\n').enumerate() {
        if i + 1 == line {
            let trimmed = text.trim_end_matches(['\n', '\r']);
            return offs..offs + trimmed.len();
        }
        offs += text.len();
    }
    offs..offs
}

fn report_at(
    name: &str,
    src: &str,
    line: usize,
    code: &'static str,
    help: &'static str,
    label: &'static str,
    message: String,
) -> Report {
    let span = line_span(src, line);
    miette!(
        severity = Severity::Error,
        code = code,
        help = help,
        labels = vec![LabeledSpan::at(span, label)],
        "{} (line {})",
        message,
        line
    )
    .with_source_code(NamedSource::new(name, src.to_string()))
}

pub fn symtab_malformed(name: &str, src: &str, line: usize) -> Report {
    report_at(
        name,
        src,
        line,
        "symtab::malformed",
        "entries look like `name start[-end] [# comment]`",
        "malformed entry",
        "Could not parse symbol table entry".to_string(),
    )
}

pub fn symtab_bad_number(name: &str, src: &str, line: usize, text: &str) -> Report {
    report_at(
        name,
        src,
        line,
        "symtab::bad_number",
        "addresses range from 0 to 32,767",
        "invalid address",
        format!("Invalid address `{}`", text),
    )
}

pub fn symtab_rejected(name: &str, src: &str, line: usize, error: SymbolError) -> Report {
    report_at(
        name,
        src,
        line,
        "symtab::rejected",
        "symbol names must be unique and ranges must not overlap",
        "rejected entry",
        error.to_string(),
    )
}

pub fn annotation_malformed(name: &str, src: &str, line: usize) -> Report {
    report_at(
        name,
        src,
        line,
        "annotation::malformed",
        "lines are `addr[-end] [// text]`, `name[+off] [// text]` or `// text`",
        "malformed line",
        "Could not parse annotation line".to_string(),
    )
}

pub fn annotation_bad_location(name: &str, src: &str, line: usize, message: String) -> Report {
    report_at(
        name,
        src,
        line,
        "annotation::location",
        "names must exist in the symbol table and offsets must stay within the entry",
        "invalid location",
        message,
    )
}

pub fn annotation_duplicate(name: &str, src: &str, line: usize, addr: u16) -> Report {
    report_at(
        name,
        src,
        line,
        "annotation::duplicate",
        "each address may only open one annotation",
        "duplicate start",
        format!("Duplicate start address {}", addr),
    )
}

pub fn annotation_orphan(name: &str, src: &str, line: usize) -> Report {
    report_at(
        name,
        src,
        line,
        "annotation::orphan",
        "a `//` line must follow an address, range or symbol line",
        "no open block",
        "Comment line outside of any block".to_string(),
    )
}
