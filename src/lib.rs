// Machine model
mod word;
pub use word::{Operand, Register, MEMORY_SIZE, MODULUS, REGISTER_BASE, REGISTER_COUNT};
mod memory;
pub use memory::{Memory, Stack};
mod registers;
pub use registers::RegisterFile;
mod isa;
pub use isa::{Instruction, Opcode, Rendered, MAX_INSTRUCTION_LEN};

// Running
mod runtime;
pub use runtime::{Control, Halt, HaltReason, Machine, TraceToggle, Tracer};
mod term;
pub use term::{stdin_input, TermInput};
pub mod output;

// Loading and listing
mod image;
pub use image::{escape_string, Image};
mod symbol;
pub use symbol::{SymbolEntry, SymbolTable};
mod annotation;
pub use annotation::{Annotations, Block};
mod disasm;
pub use disasm::Disassembler;

mod error;
pub use error::{
    AddressOutOfRange, DecodeError, DisasmError, ImageError, MachineError, SymbolError,
};

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
