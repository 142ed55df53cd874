use std::fmt;

use crate::error::DecodeError;
use crate::symbol::SymbolTable;
use crate::word::{Operand, Register};

/// Longest instruction: an opcode and three operands.
pub const MAX_INSTRUCTION_LEN: usize = 4;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u16)]
pub enum Opcode {
    Halt = 0,
    Set,
    Push,
    Pop,
    Eq,
    Gt,
    Jmp,
    Jt,
    Jf,
    Add,
    Mult,
    Mod,
    And,
    Or,
    Not,
    Rmem,
    Wmem,
    Call,
    Ret,
    Out,
    In,
    Noop,
}

impl Opcode {
    const TABLE: [Opcode; 22] = [
        Opcode::Halt,
        Opcode::Set,
        Opcode::Push,
        Opcode::Pop,
        Opcode::Eq,
        Opcode::Gt,
        Opcode::Jmp,
        Opcode::Jt,
        Opcode::Jf,
        Opcode::Add,
        Opcode::Mult,
        Opcode::Mod,
        Opcode::And,
        Opcode::Or,
        Opcode::Not,
        Opcode::Rmem,
        Opcode::Wmem,
        Opcode::Call,
        Opcode::Ret,
        Opcode::Out,
        Opcode::In,
        Opcode::Noop,
    ];

    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Halt => "hlt",
            Opcode::Set => "set",
            Opcode::Push => "push",
            Opcode::Pop => "pop",
            Opcode::Eq => "eq",
            Opcode::Gt => "gt",
            Opcode::Jmp => "jmp",
            Opcode::Jt => "jt",
            Opcode::Jf => "jf",
            Opcode::Add => "add",
            Opcode::Mult => "mult",
            Opcode::Mod => "mod",
            Opcode::And => "and",
            Opcode::Or => "or",
            Opcode::Not => "not",
            Opcode::Rmem => "rmem",
            Opcode::Wmem => "wmem",
            Opcode::Call => "call",
            Opcode::Ret => "ret",
            Opcode::Out => "out",
            Opcode::In => "in",
            Opcode::Noop => "nop",
        }
    }

    /// Number of operand words following the opcode.
    pub fn arity(self) -> usize {
        use Opcode::*;
        match self {
            Halt | Ret | Noop => 0,
            Push | Pop | Jmp | Call | Out | In => 1,
            Set | Jt | Jf | Not | Rmem | Wmem => 2,
            Eq | Gt | Add | Mult | Mod | And | Or => 3,
        }
    }
}

impl TryFrom<u16> for Opcode {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Self::TABLE
            .get(value as usize)
            .copied()
            .ok_or(DecodeError::UnknownOpcode { value })
    }
}

/// A decoded instruction. Result positions are always registers.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Instruction {
    Halt,
    Set { a: Register, b: Operand },
    Push { a: Operand },
    Pop { a: Register },
    Eq { a: Register, b: Operand, c: Operand },
    Gt { a: Register, b: Operand, c: Operand },
    Jmp { a: Operand },
    Jt { a: Operand, b: Operand },
    Jf { a: Operand, b: Operand },
    Add { a: Register, b: Operand, c: Operand },
    Mult { a: Register, b: Operand, c: Operand },
    Mod { a: Register, b: Operand, c: Operand },
    And { a: Register, b: Operand, c: Operand },
    Or { a: Register, b: Operand, c: Operand },
    Not { a: Register, b: Operand },
    Rmem { a: Register, b: Operand },
    Wmem { a: Operand, b: Operand },
    Call { a: Operand },
    Ret,
    Out { a: Operand },
    In { a: Register },
    Noop,
}

impl Instruction {
    /// Decode the instruction starting at `words[at]`.
    ///
    /// Returns the instruction and the number of words it occupies.
    pub fn decode(words: &[u16], at: usize) -> Result<(Instruction, usize), DecodeError> {
        let raw_op = *words.get(at).ok_or(DecodeError::EndOfStream)?;
        let opcode = Opcode::try_from(raw_op)?;
        let arity = opcode.arity();

        let operands = words.get(at + 1..).unwrap_or(&[]);
        if operands.len() < arity {
            return Err(DecodeError::Truncated {
                opcode,
                expected: arity,
                found: operands.len(),
            });
        }
        let raw = &operands[..arity];

        let reg = |position: usize| -> Result<Register, DecodeError> {
            match Operand::try_from(raw[position])? {
                Operand::Register(reg) => Ok(reg),
                Operand::Literal(value) => Err(DecodeError::NotARegister {
                    opcode,
                    position,
                    value,
                }),
            }
        };
        let op = |position: usize| Operand::try_from(raw[position]);

        let instr = match opcode {
            Opcode::Halt => Instruction::Halt,
            Opcode::Set => Instruction::Set { a: reg(0)?, b: op(1)? },
            Opcode::Push => Instruction::Push { a: op(0)? },
            Opcode::Pop => Instruction::Pop { a: reg(0)? },
            Opcode::Eq => Instruction::Eq { a: reg(0)?, b: op(1)?, c: op(2)? },
            Opcode::Gt => Instruction::Gt { a: reg(0)?, b: op(1)?, c: op(2)? },
            Opcode::Jmp => Instruction::Jmp { a: op(0)? },
            Opcode::Jt => Instruction::Jt { a: op(0)?, b: op(1)? },
            Opcode::Jf => Instruction::Jf { a: op(0)?, b: op(1)? },
            Opcode::Add => Instruction::Add { a: reg(0)?, b: op(1)?, c: op(2)? },
            Opcode::Mult => Instruction::Mult { a: reg(0)?, b: op(1)?, c: op(2)? },
            Opcode::Mod => Instruction::Mod { a: reg(0)?, b: op(1)?, c: op(2)? },
            Opcode::And => Instruction::And { a: reg(0)?, b: op(1)?, c: op(2)? },
            Opcode::Or => Instruction::Or { a: reg(0)?, b: op(1)?, c: op(2)? },
            Opcode::Not => Instruction::Not { a: reg(0)?, b: op(1)? },
            Opcode::Rmem => Instruction::Rmem { a: reg(0)?, b: op(1)? },
            Opcode::Wmem => Instruction::Wmem { a: op(0)?, b: op(1)? },
            Opcode::Call => Instruction::Call { a: op(0)? },
            Opcode::Ret => Instruction::Ret,
            Opcode::Out => Instruction::Out { a: op(0)? },
            Opcode::In => Instruction::In { a: reg(0)? },
            Opcode::Noop => Instruction::Noop,
        };
        Ok((instr, arity + 1))
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Instruction::Halt => Opcode::Halt,
            Instruction::Set { .. } => Opcode::Set,
            Instruction::Push { .. } => Opcode::Push,
            Instruction::Pop { .. } => Opcode::Pop,
            Instruction::Eq { .. } => Opcode::Eq,
            Instruction::Gt { .. } => Opcode::Gt,
            Instruction::Jmp { .. } => Opcode::Jmp,
            Instruction::Jt { .. } => Opcode::Jt,
            Instruction::Jf { .. } => Opcode::Jf,
            Instruction::Add { .. } => Opcode::Add,
            Instruction::Mult { .. } => Opcode::Mult,
            Instruction::Mod { .. } => Opcode::Mod,
            Instruction::And { .. } => Opcode::And,
            Instruction::Or { .. } => Opcode::Or,
            Instruction::Not { .. } => Opcode::Not,
            Instruction::Rmem { .. } => Opcode::Rmem,
            Instruction::Wmem { .. } => Opcode::Wmem,
            Instruction::Call { .. } => Opcode::Call,
            Instruction::Ret => Opcode::Ret,
            Instruction::Out { .. } => Opcode::Out,
            Instruction::In { .. } => Opcode::In,
            Instruction::Noop => Opcode::Noop,
        }
    }

    /// Words occupied, including the opcode.
    pub fn len(&self) -> usize {
        self.opcode().arity() + 1
    }

    /// Textual form, with literal jump and memory targets named from `symbols`.
    pub fn render<'a>(&'a self, symbols: &'a SymbolTable) -> Rendered<'a> {
        Rendered {
            instr: self,
            symbols,
        }
    }
}

/// Display adapter returned by [`Instruction::render`].
pub struct Rendered<'a> {
    instr: &'a Instruction,
    symbols: &'a SymbolTable,
}

impl Rendered<'_> {
    fn target(&self, f: &mut fmt::Formatter<'_>, operand: Operand) -> fmt::Result {
        match operand {
            Operand::Literal(addr) => match self.symbols.lookup_addr(addr) {
                Some((entry, offset)) => write!(f, "{} <{}>", addr, entry.offset_name(offset)),
                None => write!(f, "{}", addr),
            },
            Operand::Register(reg) => write!(f, "{}", reg),
        }
    }
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Instruction::*;

        let mnemonic = self.instr.opcode().mnemonic();
        match *self.instr {
            Halt | Ret | Noop => write!(f, "{}", mnemonic),
            Set { a, b } | Not { a, b } => write!(f, "{} {}, {}", mnemonic, a, b),
            Push { a } => write!(f, "{} {}", mnemonic, a),
            Pop { a } | In { a } => write!(f, "{} {}", mnemonic, a),
            Eq { a, b, c }
            | Gt { a, b, c }
            | Add { a, b, c }
            | Mult { a, b, c }
            | Mod { a, b, c }
            | And { a, b, c }
            | Or { a, b, c } => write!(f, "{} {}, {}, {}", mnemonic, a, b, c),
            Jmp { a } | Call { a } => {
                write!(f, "{} ", mnemonic)?;
                self.target(f, a)
            }
            Jt { a, b } | Jf { a, b } => {
                write!(f, "{} {}, ", mnemonic, a)?;
                self.target(f, b)
            }
            Rmem { a, b } => {
                write!(f, "{} {}, ", mnemonic, a)?;
                self.target(f, b)
            }
            Wmem { a, b } => {
                write!(f, "{} ", mnemonic)?;
                self.target(f, a)?;
                write!(f, ", {}", b)
            }
            Out { a: Operand::Literal(value) } => {
                let byte = value as u8;
                if byte.is_ascii_graphic() || byte == b' ' {
                    write!(f, "{} '{}'", mnemonic, byte as char)
                } else {
                    write!(f, "{} 0x{:02x}", mnemonic, byte)
                }
            }
            Out { a } => write!(f, "{} {}", mnemonic, a),
        }
    }
}
