use std::fmt;

use crate::error::DecodeError;

/// Number of addressable words.
pub const MEMORY_SIZE: usize = 0x8000;
/// Raw words from this value upwards refer to registers.
pub const REGISTER_BASE: u16 = 0x8000;
pub const REGISTER_COUNT: usize = 8;
/// Arithmetic is performed modulo this value.
pub const MODULUS: u32 = 0x8000;

/// One of the eight general purpose registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum Register {
    R0 = 0,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
}

impl Register {
    const ALL: [Register; REGISTER_COUNT] = [
        Register::R0,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.index())
    }
}

/// A decoded operand word: either a literal value or a register reference.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Operand {
    Literal(u16),
    Register(Register),
}

impl TryFrom<u16> for Operand {
    type Error = DecodeError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value < REGISTER_BASE {
            return Ok(Operand::Literal(value));
        }
        match Register::from_index((value - REGISTER_BASE) as usize) {
            Some(reg) => Ok(Operand::Register(reg)),
            None => Err(DecodeError::InvalidOperand { value }),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Literal(value) => write!(f, "{}", value),
            Operand::Register(reg) => write!(f, "{}", reg),
        }
    }
}
