use std::fmt;

use lazy_static::lazy_static;
use miette::{bail, Result};
use regex::Regex;

use crate::word::{Operand, REGISTER_COUNT};

lazy_static! {
    static ref ASSIGNMENT: Regex = Regex::new(r"^[rR](\d+)=(\d+)$").unwrap();
}

/// The eight general purpose registers.
///
/// Out-of-range indices read as zero and writes to them are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RegisterFile {
    reg: [u16; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a list such as `r1=5,r7=3`.
    pub fn from_assignments(list: &str) -> Result<Self> {
        let mut file = Self::new();
        for pair in list.split(',').map(str::trim).filter(|pair| !pair.is_empty()) {
            let Some(caps) = ASSIGNMENT.captures(pair) else {
                bail!("Failed to parse register assignment `{}`", pair);
            };
            let Ok(index) = caps[1].parse::<usize>() else {
                bail!("Bad register number in `{}`", pair);
            };
            if index >= REGISTER_COUNT {
                bail!("Illegal register number {} in `{}`", index, pair);
            }
            let Ok(val) = caps[2].parse::<u16>() else {
                bail!("Bad register value in `{}`", pair);
            };
            file.set(index, val);
        }
        Ok(file)
    }

    pub fn get(&self, n: usize) -> u16 {
        self.reg.get(n).copied().unwrap_or(0)
    }

    pub fn set(&mut self, n: usize, val: u16) {
        if let Some(reg) = self.reg.get_mut(n) {
            *reg = val;
        }
    }

    /// Value of an operand: literals stand for themselves.
    pub fn resolve(&self, operand: Operand) -> u16 {
        match operand {
            Operand::Literal(value) => value,
            Operand::Register(reg) => self.get(reg.index()),
        }
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, val) in self.reg.iter().enumerate() {
            if i != 0 {
                write!(f, ", ")?;
            }
            write!(f, "r{}={}", i, val)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::Register;

    #[test]
    fn tolerant_access() {
        let mut file = RegisterFile::new();
        file.set(3, 42);
        file.set(8, 1);
        file.set(usize::MAX, 1);
        assert_eq!(file.get(3), 42);
        assert_eq!(file.get(8), 0);
        assert_eq!(file.get(100), 0);
    }

    #[test]
    fn literals_resolve_to_themselves() {
        let file = RegisterFile::from_assignments("r0=9,r1=8").unwrap();
        for word in 0..=32767u16 {
            assert_eq!(file.resolve(Operand::try_from(word).unwrap()), word);
        }
    }

    #[test]
    fn registers_resolve_to_contents() {
        let mut file = RegisterFile::new();
        for i in 0..REGISTER_COUNT {
            file.set(i, (i as u16 + 1) * 100);
        }
        for word in 32768..=32775u16 {
            let index = (word - 32768) as usize;
            assert_eq!(file.resolve(Operand::try_from(word).unwrap()), file.get(index));
        }
        assert_eq!(file.resolve(Operand::Register(Register::R4)), 500);
        assert_eq!(file.resolve(Operand::Literal(500)), 500);
    }

    #[test]
    fn assignments() {
        let file = RegisterFile::from_assignments("r1=5, R7=32767").unwrap();
        assert_eq!(file.get(1), 5);
        assert_eq!(file.get(7), 32767);
        assert_eq!(file.get(0), 0);

        assert!(RegisterFile::from_assignments("r8=1").is_err());
        assert!(RegisterFile::from_assignments("r1=70000").is_err());
        assert!(RegisterFile::from_assignments("x1=1").is_err());
    }

    #[test]
    fn display() {
        let file = RegisterFile::from_assignments("r2=4").unwrap();
        assert_eq!(
            file.to_string(),
            "r0=0, r1=0, r2=4, r3=0, r4=0, r5=0, r6=0, r7=0"
        );
    }
}
