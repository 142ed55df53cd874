use miette::{bail, miette, Result};

use crate::error::AddressOutOfRange;
use crate::image::Image;
use crate::word::MEMORY_SIZE;

/// Complete address space of the machine.
pub struct Memory {
    words: Box<[u16]>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            words: vec![0; MEMORY_SIZE].into_boxed_slice(),
        }
    }

    /// Copy `image` to the start of memory.
    pub fn load(image: &Image) -> Self {
        let mut memory = Self::new();
        // `Image` guarantees it fits
        let words = image.words();
        memory.words[..words.len()].copy_from_slice(words);
        memory
    }

    pub fn read(&self, addr: u16) -> Result<u16, AddressOutOfRange> {
        self.words
            .get(addr as usize)
            .copied()
            .ok_or(AddressOutOfRange { addr })
    }

    pub fn write(&mut self, addr: u16, val: u16) -> Result<(), AddressOutOfRange> {
        let cell = self
            .words
            .get_mut(addr as usize)
            .ok_or(AddressOutOfRange { addr })?;
        *cell = val;
        Ok(())
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    /// Little-endian dump of the whole address space.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.words.iter().flat_map(|word| word.to_le_bytes()).collect()
    }

    /// Force values into memory from a list of `addr=val` pairs, separated by commas.
    pub fn apply_overrides(&mut self, pairs: &str) -> Result<()> {
        for pair in pairs.split(',').filter(|pair| !pair.is_empty()) {
            let Some((addr, val)) = pair.split_once('=') else {
                bail!("Bad pair `{}`, expected `addr=val`", pair);
            };
            let addr: u16 = addr
                .trim()
                .parse()
                .map_err(|_| miette!("Bad address `{}` in pair `{}`", addr, pair))?;
            let val: u16 = val
                .trim()
                .parse()
                .map_err(|_| miette!("Bad value `{}` in pair `{}`", val, pair))?;
            self.write(addr, val)
                .map_err(|e| miette!("{} in pair `{}`", e, pair))?;
        }
        Ok(())
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

/// Unbounded stack of words, separate from memory.
#[derive(Debug, Default)]
pub struct Stack(Vec<u16>);

impl Stack {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, val: u16) {
        self.0.push(val);
    }

    /// Returns `None` when empty; callers decide whether that is fatal.
    pub fn pop(&mut self) -> Option<u16> {
        self.0.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounds_checked_access() {
        let mut memory = Memory::new();
        assert_eq!(memory.write(32767, 9), Ok(()));
        assert_eq!(memory.read(32767), Ok(9));
        assert_eq!(memory.read(32768), Err(AddressOutOfRange { addr: 32768 }));
        assert_eq!(
            memory.write(u16::MAX, 1),
            Err(AddressOutOfRange { addr: u16::MAX })
        );
    }

    #[test]
    fn stores_full_cells() {
        let mut memory = Memory::new();
        memory.write(4, 0xffff).unwrap();
        assert_eq!(memory.read(4), Ok(0xffff));
    }

    #[test]
    fn dump_is_little_endian() {
        let mut memory = Memory::new();
        memory.write(0, 0x1234).unwrap();
        memory.write(1, 0x00ff).unwrap();
        let bytes = memory.to_bytes();
        assert_eq!(bytes.len(), MEMORY_SIZE * 2);
        assert_eq!(&bytes[..4], &[0x34, 0x12, 0xff, 0x00]);
    }

    #[test]
    fn overrides() {
        let mut memory = Memory::new();
        memory.apply_overrides("5=7,100=32768").unwrap();
        assert_eq!(memory.read(5), Ok(7));
        assert_eq!(memory.read(100), Ok(32768));

        assert!(memory.apply_overrides("5").is_err());
        assert!(memory.apply_overrides("x=1").is_err());
        assert!(memory.apply_overrides("40000=1").is_err());
    }

    #[test]
    fn stack_round_trip() {
        let mut stack = Stack::new();
        assert_eq!(stack.pop(), None);
        stack.push(3);
        stack.push(4);
        assert!(!stack.is_empty());
        assert_eq!(stack.pop(), Some(4));
        assert_eq!(stack.pop(), Some(3));
        assert!(stack.is_empty());
        assert_eq!(stack.pop(), None);
    }
}
