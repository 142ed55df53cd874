use std::{fs, path::Path};

use miette::{IntoDiagnostic, Result};

use crate::error::ImageError;
use crate::word::MEMORY_SIZE;

/// Raw program image: little-endian words, loaded verbatim from address 0.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    words: Vec<u16>,
}

impl Image {
    /// Images larger than memory are rejected rather than truncated.
    pub fn from_words(words: Vec<u16>) -> Result<Self, ImageError> {
        if words.len() > MEMORY_SIZE {
            return Err(ImageError::TooLarge { words: words.len() });
        }
        Ok(Self { words })
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ImageError> {
        if bytes.len() % 2 != 0 {
            return Err(ImageError::Misaligned { bytes: bytes.len() });
        }
        let words = bytes
            .chunks_exact(2)
            .map(|word| u16::from_le_bytes([word[0], word[1]]))
            .collect();
        Self::from_words(words)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).into_diagnostic()?;
        Self::from_bytes(&bytes).into_diagnostic()
    }

    pub fn words(&self) -> &[u16] {
        &self.words
    }

    fn word(&self, addr: usize) -> Result<u16, ImageError> {
        self.words
            .get(addr)
            .copied()
            .ok_or(ImageError::OutOfBounds { addr })
    }

    /// Length-prefixed string at `addr`.
    ///
    /// With `indirect`, the word at `addr` holds the address of the string instead.
    pub fn string_at(&self, addr: u16, indirect: bool) -> Result<&[u16], ImageError> {
        let mut addr = addr as usize;
        if indirect {
            addr = self.word(addr)? as usize;
        }
        let len = self.word(addr)? as usize;
        let start = addr + 1;
        self.words
            .get(start..start + len)
            .ok_or(ImageError::OutOfBounds { addr: start + len })
    }
}

/// Printable form of a string of character words; other bytes become `\xx`.
pub fn escape_string(chars: &[u16]) -> String {
    let mut out = String::with_capacity(chars.len());
    for &ch in chars {
        let byte = ch as u8;
        if byte.is_ascii_graphic() || byte == b' ' {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{:02x}", byte));
        }
    }
    out
}
