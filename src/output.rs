use std::cell::RefCell;
use std::io::{self, Write};
use std::path::Path;
use std::str::Chars;

use colored::{ColoredString, Colorize};

thread_local! {
    static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
}

/// Strip colour and status decoration, for blackbox tests.
pub fn set_minimal(new_value: bool) -> bool {
    IS_MINIMAL.with(|value| value.replace(new_value))
}

pub fn is_minimal() -> bool {
    IS_MINIMAL.with(|value| *value.borrow())
}

#[derive(Clone, Copy, Debug)]
pub enum MsgColor {
    Green,
    Cyan,
    Red,
}

/// Status line such as `   Loading target image.bin`.
///
/// Printed to stderr so that program output on stdout stays clean.
pub fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    if is_minimal() {
        return;
    }
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    eprintln!("{left:>12} {right}");
}

pub fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

/// Trace sink on stderr.
///
/// Text is blue, or stripped of all escapes when minimal.
pub struct Writer;

impl Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let string = String::from_utf8_lossy(buf);
        let mut stderr = io::stderr().lock();
        if is_minimal() {
            for ch in Decolored::new(&string) {
                write!(stderr, "{}", ch)?;
            }
        } else {
            write!(stderr, "{}", ColoredString::from(&*string).blue())?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl Iterator for Decolored<'_> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}
