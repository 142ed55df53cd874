use std::collections::VecDeque;
use std::io::{self, IsTerminal, Read, Write};

use crossterm::{
    event::{self, Event, KeyEvent},
    terminal,
};

use crate::output::{self, MsgColor};
use crate::runtime::TraceToggle;

/// Similar to [`crossterm::event::KeyCode`] but only contains relevant information.
#[derive(Debug, PartialEq, Eq)]
enum Key {
    Enter,
    /// `Ctrl+D`: no more input.
    EndOfInput,
    /// `Ctrl+T`: flip instruction tracing.
    ToggleTrace,
    Char(char),
}

/// Must only be called if terminal is NOT in raw mode.
fn enable_raw_mode() -> io::Result<()> {
    debug_assert!(
        !terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should not be in raw mode to enable raw mode",
    );
    terminal::enable_raw_mode()
}

/// Must only be called if terminal is in raw mode.
fn disable_raw_mode() -> io::Result<()> {
    debug_assert!(
        terminal::is_raw_mode_enabled().is_ok_and(|is| is),
        "terminal should already be in raw mode to disable raw mode",
    );
    terminal::disable_raw_mode()
}

/// Read next key from interactive terminal.
///
/// Events are consumed until a key event is read as a valid [`Key`].
///
/// `Ctrl+C` will always return the terminal to normal state and exit.
fn read_key() -> io::Result<Key> {
    loop {
        let event = event::read()?;
        if let Ok(key) = event.try_into() {
            return Ok(key);
        }
    }
}

/// Read single character from interactive terminal, echoing it.
///
/// Returns `None` once the user signals end of input.
fn read_char(trace: &TraceToggle) -> io::Result<Option<char>> {
    loop {
        enable_raw_mode()?;
        let key = read_key();
        disable_raw_mode()?;

        let ch = match key? {
            Key::Char(ch) => ch,
            Key::Enter => '\n',
            Key::EndOfInput => return Ok(None),
            Key::ToggleTrace => {
                let state = if trace.toggle() { "on" } else { "off" };
                output::message(MsgColor::Cyan, "Tracing", state);
                continue;
            }
        };
        let mut stdout = io::stdout();
        write!(stdout, "{}", ch)?;
        stdout.flush()?;
        return Ok(Some(ch));
    }
}

/// Byte reader over an interactive terminal, so that `in` sees every key
/// as soon as it is pressed.
///
/// Multi-byte characters are encoded as UTF-8 and handed out one byte per read.
/// `Ctrl+T` flips `trace` while waiting for a key.
#[derive(Debug)]
pub struct TermInput {
    pending: VecDeque<u8>,
    trace: TraceToggle,
}

impl TermInput {
    pub fn new(trace: TraceToggle) -> Self {
        Self {
            pending: VecDeque::new(),
            trace,
        }
    }
}

impl Read for TermInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            let Some(ch) = read_char(&self.trace)? else {
                return Ok(0);
            };
            let mut bytes = [0u8; 4];
            self.pending.extend(ch.encode_utf8(&mut bytes).bytes());
        }
        let mut count = 0;
        while count < buf.len() {
            let Some(byte) = self.pending.pop_front() else {
                break;
            };
            buf[count] = byte;
            count += 1;
        }
        Ok(count)
    }
}

/// Input for a machine attached to this process: raw key presses on a
/// terminal, plain bytes from a pipe or file otherwise.
pub fn stdin_input(trace: TraceToggle) -> Box<dyn Read> {
    if io::stdin().is_terminal() {
        Box::new(TermInput::new(trace))
    } else {
        Box::new(io::stdin())
    }
}

impl TryFrom<Event> for Key {
    type Error = ();
    fn try_from(event: Event) -> Result<Self, Self::Error> {
        if let Event::Key(event) = event {
            if let Ok(key) = event.try_into() {
                return Ok(key);
            }
        }
        Err(())
    }
}

impl TryFrom<KeyEvent> for Key {
    type Error = ();
    fn try_from(event: KeyEvent) -> Result<Self, Self::Error> {
        use event::{KeyCode, KeyEventKind, KeyModifiers as Mod};

        if matches!(event.kind, KeyEventKind::Release) {
            return Err(());
        }

        let key = match (event.modifiers, event.code) {
            // Ctrl+C
            (Mod::CONTROL, KeyCode::Char('c')) => {
                let _ = terminal::disable_raw_mode(); // Generic cleanup
                println!();
                std::process::exit(0);
            }
            (Mod::CONTROL, KeyCode::Char('d')) => Key::EndOfInput,
            (Mod::CONTROL, KeyCode::Char('t')) => Key::ToggleTrace,

            (_, KeyCode::Enter) | (_, KeyCode::Char('\n')) => Key::Enter,

            // Normal character
            (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) => Key::Char(ch),

            _ => return Err(()),
        };

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEventKind, KeyModifiers};

    #[test]
    fn key_conversion() {
        let press = |code, modifiers| Key::try_from(KeyEvent::new(code, modifiers));
        assert_eq!(press(KeyCode::Char('a'), KeyModifiers::NONE), Ok(Key::Char('a')));
        assert_eq!(press(KeyCode::Char('A'), KeyModifiers::SHIFT), Ok(Key::Char('A')));
        assert_eq!(press(KeyCode::Enter, KeyModifiers::NONE), Ok(Key::Enter));
        assert_eq!(
            press(KeyCode::Char('d'), KeyModifiers::CONTROL),
            Ok(Key::EndOfInput)
        );
        assert_eq!(
            press(KeyCode::Char('t'), KeyModifiers::CONTROL),
            Ok(Key::ToggleTrace)
        );
        assert_eq!(press(KeyCode::Left, KeyModifiers::NONE), Err(()));

        let mut release = KeyEvent::new(KeyCode::Char('a'), KeyModifiers::NONE);
        release.kind = KeyEventKind::Release;
        assert_eq!(Key::try_from(release), Err(()));
    }

    #[test]
    fn hands_out_pending_bytes() {
        let mut input = TermInput::new(TraceToggle::new(false));
        input.pending.extend("é".bytes());
        let mut buf = [0u8; 1];
        assert_eq!(input.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0xc3);
        assert_eq!(input.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], 0xa9);
    }
}
