//! Console collaborator interface.
//!
//! The interactive layer owns the real terminal; the core only needs a
//! character source and a line sink for diagnostic output from trap
//! handling. Tests substitute a buffering console.

use std::io::{Read, Write};

/// Character-level console access.
pub trait Console {
    /// Reads one character, or `None` when no input is available.
    fn read_char(&mut self) -> Option<char>;

    /// Writes one diagnostic line.
    fn write_line(&mut self, text: &str);
}

/// Console over the process stdin/stdout.
#[derive(Default)]
pub struct StdConsole;

impl Console for StdConsole {
    fn read_char(&mut self) -> Option<char> {
        let mut byte = [0u8; 1];
        match std::io::stdin().read(&mut byte) {
            Ok(1) => Some(byte[0] as char),
            _ => None,
        }
    }

    fn write_line(&mut self, text: &str) {
        let mut out = std::io::stdout();
        let _ = writeln!(out, "{}", text);
    }
}

/// Console that captures output, for tests.
#[derive(Default)]
pub struct BufferConsole {
    pub lines: Vec<String>,
}

impl Console for BufferConsole {
    fn read_char(&mut self) -> Option<char> {
        None
    }

    fn write_line(&mut self, text: &str) {
        self.lines.push(text.to_string());
    }
}
