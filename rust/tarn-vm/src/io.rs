//! I/O handles used by the output, input and logging opcodes.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{BufRead, Write};
use std::rc::Rc;
use tracing::warn;

pub trait IoHandle {
    fn output(&mut self, text: &str);
    fn input(&mut self, prompt: &str) -> String;
}

/// Writes to stdout and reads lines from stdin.
#[derive(Debug, Default)]
pub struct StdIo;

impl IoHandle for StdIo {
    fn output(&mut self, text: &str) {
        println!("{text}");
    }

    fn input(&mut self, prompt: &str) -> String {
        read_reply(&mut std::io::stdout().lock(), &mut std::io::stdin().lock(), prompt)
    }
}

/// Writes `prompt` and reads one line without its terminator. I/O failures
/// are logged and read as an empty reply.
fn read_reply(out: &mut impl Write, inp: &mut impl BufRead, prompt: &str) -> String {
    if let Err(e) = out.write_all(prompt.as_bytes()).and_then(|()| out.flush()) {
        warn!(error = %e, "failed to write input prompt");
    }
    let mut line = String::new();
    if let Err(e) = inp.read_line(&mut line) {
        warn!(error = %e, "failed to read input");
        return String::new();
    }
    line.trim_end_matches(['\n', '\r']).to_string()
}

/// Records output and replays queued input. Clones share the same buffers,
/// so a caller can keep one handle and give the other to a VM.
#[derive(Debug, Default, Clone)]
pub struct CapturedIo {
    output: Rc<RefCell<Vec<String>>>,
    input: Rc<RefCell<VecDeque<String>>>,
}

impl CapturedIo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(lines: &[&str]) -> Self {
        let io = Self::new();
        io.input.borrow_mut().extend(lines.iter().map(|l| l.to_string()));
        io
    }

    pub fn lines(&self) -> Vec<String> {
        self.output.borrow().clone()
    }
}

impl IoHandle for CapturedIo {
    fn output(&mut self, text: &str) {
        self.output.borrow_mut().push(text.to_string());
    }

    fn input(&mut self, prompt: &str) -> String {
        if !prompt.is_empty() {
            self.output.borrow_mut().push(prompt.to_string());
        }
        self.input.borrow_mut().pop_front().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{self, Cursor};

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
        }
    }

    struct Unreadable;

    impl io::Read for Unreadable {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "gone"))
        }
    }

    #[test]
    fn test_read_reply_strips_terminator() {
        let mut out = Vec::new();
        let reply = read_reply(&mut out, &mut Cursor::new("yes\r\n"), "ok? ");
        assert_eq!(reply, "yes");
        assert_eq!(out, b"ok? ");
    }

    #[test]
    fn test_read_reply_survives_io_failures() {
        let reply = read_reply(&mut BrokenPipe, &mut Cursor::new("still here\n"), "? ");
        assert_eq!(reply, "still here");
        let mut out = Vec::new();
        let mut broken = io::BufReader::new(Unreadable);
        assert_eq!(read_reply(&mut out, &mut broken, ""), "");
    }

    #[test]
    fn test_captured_io_shares_buffers() {
        let io = CapturedIo::with_input(&["yes"]);
        let mut handle = io.clone();
        handle.output("hello");
        assert_eq!(handle.input("? "), "yes");
        assert_eq!(handle.input(""), "");
        assert_eq!(io.lines(), vec!["hello".to_string(), "? ".to_string()]);
    }
}
