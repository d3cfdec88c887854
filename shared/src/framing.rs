//! Line framing over a raw byte stream.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;

/// End-of-line marker, fixed once per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LineTerminator {
    #[default]
    Lf,
    CrLf,
}

impl LineTerminator {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            LineTerminator::Lf => b"\n",
            LineTerminator::CrLf => b"\r\n",
        }
    }

    /// Appends the terminator to `line`, ready for the socket.
    pub fn frame(self, line: &str) -> Vec<u8> {
        let sep = self.as_bytes();
        let mut out = Vec::with_capacity(line.len() + sep.len());
        out.extend_from_slice(line.as_bytes());
        out.extend_from_slice(sep);
        out
    }
}

impl fmt::Display for LineTerminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LineTerminator::Lf => write!(f, "LF"),
            LineTerminator::CrLf => write!(f, "CRLF"),
        }
    }
}

/// Accumulates inbound bytes and cuts them into terminator-delimited lines.
///
/// The buffer has a hard capacity. A peer that fills it without ever
/// sending a terminator is a framing error; callers check [`is_full`]
/// after draining lines and tear the connection down.
///
/// Scanning looks for the terminator's final byte and then checks the
/// bytes before it. In CRLF mode a bare LF is therefore ordinary line
/// content.
///
/// [`is_full`]: LineDecoder::is_full
#[derive(Debug)]
pub struct LineDecoder {
    terminator: LineTerminator,
    buf: Vec<u8>,
    capacity: usize,
    /// Bytes before this offset hold no terminator candidate.
    scan_from: usize,
}

impl LineDecoder {
    pub fn new(terminator: LineTerminator, capacity: usize) -> Self {
        Self {
            terminator,
            buf: Vec::with_capacity(capacity),
            capacity,
            scan_from: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free space left before the buffer overflows.
    pub fn remaining(&self) -> usize {
        self.capacity - self.buf.len()
    }

    pub fn is_full(&self) -> bool {
        self.buf.len() >= self.capacity
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Appends freshly read bytes.
    pub fn push(&mut self, bytes: &[u8]) -> ProtocolResult<()> {
        if bytes.len() > self.remaining() {
            return Err(ProtocolError::FramingOverflow {
                capacity: self.capacity,
            });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Pops the next complete line, terminator stripped.
    ///
    /// Leftover bytes stay buffered for the next read.
    pub fn next_line(&mut self) -> Option<String> {
        let sep = self.terminator.as_bytes();
        let last = sep[sep.len() - 1];

        let mut from = self.scan_from;
        while let Some(offset) = self.buf[from..].iter().position(|&b| b == last) {
            let end = from + offset;
            let start = (end + 1).checked_sub(sep.len());
            if let Some(start) = start {
                if &self.buf[start..=end] == sep {
                    let line: Vec<u8> = self.buf.drain(..=end).collect();
                    self.scan_from = 0;
                    return Some(String::from_utf8_lossy(&line[..start]).into_owned());
                }
            }
            from = end + 1;
        }

        self.scan_from = self.buf.len();
        None
    }
}
