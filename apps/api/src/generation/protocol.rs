//! Wire protocol for streamed artifacts.
//!
//! The response body is `text/plain`. Fragments are written as raw text, in order.
//! The body always ends with exactly one terminal frame introduced by the ASCII record
//! separator (`0x1E`): `\u{1E}OK` or `\u{1E}ERROR:<reason>`. Fragments never contain the
//! separator, so a client that sees the connection close without one knows the text is
//! truncated rather than complete.

use bytes::Bytes;

use crate::generation::error::GenerationError;

pub const RECORD_SEPARATOR: char = '\u{1E}';
const SEPARATOR_BYTE: u8 = 0x1E;
const OK_MARKER: &[u8] = b"OK";
const ERROR_MARKER: &[u8] = b"ERROR:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Fragment(String),
    Completed,
    Failed(GenerationError),
}

impl Frame {
    pub fn encode(&self) -> Bytes {
        match self {
            Frame::Fragment(text) => Bytes::from(strip_separator(text)),
            Frame::Completed => Bytes::from(format!("{RECORD_SEPARATOR}OK")),
            Frame::Failed(err) => Bytes::from(format!(
                "{RECORD_SEPARATOR}ERROR:{}: {}",
                err.code(),
                strip_separator(&err.to_string())
            )),
        }
    }

    #[allow(dead_code)]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Frame::Fragment(_))
    }
}

fn strip_separator(text: &str) -> String {
    text.chars().filter(|c| *c != RECORD_SEPARATOR).collect()
}

/// Result of reading a framed body to the end.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assembled {
    Complete(String),
    Failed { partial: String, reason: String },
    /// The connection closed before a terminal frame arrived.
    Truncated { partial: String },
}

/// Reassembles a framed body from arbitrary byte chunks.
///
/// Chunks may split multi-byte characters; incomplete sequences are held until the
/// rest arrives. This is the reader side of the protocol; the server only writes.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct StreamAssembler {
    pending: Vec<u8>,
    text: String,
    terminal: Option<Vec<u8>>,
}

#[allow(dead_code)]
impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns the newly decoded fragment text.
    pub fn push(&mut self, chunk: &[u8]) -> String {
        if let Some(terminal) = self.terminal.as_mut() {
            terminal.extend_from_slice(chunk);
            return String::new();
        }

        let body = match chunk.iter().position(|b| *b == SEPARATOR_BYTE) {
            Some(idx) => {
                self.terminal = Some(chunk[idx + 1..].to_vec());
                &chunk[..idx]
            }
            None => chunk,
        };
        self.pending.extend_from_slice(body);

        let decoded = self.drain_valid();
        self.text.push_str(&decoded);
        decoded
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(mut self) -> Assembled {
        if !self.pending.is_empty() {
            let rest = String::from_utf8_lossy(&self.pending).into_owned();
            self.text.push_str(&rest);
        }
        let partial = self.text;

        match self.terminal {
            Some(t) if t == OK_MARKER => Assembled::Complete(partial),
            Some(t) if t.starts_with(ERROR_MARKER) => Assembled::Failed {
                partial,
                reason: String::from_utf8_lossy(&t[ERROR_MARKER.len()..]).into_owned(),
            },
            _ => Assembled::Truncated { partial },
        }
    }

    fn drain_valid(&mut self) -> String {
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(s) => {
                    out.push_str(s);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        Some(bad) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + bad);
                        }
                        None => {
                            // incomplete sequence at the end; wait for more bytes
                            self.pending.drain(..valid);
                            return out;
                        }
                    }
                }
            }
        }
    }
}
