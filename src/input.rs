//! Input acquisition: memory-mapped files or stdin, format detection, and
//! JSON-array → NDJSON normalization.
//!
//! Every zero-copy slice downstream borrows from the buffer held here, so
//! the `Input` must outlive all parsed records derived from it.

use anyhow::{Context, Result};
use memmap2::Mmap;
use std::fs::File;
use std::io::Read;

/// Backing store for the input bytes.
enum Buffer {
    /// Read-only mapping of the input file.
    Mapped(Mmap),
    /// Owned bytes: stdin, or the NDJSON conversion of a JSON array.
    Owned(Vec<u8>),
}

impl Buffer {
    fn bytes(&self) -> &[u8] {
        match self {
            Buffer::Mapped(m) => m.as_ref(),
            Buffer::Owned(v) => v.as_slice(),
        }
    }
}

/// Input format, decided by the first non-whitespace byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ndjson,
    JsonArray,
    Empty,
}

/// The input bytes plus their backing store. `data()` skips a UTF-8 BOM if
/// one is present.
pub struct Input {
    buf: Buffer,
    start: usize,
}

impl Input {
    /// Open `path` read-only via mmap, or read stdin fully when `path` is
    /// `-`.
    pub fn load(path: &str) -> Result<Input> {
        if path == "-" {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("failed to read stdin")?;
            return Ok(Input::new(Buffer::Owned(buf)));
        }
        let file = File::open(path).with_context(|| format!("failed to open file: {path}"))?;
        // SAFETY: the mapping is read-only and the tool treats concurrent
        // modification of the input file as external misuse.
        let mmap =
            unsafe { Mmap::map(&file) }.with_context(|| format!("failed to mmap file: {path}"))?;
        Ok(Input::new(Buffer::Mapped(mmap)))
    }

    /// Build an input over owned bytes, bypassing the filesystem.
    #[cfg(test)]
    pub(crate) fn owned_for_tests(bytes: Vec<u8>) -> Input {
        Input::new(Buffer::Owned(bytes))
    }

    fn new(buf: Buffer) -> Input {
        let start = if buf.bytes().starts_with(&[0xEF, 0xBB, 0xBF]) {
            3
        } else {
            0
        };
        Input { buf, start }
    }

    /// The input bytes, BOM excluded.
    pub fn data(&self) -> &[u8] {
        &self.buf.bytes()[self.start..]
    }

    /// Detected format of this input.
    pub fn format(&self) -> Format {
        detect_format(self.data())
    }

    /// Normalize to NDJSON. A JSON array is rewritten object-per-line into
    /// an owned buffer and the original mapping is released; NDJSON input is
    /// returned untouched.
    pub fn into_ndjson(self) -> Input {
        match self.format() {
            Format::JsonArray => {
                let converted = array_to_ndjson(self.data());
                // self (and any mmap inside) drops here
                Input::new(Buffer::Owned(converted))
            }
            Format::Ndjson | Format::Empty => self,
        }
    }
}

/// Inspect the first non-whitespace byte: `[` means a JSON array, anything
/// else is treated as NDJSON. All-whitespace input is empty.
pub fn detect_format(data: &[u8]) -> Format {
    match data
        .iter()
        .find(|b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
    {
        None => Format::Empty,
        Some(b'[') => Format::JsonArray,
        Some(_) => Format::Ndjson,
    }
}

/// Extract every top-level `{…}` object of a JSON array into an owned
/// buffer, one per line. Quote-, escape-, and depth-aware; bytes between
/// objects (brackets, commas, whitespace) are dropped. A trailing
/// unterminated object is dropped like any other malformed record.
fn array_to_ndjson(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 64);
    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    let mut obj_start = 0usize;

    for (i, &b) in data.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => {
                if depth == 0 {
                    obj_start = i;
                }
                depth += 1;
            }
            b'}' => {
                if depth > 0 {
                    depth -= 1;
                    if depth == 0 {
                        out.extend_from_slice(&data[obj_start..=i]);
                        out.push(b'\n');
                    }
                }
            }
            _ => {}
        }
    }
    out
}
