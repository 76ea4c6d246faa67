//! Record serialization.
//!
//! Writes matched records into a worker's byte buffer. Strings go out
//! without re-escaping and numbers verbatim from the source slice, matching
//! the parser's no-unescape policy; only CSV applies its own quoting.

use crate::parse::{JsonValue, ParsedObject};
use crate::query::eval::resolve_path;
use crate::query::FieldPath;

/// Output format selected with `--output`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One serialized object per line (default).
    Ndjson,
    /// A single top-level array; framing and separators are added when the
    /// per-worker buffers merge.
    Json,
    /// Header plus one row per record.
    Csv,
}

/// A `--select` entry: the path as the user wrote it plus its split form.
#[derive(Debug, Clone)]
pub struct ProjField {
    pub name: String,
    pub path: FieldPath,
}

impl ProjField {
    pub fn new(name: &str) -> ProjField {
        ProjField {
            name: name.to_string(),
            path: FieldPath::new(name.as_bytes()),
        }
    }
}

/// Configuration for record serialization.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    pub format: OutputFormat,
    /// Pretty layout for the `json` format (one record per line).
    pub pretty: bool,
    /// Fields to emit, in order; `None` emits all fields in input order.
    pub projection: Option<Vec<ProjField>>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: OutputFormat::Ndjson,
            pretty: false,
            projection: None,
        }
    }
}

/// Serialize one matched record into `out`. For `json` the record body is
/// written bare; the merger inserts commas and brackets.
pub fn write_record(out: &mut Vec<u8>, obj: &ParsedObject<'_>, config: &OutputConfig) {
    match config.format {
        OutputFormat::Ndjson => {
            write_object(out, obj, config.projection.as_deref());
            out.push(b'\n');
        }
        OutputFormat::Json => {
            write_object(out, obj, config.projection.as_deref());
        }
        OutputFormat::Csv => {
            write_csv_row(out, obj, config.projection.as_deref());
            out.push(b'\n');
        }
    }
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

fn write_object(out: &mut Vec<u8>, obj: &ParsedObject<'_>, proj: Option<&[ProjField]>) {
    out.push(b'{');
    match proj {
        None => {
            for (i, (key, value)) in obj.fields().iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_key(out, key);
                write_value(out, value);
            }
        }
        Some(fields) => {
            // Fields the record lacks are omitted
            let mut first = true;
            for pf in fields {
                if let Some(value) = resolve_path(obj, &pf.path) {
                    if !first {
                        out.push(b',');
                    }
                    first = false;
                    write_key(out, pf.name.as_bytes());
                    write_value(out, value);
                }
            }
        }
    }
    out.push(b'}');
}

fn write_key(out: &mut Vec<u8>, key: &[u8]) {
    out.push(b'"');
    out.extend_from_slice(key);
    out.extend_from_slice(b"\":");
}

fn write_value(out: &mut Vec<u8>, value: &JsonValue<'_>) {
    match value {
        JsonValue::Null => out.extend_from_slice(b"null"),
        JsonValue::Bool(true) => out.extend_from_slice(b"true"),
        JsonValue::Bool(false) => out.extend_from_slice(b"false"),
        JsonValue::Number(s) => out.extend_from_slice(s),
        JsonValue::String(s) => {
            out.push(b'"');
            out.extend_from_slice(s);
            out.push(b'"');
        }
        JsonValue::Array(elems) => {
            out.push(b'[');
            for (i, e) in elems.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(out, e);
            }
            out.push(b']');
        }
        JsonValue::Object(obj) => write_object(out, obj, None),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

/// Header row from the projection names.
pub fn write_csv_header(out: &mut Vec<u8>, fields: &[ProjField]) {
    for (i, pf) in fields.iter().enumerate() {
        if i > 0 {
            out.push(b',');
        }
        write_csv_text(out, pf.name.as_bytes());
    }
    out.push(b'\n');
}

fn write_csv_row(out: &mut Vec<u8>, obj: &ParsedObject<'_>, proj: Option<&[ProjField]>) {
    match proj {
        Some(fields) => {
            for (i, pf) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                if let Some(value) = resolve_path(obj, &pf.path) {
                    write_csv_value(out, value);
                }
            }
        }
        // No projection established: fall back to the record's own order
        None => {
            for (i, (_, value)) in obj.fields().iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_csv_value(out, value);
            }
        }
    }
}

fn write_csv_value(out: &mut Vec<u8>, value: &JsonValue<'_>) {
    match value {
        // Null renders as the empty field
        JsonValue::Null => {}
        JsonValue::Bool(true) => out.extend_from_slice(b"true"),
        JsonValue::Bool(false) => out.extend_from_slice(b"false"),
        JsonValue::Number(s) => out.extend_from_slice(s),
        JsonValue::String(s) => write_csv_text(out, s),
        JsonValue::Array(_) => out.extend_from_slice(b"[]"),
        JsonValue::Object(_) => out.extend_from_slice(b"{}"),
    }
}

/// Quote a text field when it contains a comma, quote, or newline; embedded
/// quotes double.
fn write_csv_text(out: &mut Vec<u8>, s: &[u8]) {
    let needs_quoting = s.iter().any(|&b| matches!(b, b',' | b'"' | b'\n'));
    if !needs_quoting {
        out.extend_from_slice(s);
        return;
    }
    out.push(b'"');
    for &b in s {
        if b == b'"' {
            out.push(b'"');
        }
        out.push(b);
    }
    out.push(b'"');
}
