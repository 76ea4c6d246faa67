//! Zero-copy parsing of a single JSON object.
//!
//! `parse_object` consumes the bytes of one well-formed top-level object and
//! yields a `ParsedObject` whose keys and scalar values are slices into the
//! input buffer. No string unescaping and no number conversion happens here;
//! numbers stay as raw literals until the evaluator needs them.
//!
//! The tokenizer underneath is context-free, so the parser pairs `Quote`
//! tokens itself before treating colons, commas, or braces as structure.
//! Escaped quotes inside strings are not tracked; input is assumed to be
//! clean machine-generated data, and a record that violates that assumption
//! fails to parse and is skipped upstream.

use crate::scan::{self, Token, TokenKind};

/// Per-object token budget. A record with more structural bytes than this
/// fails to parse and is skipped like any other malformed record.
pub const TOKEN_CAP: usize = 512;

/// Maximum container nesting inside one record.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid JSON")]
    InvalidJson,
    #[error("expected opening quote")]
    ExpectedQuote,
    #[error("malformed object key")]
    MalformedKey,
    #[error("expected ':' after key")]
    ExpectedColon,
    #[error("unexpected end of input")]
    UnexpectedEnd,
    #[error("malformed string value")]
    MalformedString,
    #[error("unexpected token")]
    UnexpectedToken,
}

/// A parsed JSON value. Scalar variants borrow the input buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonValue<'a> {
    Null,
    Bool(bool),
    /// Unparsed numeric literal, exactly as it appears in the input.
    Number(&'a [u8]),
    /// String body between the two quote bytes, escapes not decoded.
    String(&'a [u8]),
    Array(Vec<JsonValue<'a>>),
    Object(ParsedObject<'a>),
}

impl<'a> JsonValue<'a> {
    /// Query-language type name for this value.
    pub fn type_name(&self) -> &'static str {
        match self {
            JsonValue::Null => "null",
            JsonValue::Bool(_) => "bool",
            JsonValue::Number(_) => "number",
            JsonValue::String(_) => "string",
            JsonValue::Array(_) => "array",
            JsonValue::Object(_) => "object",
        }
    }

    /// Numeric value of a `Number` literal. Integer literals go through an
    /// explicit base-10 walk; everything else falls back to a float parse.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            JsonValue::Number(s) => number_to_f64(s),
            _ => None,
        }
    }
}

/// An ordered sequence of `(key, value)` pairs borrowing the input buffer.
///
/// Field lookup is linear: real records carry few enough fields that a hash
/// map does not pay for its constant factor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedObject<'a> {
    fields: Vec<(&'a [u8], JsonValue<'a>)>,
}

impl<'a> ParsedObject<'a> {
    /// First field with the given key, or `None`.
    pub fn get(&self, key: &[u8]) -> Option<&JsonValue<'a>> {
        self.fields
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v)
    }

    /// Fields in input order.
    pub fn fields(&self) -> &[(&'a [u8], JsonValue<'a>)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Parse one top-level JSON object starting at its `{`.
///
/// On success every key slice and scalar value slice is a sub-slice of
/// `data`; on error nothing is returned.
pub fn parse_object(data: &[u8]) -> Result<ParsedObject<'_>, ParseError> {
    parse_object_at_depth(data, 0)
}

fn parse_object_at_depth(data: &[u8], depth: usize) -> Result<ParsedObject<'_>, ParseError> {
    if depth >= MAX_DEPTH {
        return Err(ParseError::InvalidJson);
    }

    let mut tokens = [Token {
        kind: TokenKind::Comma,
        offset: 0,
    }; TOKEN_CAP];
    let n = scan::scan_structural(data, &mut tokens);
    if n == TOKEN_CAP {
        // Possibly truncated; the record cannot be trusted.
        return Err(ParseError::InvalidJson);
    }
    let toks = &tokens[..n];

    if toks.first().map(|t| t.kind) != Some(TokenKind::OpenBrace) {
        return Err(ParseError::InvalidJson);
    }

    let mut fields = Vec::new();
    let mut i = 1;

    // Empty object
    if toks.get(i).map(|t| t.kind) == Some(TokenKind::CloseBrace) {
        return Ok(ParsedObject { fields });
    }

    loop {
        // Key: Quote … Quote. The closing quote is the next Quote token;
        // structural bytes inside the key produce tokens we skip over.
        let open = toks.get(i).ok_or(ParseError::UnexpectedEnd)?;
        if open.kind != TokenKind::Quote {
            return Err(ParseError::ExpectedQuote);
        }
        let close_idx = next_quote(toks, i + 1).ok_or(ParseError::MalformedKey)?;
        let key = &data[open.offset + 1..toks[close_idx].offset];
        i = close_idx + 1;

        // Colon
        let colon = toks.get(i).ok_or(ParseError::UnexpectedEnd)?;
        if colon.kind != TokenKind::Colon {
            return Err(ParseError::ExpectedColon);
        }
        let colon_off = colon.offset;
        i += 1;

        // Value: decided by the next structural token
        let vt = toks.get(i).ok_or(ParseError::UnexpectedEnd)?;
        let value = match vt.kind {
            TokenKind::Quote => {
                let end_idx = next_quote(toks, i + 1).ok_or(ParseError::MalformedString)?;
                let s = &data[vt.offset + 1..toks[end_idx].offset];
                i = end_idx + 1;
                JsonValue::String(s)
            }
            TokenKind::OpenBrace => {
                let j = find_matching(toks, i, TokenKind::OpenBrace, TokenKind::CloseBrace)?;
                let sub = &data[vt.offset..=toks[j].offset];
                let obj = parse_object_at_depth(sub, depth + 1)?;
                i = j + 1;
                JsonValue::Object(obj)
            }
            TokenKind::OpenBracket => {
                let j = find_matching(toks, i, TokenKind::OpenBracket, TokenKind::CloseBracket)?;
                let inner = &data[vt.offset + 1..toks[j].offset];
                let arr = parse_array_elements(inner, depth + 1)?;
                i = j + 1;
                JsonValue::Array(arr)
            }
            // No structural token started the value: the bytes between the
            // colon and this separator hold a bare literal.
            TokenKind::Comma | TokenKind::CloseBrace => {
                let raw = trim(&data[colon_off + 1..vt.offset]);
                if raw.is_empty() {
                    return Err(ParseError::InvalidJson);
                }
                classify_literal(raw)
            }
            TokenKind::CloseBracket | TokenKind::Colon => {
                return Err(ParseError::UnexpectedToken);
            }
        };

        fields.push((key, value));

        // Separator: comma continues, close brace ends
        let sep = toks.get(i).ok_or(ParseError::UnexpectedEnd)?;
        match sep.kind {
            TokenKind::Comma => i += 1,
            TokenKind::CloseBrace => break,
            _ => return Err(ParseError::UnexpectedToken),
        }
    }

    Ok(ParsedObject { fields })
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Index of the next `Quote` token at or after `from`.
fn next_quote(toks: &[Token], from: usize) -> Option<usize> {
    toks.iter()
        .skip(from)
        .position(|t| t.kind == TokenKind::Quote)
        .map(|p| from + p)
}

/// Index of the token closing the container opened at `start`, counting
/// depth while skipping everything between paired quotes.
fn find_matching(
    toks: &[Token],
    start: usize,
    open: TokenKind,
    close: TokenKind,
) -> Result<usize, ParseError> {
    let mut depth = 0usize;
    let mut in_string = false;
    for (i, t) in toks.iter().enumerate().skip(start) {
        if t.kind == TokenKind::Quote {
            in_string = !in_string;
        } else if !in_string {
            if t.kind == open {
                depth += 1;
            } else if t.kind == close {
                depth -= 1;
                if depth == 0 {
                    return Ok(i);
                }
            }
        }
    }
    Err(ParseError::UnexpectedEnd)
}

/// Parse the comma-separated elements of an array body (the bytes strictly
/// between `[` and `]`).
fn parse_array_elements(inner: &[u8], depth: usize) -> Result<Vec<JsonValue<'_>>, ParseError> {
    if depth >= MAX_DEPTH {
        return Err(ParseError::InvalidJson);
    }
    let mut elems = Vec::new();
    if trim(inner).is_empty() {
        return Ok(elems);
    }

    let mut start = 0usize;
    let mut brace_depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in inner.iter().enumerate() {
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
            b'{' | b'[' => brace_depth += 1,
            b'}' | b']' => {
                if brace_depth == 0 {
                    return Err(ParseError::UnexpectedToken);
                }
                brace_depth -= 1;
            }
            b',' if brace_depth == 0 => {
                elems.push(parse_element(&inner[start..i], depth)?);
                start = i + 1;
            }
            _ => {}
        }
    }
    elems.push(parse_element(&inner[start..], depth)?);
    Ok(elems)
}

/// Parse one array element: an object, a nested array, a quoted string, or
/// a bare literal.
fn parse_element(elem: &[u8], depth: usize) -> Result<JsonValue<'_>, ParseError> {
    let t = trim(elem);
    if t.is_empty() {
        return Err(ParseError::InvalidJson);
    }
    match t[0] {
        b'{' => Ok(JsonValue::Object(parse_object_at_depth(t, depth)?)),
        b'[' => {
            if t[t.len() - 1] != b']' {
                return Err(ParseError::InvalidJson);
            }
            Ok(JsonValue::Array(parse_array_elements(
                &t[1..t.len() - 1],
                depth + 1,
            )?))
        }
        b'"' => {
            if t.len() < 2 || t[t.len() - 1] != b'"' {
                return Err(ParseError::MalformedString);
            }
            Ok(JsonValue::String(&t[1..t.len() - 1]))
        }
        _ => Ok(classify_literal(t)),
    }
}

/// Textual classification of a bare literal: `null`, `true`, `false`, and
/// everything else is a number slice.
fn classify_literal(raw: &[u8]) -> JsonValue<'_> {
    match raw {
        b"null" => JsonValue::Null,
        b"true" => JsonValue::Bool(true),
        b"false" => JsonValue::Bool(false),
        _ => JsonValue::Number(raw),
    }
}

fn trim(s: &[u8]) -> &[u8] {
    let start = s
        .iter()
        .position(|&b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .unwrap_or(s.len());
    let end = s
        .iter()
        .rposition(|&b| !matches!(b, b' ' | b'\t' | b'\r' | b'\n'))
        .map_or(start, |p| p + 1);
    &s[start..end]
}

/// Convert a raw number literal to f64. Integer literals use an explicit
/// base-10 walk; anything with a fraction or exponent falls back to the
/// standard float parse.
pub fn number_to_f64(s: &[u8]) -> Option<f64> {
    if let Some(i) = parse_i64(s) {
        return Some(i as f64);
    }
    std::str::from_utf8(s).ok()?.parse::<f64>().ok()
}

fn parse_i64(s: &[u8]) -> Option<i64> {
    let (neg, digits) = match s.split_first()? {
        (b'-', rest) => (true, rest),
        _ => (false, s),
    };
    if digits.is_empty() {
        return None;
    }
    let mut acc: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return None;
        }
        acc = acc
            .checked_mul(10)?
            .checked_add((b - b'0') as i64)?;
    }
    Some(if neg { -acc } else { acc })
}
