//! Vectorized location of JSON structural bytes.
//!
//! Finds the seven structural characters (`{ } [ ] " : ,`) in a byte range
//! and writes them into a caller-provided token buffer. The scanner is
//! context-free: it does not know whether a byte sits inside a string
//! literal. The object parser compensates by pairing `Quote` tokens before
//! treating colons and commas as structure.

use memchr::memchr;

/// Kind of a structural byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Quote,
    Colon,
    Comma,
}

/// A structural byte and its position in the scanned slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub offset: usize,
}

/// Classify a byte as structural, or `None` for everything else.
#[inline]
pub fn classify(b: u8) -> Option<TokenKind> {
    match b {
        b'{' => Some(TokenKind::OpenBrace),
        b'}' => Some(TokenKind::CloseBrace),
        b'[' => Some(TokenKind::OpenBracket),
        b']' => Some(TokenKind::CloseBracket),
        b'"' => Some(TokenKind::Quote),
        b':' => Some(TokenKind::Colon),
        b',' => Some(TokenKind::Comma),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// SWAR block scan
// ---------------------------------------------------------------------------

/// Bytes per vector block. Structural-free blocks are skipped whole.
const BLOCK: usize = 64;

const LO: u64 = 0x0101_0101_0101_0101;
const HI: u64 = 0x8080_8080_8080_8080;

#[inline]
fn splat(b: u8) -> u64 {
    u64::from_ne_bytes([b; 8])
}

/// Per-byte equality mask: high bit set in every lane of `word` equal to the
/// splatted pattern byte.
#[inline]
fn eq_mask(word: u64, pat: u64) -> u64 {
    let x = word ^ pat;
    x.wrapping_sub(LO) & !x & HI
}

/// OR-reduced "any structural byte in this word" predicate.
#[inline]
fn structural_mask(word: u64) -> u64 {
    eq_mask(word, splat(b'{'))
        | eq_mask(word, splat(b'}'))
        | eq_mask(word, splat(b'['))
        | eq_mask(word, splat(b']'))
        | eq_mask(word, splat(b'"'))
        | eq_mask(word, splat(b':'))
        | eq_mask(word, splat(b','))
}

/// Scan `data` for structural bytes, writing tokens into `out` in ascending
/// offset order. Returns the number of tokens written, at most `out.len()`;
/// further structure is silently truncated and callers treat a full buffer
/// as exhaustion.
pub fn scan_structural(data: &[u8], out: &mut [Token]) -> usize {
    let mut n = 0;
    let mut pos = 0;

    while pos + BLOCK <= data.len() {
        let block = &data[pos..pos + BLOCK];

        let mut any = 0u64;
        for lane in block.chunks_exact(8) {
            let word = u64::from_ne_bytes(lane.try_into().unwrap());
            any |= structural_mask(word);
        }

        if any != 0 {
            for (i, &b) in block.iter().enumerate() {
                if let Some(kind) = classify(b) {
                    if n == out.len() {
                        return n;
                    }
                    out[n] = Token {
                        kind,
                        offset: pos + i,
                    };
                    n += 1;
                }
            }
        }
        pos += BLOCK;
    }

    // Scalar tail
    for (i, &b) in data[pos..].iter().enumerate() {
        if let Some(kind) = classify(b) {
            if n == out.len() {
                return n;
            }
            out[n] = Token {
                kind,
                offset: pos + i,
            };
            n += 1;
        }
    }

    n
}

/// Find the next record-separator newline at or after `start`.
/// Shared by chunk splitting and record iteration.
#[inline]
pub fn find_next_newline(buf: &[u8], start: usize) -> Option<usize> {
    if start >= buf.len() {
        return None;
    }
    memchr(b'\n', &buf[start..]).map(|p| start + p)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scan_all(data: &[u8]) -> Vec<Token> {
        let mut buf = [Token {
            kind: TokenKind::Comma,
            offset: 0,
        }; 256];
        let n = scan_structural(data, &mut buf);
        buf[..n].to_vec()
    }

    #[test]
    fn classify_all_structural() {
        assert_eq!(classify(b'{'), Some(TokenKind::OpenBrace));
        assert_eq!(classify(b'}'), Some(TokenKind::CloseBrace));
        assert_eq!(classify(b'['), Some(TokenKind::OpenBracket));
        assert_eq!(classify(b']'), Some(TokenKind::CloseBracket));
        assert_eq!(classify(b'"'), Some(TokenKind::Quote));
        assert_eq!(classify(b':'), Some(TokenKind::Colon));
        assert_eq!(classify(b','), Some(TokenKind::Comma));
        assert_eq!(classify(b'a'), None);
        assert_eq!(classify(b' '), None);
        assert_eq!(classify(b'\n'), None);
    }

    #[test]
    fn simple_object() {
        let tokens = scan_all(br#"{"a":1}"#);
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::OpenBrace,
                TokenKind::Quote,
                TokenKind::Quote,
                TokenKind::Colon,
                TokenKind::CloseBrace,
            ]
        );
        assert_eq!(tokens[0].offset, 0);
        assert_eq!(tokens[4].offset, 6);
    }

    #[test]
    fn offsets_ascending() {
        let data = br#"{"name":"alice","tags":["a","b"],"n":3}"#;
        let tokens = scan_all(data);
        for pair in tokens.windows(2) {
            assert!(pair[0].offset < pair[1].offset);
        }
        // Every reported offset really holds the classified byte
        for t in &tokens {
            assert_eq!(classify(data[t.offset]), Some(t.kind));
        }
    }

    #[test]
    fn no_structural_bytes() {
        assert!(scan_all(b"plain text with no structure at all").is_empty());
        assert!(scan_all(b"").is_empty());
    }

    #[test]
    fn block_skip_long_run() {
        // >64 structural-free bytes in the middle exercise the block-skip path
        let mut data = Vec::new();
        data.extend_from_slice(br#"{"k":""#);
        data.extend_from_slice(&[b'x'; 200]);
        data.extend_from_slice(br#""}"#);
        let tokens = scan_all(&data);
        let kinds: Vec<TokenKind> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::OpenBrace,
                TokenKind::Quote,
                TokenKind::Quote,
                TokenKind::Colon,
                TokenKind::Quote,
                TokenKind::Quote,
                TokenKind::CloseBrace,
            ]
        );
    }

    #[test]
    fn truncates_at_capacity() {
        let data = b",,,,,,,,,,";
        let mut buf = [Token {
            kind: TokenKind::Comma,
            offset: 0,
        }; 4];
        let n = scan_structural(data, &mut buf);
        assert_eq!(n, 4);
        assert_eq!(buf[3].offset, 3);
    }

    #[test]
    fn structural_at_block_boundary() {
        // Byte 63 and byte 64 straddle the first block edge
        let mut data = vec![b' '; 128];
        data[63] = b'{';
        data[64] = b'}';
        data[127] = b':';
        let tokens = scan_all(&data);
        let offsets: Vec<usize> = tokens.iter().map(|t| t.offset).collect();
        assert_eq!(offsets, vec![63, 64, 127]);
    }

    #[test]
    fn find_newline_basic() {
        let buf = b"abc\ndef\n";
        assert_eq!(find_next_newline(buf, 0), Some(3));
        assert_eq!(find_next_newline(buf, 3), Some(3));
        assert_eq!(find_next_newline(buf, 4), Some(7));
        assert_eq!(find_next_newline(buf, 8), None);
    }

    #[test]
    fn find_newline_absent() {
        assert_eq!(find_next_newline(b"no newline here", 0), None);
        assert_eq!(find_next_newline(b"", 0), None);
    }
}
