//! Zero-allocation parsing of chunk lines.
//!
//! A chunk line is `row\tcol\tcount`, optionally prefixed by the chromosome:
//! `chrom\trow\tcol\tcount`. Bins are local to the region window.

use memchr::memchr;

/// Fast u64 parsing - no allocation, no error formatting.
///
/// Returns None if the input is empty, contains non-digit characters, or
/// overflows.
#[inline(always)]
pub fn parse_u64_fast(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(d as u64)?;
    }
    Some(n)
}

/// Fields of one chunk line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLine<'a> {
    pub chrom: Option<&'a [u8]>,
    pub row: u64,
    pub col: u64,
    pub count: u64,
}

/// Parse a chunk line using memchr.
///
/// Accepts three or four tab-separated fields; a trailing `\r` or `\n` is
/// ignored. Returns None for any other shape.
#[inline]
pub fn parse_chunk_line(line: &[u8]) -> Option<ChunkLine<'_>> {
    let line = trim_eol(line);
    let mut fields = [&line[..0]; 4];
    let mut n = 0;
    let mut rest = line;
    loop {
        if n == fields.len() {
            return None;
        }
        match memchr(b'\t', rest) {
            Some(tab) => {
                fields[n] = &rest[..tab];
                rest = &rest[tab + 1..];
                n += 1;
            }
            None => {
                fields[n] = rest;
                n += 1;
                break;
            }
        }
    }

    let (chrom, numeric) = match n {
        3 => (None, &fields[..3]),
        4 => (Some(fields[0]), &fields[1..4]),
        _ => return None,
    };
    if chrom.is_some_and(|c| c.is_empty()) {
        return None;
    }

    Some(ChunkLine {
        chrom,
        row: parse_u64_fast(numeric[0])?,
        col: parse_u64_fast(numeric[1])?,
        count: parse_u64_fast(numeric[2])?,
    })
}

/// Check if a line should be skipped (blank or comment).
#[inline(always)]
pub fn should_skip_line(line: &[u8]) -> bool {
    let line = trim_eol(line);
    line.is_empty() || line[0] == b'#'
}

#[inline(always)]
fn trim_eol(mut line: &[u8]) -> &[u8] {
    while let [rest @ .., b'\n' | b'\r'] = line {
        line = rest;
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u64_fast() {
        assert_eq!(parse_u64_fast(b"12345"), Some(12345));
        assert_eq!(parse_u64_fast(b"0"), Some(0));
        assert_eq!(parse_u64_fast(b""), None);
        assert_eq!(parse_u64_fast(b"-1"), None);
        assert_eq!(parse_u64_fast(b"123abc"), None);
        assert_eq!(parse_u64_fast(b"18446744073709551615"), Some(u64::MAX));
        assert_eq!(parse_u64_fast(b"18446744073709551616"), None);
    }

    #[test]
    fn test_parse_three_fields() {
        let line = parse_chunk_line(b"0\t2\t10\n").unwrap();
        assert_eq!(line.chrom, None);
        assert_eq!((line.row, line.col, line.count), (0, 2, 10));
    }

    #[test]
    fn test_parse_four_fields() {
        let line = parse_chunk_line(b"chr1\t3\t1\t7\r\n").unwrap();
        assert_eq!(line.chrom, Some(&b"chr1"[..]));
        assert_eq!((line.row, line.col, line.count), (3, 1, 7));
    }

    #[test]
    fn test_parse_rejects_bad_shapes() {
        assert_eq!(parse_chunk_line(b"0\t2"), None);
        assert_eq!(parse_chunk_line(b"chr1\t0\t2\t3\t4"), None);
        assert_eq!(parse_chunk_line(b"0\tx\t2"), None);
        assert_eq!(parse_chunk_line(b"\t0\t2\t3"), None);
        assert_eq!(parse_chunk_line(b""), None);
    }

    #[test]
    fn test_should_skip_line() {
        assert!(should_skip_line(b""));
        assert!(should_skip_line(b"\n"));
        assert!(should_skip_line(b"# chunk header"));
        assert!(!should_skip_line(b"0\t1\t2"));
    }
}
