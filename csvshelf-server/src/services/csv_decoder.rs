//! CSV decoding
//!
//! Comma-delimited, RFC 4180 quoting (`"` quotes, `""` escapes a quote).
//! No header handling and no schema: every row is an ordered list of string
//! fields and rows may differ in length. Blank lines are skipped, so a
//! trailing newline never produces an extra row.
//!
//! The `csv` crate accepts an unterminated quote by running the field to end
//! of input, so quoting is checked in a separate pass first.

use std::io;
use std::path::Path;
use thiserror::Error;

use crate::models::Row;

/// Decoding errors
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to read CSV file: {0}")]
    Read(#[from] io::Error),

    #[error("Unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: u64 },

    #[error("Invalid UTF-8 on line {line}")]
    InvalidEncoding { line: u64 },

    #[error("Malformed CSV: {0}")]
    Malformed(String),

    #[error("CSV file contains no rows")]
    Empty,
}

/// Parsed CSV content
///
/// `rows()` can be called any number of times; each call iterates from the
/// first row.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedCsv {
    rows: Vec<Row>,
}

impl ParsedCsv {
    pub fn rows(&self) -> impl Iterator<Item = &Row> + '_ {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row 0 by convention
    pub fn header(&self) -> Option<&Row> {
        self.rows.first()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Read and decode a CSV file
pub async fn decode(path: &Path) -> Result<ParsedCsv, DecodeError> {
    let bytes = tokio::fs::read(path).await?;
    decode_bytes(&bytes)
}

/// Decode CSV content held in memory
pub fn decode_bytes(bytes: &[u8]) -> Result<ParsedCsv, DecodeError> {
    check_quotes(bytes)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(from_csv_error)?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    if rows.is_empty() {
        return Err(DecodeError::Empty);
    }

    Ok(ParsedCsv { rows })
}

fn from_csv_error(err: csv::Error) -> DecodeError {
    match err.kind() {
        csv::ErrorKind::Utf8 { pos, .. } => DecodeError::InvalidEncoding {
            line: pos.as_ref().map(|p| p.line()).unwrap_or(0),
        },
        _ => DecodeError::Malformed(err.to_string()),
    }
}

/// UTF-8 byte order mark, dropped by the `csv` reader before the first field
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reject a quoted field that is never closed
///
/// A quote only opens a quoted field at the start of a field; elsewhere it is
/// a literal character, matching how the `csv` crate reads it.
fn check_quotes(bytes: &[u8]) -> Result<(), DecodeError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut line: u64 = 1;
    let mut open_quote_line: u64 = 0;
    let mut in_quotes = false;
    let mut at_field_start = true;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if in_quotes {
            match b {
                b'"' if bytes.get(i + 1) == Some(&b'"') => i += 1,
                b'"' => in_quotes = false,
                b'\n' => line += 1,
                _ => {}
            }
        } else {
            match b {
                b'"' if at_field_start => {
                    in_quotes = true;
                    open_quote_line = line;
                    at_field_start = false;
                }
                b',' | b'\r' => at_field_start = true,
                b'\n' => {
                    line += 1;
                    at_field_start = true;
                }
                _ => at_field_start = false,
            }
        }
        i += 1;
    }

    if in_quotes {
        return Err(DecodeError::UnterminatedQuote {
            line: open_quote_line,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(rows: &[&[&str]]) -> Vec<Row> {
        rows.iter()
            .map(|r| r.iter().map(|f| f.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_simple_rows() {
        let parsed = decode_bytes(b"name,age\nada,36\ngrace,45\n").unwrap();
        assert_eq!(
            parsed.clone().into_rows(),
            owned(&[&["name", "age"], &["ada", "36"], &["grace", "45"]])
        );
        assert_eq!(parsed.header(), Some(&vec!["name".to_string(), "age".to_string()]));
    }

    #[test]
    fn test_row_and_field_counts_match_lines_and_commas() {
        let content = "a,b,c\n1,2,3\n4,,6\n,,\n";
        let parsed = decode_bytes(content.as_bytes()).unwrap();

        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(parsed.len(), lines.len());
        for (row, line) in parsed.rows().zip(lines) {
            assert_eq!(row.len(), line.matches(',').count() + 1);
        }
    }

    #[test]
    fn test_quoted_fields_with_commas_quotes_and_newlines() {
        let content = b"id,note\n1,\"hello, world\"\n2,\"she said \"\"hi\"\"\"\n3,\"two\nlines\"\n";
        let parsed = decode_bytes(content).unwrap();

        assert_eq!(parsed.len(), 4);
        assert_eq!(parsed.into_rows()[1..].to_vec(), owned(&[
            &["1", "hello, world"],
            &["2", "she said \"hi\""],
            &["3", "two\nlines"],
        ]));
    }

    #[test]
    fn test_crlf_line_endings() {
        let parsed = decode_bytes(b"a,b\r\n1,2\r\n").unwrap();
        assert_eq!(parsed.into_rows(), owned(&[&["a", "b"], &["1", "2"]]));
    }

    #[test]
    fn test_missing_trailing_newline() {
        let parsed = decode_bytes(b"a,b\n1,2").unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_ragged_rows_allowed() {
        let parsed = decode_bytes(b"a,b,c\n1\n1,2,3,4\n").unwrap();
        let lengths: Vec<usize> = parsed.rows().map(|r| r.len()).collect();
        assert_eq!(lengths, vec![3, 1, 4]);
    }

    #[test]
    fn test_blank_lines_skipped() {
        let parsed = decode_bytes(b"a,b\n\n1,2\n\n").unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn test_rows_iterator_restarts() {
        let parsed = decode_bytes(b"a\nb\nc\n").unwrap();
        let first: Vec<&Row> = parsed.rows().collect();
        let second: Vec<&Row> = parsed.rows().collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn test_deterministic() {
        let content = b"x,\"y,z\"\n1,2\n";
        assert_eq!(decode_bytes(content).unwrap(), decode_bytes(content).unwrap());
    }

    #[test]
    fn test_unterminated_quote_rejected_with_line() {
        let err = decode_bytes(b"a,b\n1,2\n3,\"never closed\n4,5\n").unwrap_err();
        assert!(matches!(err, DecodeError::UnterminatedQuote { line: 3 }));
    }

    #[test]
    fn test_literal_quote_inside_unquoted_field_is_accepted() {
        let parsed = decode_bytes(b"size\n5\"\n").unwrap();
        assert_eq!(parsed.into_rows()[1], vec!["5\"".to_string()]);
    }

    #[test]
    fn test_bom_before_unterminated_quote_rejected() {
        let err = decode_bytes(b"\xEF\xBB\xBF\"a,b\n1,2\n").unwrap_err();
        assert!(matches!(err, DecodeError::UnterminatedQuote { line: 1 }));
    }

    #[test]
    fn test_bom_before_quoted_header_is_stripped() {
        let parsed = decode_bytes(b"\xEF\xBB\xBF\"x,y\",z\n1,2\n").unwrap();
        assert_eq!(parsed.into_rows(), owned(&[&["x,y", "z"], &["1", "2"]]));
    }

    #[test]
    fn test_invalid_utf8_rejected() {
        let err = decode_bytes(b"a,b\n\xff\xfe,1\n").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidEncoding { .. }));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(decode_bytes(b"").unwrap_err(), DecodeError::Empty));
        assert!(matches!(decode_bytes(b"\n\n").unwrap_err(), DecodeError::Empty));
    }

    #[tokio::test]
    async fn test_decode_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "h1,h2\nv1,v2\n").unwrap();

        let parsed = decode(&path).await.unwrap();
        assert_eq!(parsed.len(), 2);
    }

    #[tokio::test]
    async fn test_decode_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = decode(&dir.path().join("gone.csv")).await.unwrap_err();
        assert!(matches!(err, DecodeError::Read(_)));
    }
}
