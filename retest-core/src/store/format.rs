// Line-oriented framing shared by every state file.
//
// Each file starts with `#retest <kind> v1`, carries `key value` preamble
// lines, a body, and ends with `end <n>`. Anything else is corruption.

use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::TestIdEncoding;
use crate::error::StoreError;

pub(crate) const VERSION: &str = "v1";

pub(crate) fn header(kind: &str) -> String {
    format!("#retest {kind} {VERSION}\n")
}

/// Append a `key value` line.
pub(crate) fn push_field(out: &mut String, key: &str, value: impl std::fmt::Display) {
    // Writing to a String cannot fail.
    let _ = writeln!(out, "{key} {value}");
}

pub(crate) fn push_end(out: &mut String, count: usize) {
    push_field(out, "end", count);
}

/// Strict reader over the lines of one state file.
pub(crate) struct LineReader<'a> {
    file: &'static str,
    lines: std::str::Lines<'a>,
    line_no: usize,
}

impl<'a> LineReader<'a> {
    pub(crate) fn new(file: &'static str, text: &'a str) -> Self {
        Self {
            file,
            lines: text.lines(),
            line_no: 0,
        }
    }

    pub(crate) fn corrupt(&self, reason: impl std::fmt::Display) -> StoreError {
        StoreError::corrupt(self.file, format!("line {}: {reason}", self.line_no))
    }

    pub(crate) fn next_line(&mut self) -> Result<&'a str, StoreError> {
        self.line_no += 1;
        self.lines
            .next()
            .ok_or_else(|| self.corrupt("unexpected end of file"))
    }

    pub(crate) fn expect_header(&mut self, kind: &str) -> Result<(), StoreError> {
        let line = self.next_line()?;
        let expected = format!("#retest {kind} {VERSION}");
        if line != expected {
            return Err(self.corrupt(format!("expected header {expected:?}, found {line:?}")));
        }
        Ok(())
    }

    /// Read a `key value` line and return `value`.
    pub(crate) fn field(&mut self, key: &str) -> Result<&'a str, StoreError> {
        let line = self.next_line()?;
        split_field(line, key).ok_or_else(|| self.corrupt(format!("expected {key:?} line")))
    }

    pub(crate) fn count(&mut self, key: &str) -> Result<usize, StoreError> {
        let value = self.field(key)?;
        value
            .parse()
            .map_err(|_| self.corrupt(format!("bad {key} count {value:?}")))
    }

    pub(crate) fn generation(&mut self) -> Result<Uuid, StoreError> {
        let value = self.field("generation")?;
        Uuid::parse_str(value).map_err(|_| self.corrupt(format!("bad generation {value:?}")))
    }

    pub(crate) fn encoding(&mut self) -> Result<TestIdEncoding, StoreError> {
        let value = self.field("encoding")?;
        value
            .parse()
            .map_err(|_| self.corrupt(format!("unknown test id encoding {value:?}")))
    }

    pub(crate) fn created(&mut self) -> Result<DateTime<Utc>, StoreError> {
        let value = self.field("created")?;
        DateTime::parse_from_rfc3339(value)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| self.corrupt(format!("bad timestamp {value:?}")))
    }

    /// Consume the `end <n>` terminator and require nothing after it.
    pub(crate) fn finish(&mut self, expected: usize) -> Result<(), StoreError> {
        let count = self.count("end")?;
        if count != expected {
            return Err(self.corrupt(format!("end count {count} does not match {expected} entries")));
        }
        self.expect_eof()
    }

    /// Only blank lines may follow the terminator.
    pub(crate) fn expect_eof(&mut self) -> Result<(), StoreError> {
        if self.lines.any(|l| !l.trim().is_empty()) {
            return Err(self.corrupt("content after end marker"));
        }
        Ok(())
    }
}

/// `"key rest"` → `Some("rest")`.
pub(crate) fn split_field<'a>(line: &'a str, key: &str) -> Option<&'a str> {
    line.strip_prefix(key)?.strip_prefix(' ').filter(|rest| !rest.is_empty())
}

/// Split `"a b"` into two whitespace-free tokens.
pub(crate) fn split_pair(line: &str) -> Option<(&str, &str)> {
    let mut parts = line.split(' ');
    let (Some(a), Some(b), None) = (parts.next(), parts.next(), parts.next()) else {
        return None;
    };
    if a.is_empty() || b.is_empty() {
        return None;
    }
    Some((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_framed_file() {
        let gen_id = Uuid::new_v4();
        let mut text = header("demo");
        push_field(&mut text, "generation", gen_id);
        push_field(&mut text, "encoding", "indexed");
        text.push_str("payload\n");
        push_end(&mut text, 1);

        let mut r = LineReader::new("demo", &text);
        r.expect_header("demo").unwrap();
        assert_eq!(r.generation().unwrap(), gen_id);
        assert_eq!(r.encoding().unwrap(), TestIdEncoding::Indexed);
        assert_eq!(r.next_line().unwrap(), "payload");
        r.finish(1).unwrap();
    }

    #[test]
    fn wrong_header_is_corrupt() {
        let mut r = LineReader::new("demo", "#retest other v1\n");
        let err = r.expect_header("demo").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn truncation_is_corrupt() {
        let mut r = LineReader::new("demo", "#retest demo v1\n");
        r.expect_header("demo").unwrap();
        assert!(r.generation().is_err());
    }

    #[test]
    fn end_count_must_match_and_be_last() {
        let mut r = LineReader::new("demo", "end 2\n");
        assert!(r.finish(3).is_err());
        let mut r = LineReader::new("demo", "end 2\ntrailing\n");
        assert!(r.finish(2).is_err());
        let mut r = LineReader::new("demo", "end 2\n\n");
        assert!(r.finish(2).is_ok());
    }

    #[test]
    fn pair_and_field_splitting() {
        assert_eq!(split_pair("a.A abc"), Some(("a.A", "abc")));
        assert_eq!(split_pair("a.A"), None);
        assert_eq!(split_pair("a b c"), None);
        assert_eq!(split_pair("a  b"), None);
        assert_eq!(split_field("test 1 2", "test"), Some("1 2"));
        assert_eq!(split_field("tests 1", "test"), None);
        assert_eq!(split_field("test ", "test"), None);
    }
}
