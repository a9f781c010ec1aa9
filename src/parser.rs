//! Parsing of raw log text into records.
//!
//! A record starts at a header line, which begins with a fixed-width timestamp
//! such as `2010-01-01 00:00:00.000 +00:00`. Every following line that does not
//! start with such a timestamp belongs to the same record. Lines that appear
//! before the first header have no record to attach to and are dropped.

use crate::error::Result;
use crate::record::{Record, TIMESTAMP_FORMAT, TIMESTAMP_LEN};
use chrono::{DateTime, FixedOffset};
use std::io::BufRead;

/// Parses `reader` into a lazy sequence of records.
///
/// The returned iterator reads one line at a time and yields a record as soon
/// as the next header line (or the end of input) closes it. It is single-pass;
/// parsing the same content again needs a fresh reader.
///
/// ```rust
/// use log_tailer::parse_records;
///
/// let text = "2010-01-01 00:00:00.000 +00:00 first\n2010-01-02 00:00:00.000 +00:00 second\n";
/// let records: Vec<_> = parse_records(text.as_bytes()).collect::<Result<_, _>>().unwrap();
/// assert_eq!(records.len(), 2);
/// assert_eq!(records[1].message(), "second");
/// ```
pub fn parse_records<R: BufRead>(reader: R) -> RecordParser<R> {
    RecordParser {
        reader,
        line: Vec::new(),
        open: None,
        finished: false,
    }
}

/// Iterator returned by [`parse_records`].
pub struct RecordParser<R> {
    reader: R,
    line: Vec<u8>,
    open: Option<OpenRecord>,
    finished: bool,
}

struct OpenRecord {
    timestamp: DateTime<FixedOffset>,
    message: String,
}

impl OpenRecord {
    fn close(self) -> Record {
        Record::new(self.timestamp, self.message.trim())
    }
}

impl<R: BufRead> Iterator for RecordParser<R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            self.line.clear();
            match self.reader.read_until(b'\n', &mut self.line) {
                Ok(0) => {
                    self.finished = true;
                    return self.open.take().map(|open| Ok(open.close()));
                }
                Ok(_) => {
                    let text = String::from_utf8_lossy(trim_line_ending(&self.line));
                    if let Some(closed) = consume_line(&mut self.open, &text) {
                        return Some(Ok(closed));
                    }
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
            }
        }
        None
    }
}

/// Feeds one line into the open record; returns the record it closed, if any.
fn consume_line(open: &mut Option<OpenRecord>, line: &str) -> Option<Record> {
    match parse_header(line) {
        Some(timestamp) => {
            let next = OpenRecord {
                timestamp,
                message: line[TIMESTAMP_LEN..].to_string(),
            };
            open.replace(next).map(OpenRecord::close)
        }
        None => {
            if let Some(record) = open.as_mut() {
                record.message.push('\n');
                record.message.push_str(line);
            }
            None
        }
    }
}

/// Layout of a header prefix: `d` is an ASCII digit, `s` an offset sign.
const HEADER_SHAPE: &[u8; TIMESTAMP_LEN] = b"dddd-dd-dd dd:dd:dd.ddd sdd:dd";

fn has_header_shape(prefix: &[u8]) -> bool {
    prefix.len() == TIMESTAMP_LEN
        && prefix.iter().zip(HEADER_SHAPE).all(|(&b, &shape)| match shape {
            b'd' => b.is_ascii_digit(),
            b's' => b == b'+' || b == b'-',
            literal => b == literal,
        })
}

/// Returns the timestamp if `line` starts with a well-formed header prefix.
fn parse_header(line: &str) -> Option<DateTime<FixedOffset>> {
    let prefix = line.get(..TIMESTAMP_LEN)?;
    if !has_header_shape(prefix.as_bytes()) {
        return None;
    }
    DateTime::parse_from_str(prefix, TIMESTAMP_FORMAT).ok()
}

/// Whether raw line bytes would open a new record.
pub(crate) fn is_header_line(line: &[u8]) -> bool {
    line.get(..TIMESTAMP_LEN)
        .and_then(|prefix| std::str::from_utf8(prefix).ok())
        .and_then(parse_header)
        .is_some()
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
