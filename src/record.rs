//! The parsed log record.

use chrono::{DateTime, FixedOffset};
use std::fmt;

/// chrono format of the timestamp that opens every record.
pub(crate) const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

/// Byte length of a rendered timestamp, e.g. `2010-01-01 00:00:00.000 +00:00`.
pub(crate) const TIMESTAMP_LEN: usize = 30;

/// A single log entry: the timestamp from its header line and its message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Record {
    timestamp: DateTime<FixedOffset>,
    message: String,
}

impl Record {
    pub fn new(timestamp: DateTime<FixedOffset>, message: impl Into<String>) -> Self {
        Self {
            timestamp,
            message: message.into(),
        }
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    /// Message text; continuation lines are joined with `\n`.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.message
        )
    }
}
