//! A log tailing library that turns a growing log file into a live sequence of records.
//!
//! The file is read incrementally: only bytes appended since the last read are
//! parsed. Each record starts at a line beginning with a timestamp such as
//! `2010-01-01 00:00:00.000 +00:00`; the lines that follow belong to it until
//! the next such line. Records land in an append-only sequence that can be
//! read from any thread while new records keep arriving.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_tailer::{SequenceEvent, tail_log};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = tail_log("app.log").await?;
//!     let mut events = file.records().subscribe();
//!
//!     for record in file.records() {
//!         println!("{}", record);
//!     }
//!
//!     while let Some(event) = events.recv().await {
//!         if let SequenceEvent::ItemsAdded { items, .. } = event {
//!             for record in items.iter() {
//!                 println!("{}", record);
//!             }
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

// Internal modules - not part of public API
mod config;
mod error;
mod parser;
mod reader;
mod record;
mod sequence;
mod subscription;
mod tailed_file;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::{DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL, TailConfig};
pub use error::{Error, Result};
pub use parser::{RecordParser, parse_records};
pub use record::Record;
pub use sequence::{AppendOnlySequence, SequenceEvent, Snapshot};
pub use subscription::Subscription;
pub use tailed_file::TailedFile;
pub use watcher::{ChangeNotifier, UpdateRequired};

use std::path::Path;

/// Loads a log file and keeps its records up to date as the file grows.
///
/// # Arguments
///
/// * `path` - File path to tail
///
/// Fails with [`Error::FileNotFound`] if the file does not exist.
pub async fn tail_log<P: AsRef<Path>>(path: P) -> Result<TailedFile> {
    let file = TailedFile::load(path).await?;
    file.activate()?;
    Ok(file)
}
