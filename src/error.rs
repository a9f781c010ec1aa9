//! Error types for the log tailer library.

use thiserror::Error;

/// The main error type for log tailer operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors when reading files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File watching errors from the notify crate.
    #[error("File watcher error: {0}")]
    Watcher(#[from] notify::Error),

    /// The blocking task that reads the file tail panicked or was cancelled.
    #[error("Read task failed: {0}")]
    ReadTask(#[from] tokio::task::JoinError),

    /// File path errors.
    #[error("Invalid file path: {message}")]
    InvalidPath { message: String },

    /// File has been removed or is no longer accessible.
    #[error("File no longer exists: {path}")]
    FileNotFound { path: String },

    /// File is shorter than the bytes already consumed from it.
    #[error("File shrank below the last read position: {path} (length {len}, position {position})")]
    FileShrunk { path: String, len: u64, position: u64 },

    /// Index past the current end of a sequence.
    #[error("Index {index} out of range for sequence of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// A convenient Result type for log tailer operations.
pub type Result<T> = std::result::Result<T, Error>;
