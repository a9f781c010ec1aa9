//! Incremental reading of the unread tail of a log file.

use crate::error::{Error, Result};
use crate::parser::{is_header_line, parse_records};
use crate::record::Record;
use crate::sequence::AppendOnlySequence;
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tokio::fs;
use tokio::task;
use tracing::debug;

/// Complete lines read from the tail of a file, parsed into records.
#[derive(Debug, Default)]
struct TailChunk {
    records: Vec<Record>,
    consumed: u64,
}

/// Parse the bytes appended since `last_position` and append them to `records`.
///
/// Only complete records are consumed: a trailing line without a newline stays
/// unread until its writer finishes it, and so does the record it may still
/// belong to. `last_position` moves only when the whole read succeeds.
/// Returns the number of records appended.
pub(crate) async fn update_records(
    file_path: &Path,
    last_position: &mut u64,
    records: &AppendOnlySequence<Record>,
) -> Result<usize> {
    let metadata = fs::metadata(file_path)
        .await
        .map_err(|e| not_found_or_io(e, file_path))?;
    let current_size = metadata.len();

    if detect_file_truncation(current_size, *last_position) {
        return Err(Error::FileShrunk {
            path: file_path.display().to_string(),
            len: current_size,
            position: *last_position,
        });
    }

    // Check if there's new content to read
    let bytes_to_read = match calculate_bytes_to_read(current_size, *last_position) {
        Some(bytes) => bytes,
        None => return Ok(0),
    };

    let path = file_path.to_path_buf();
    let start = *last_position;
    let chunk = task::spawn_blocking(move || read_tail(&path, start, bytes_to_read)).await??;

    let count = chunk.records.len();
    records.append(chunk.records);
    *last_position = start + chunk.consumed;

    debug!(
        path = %file_path.display(),
        records = count,
        consumed = chunk.consumed,
        position = *last_position,
        "read new log content"
    );

    Ok(count)
}

/// Reads up to `len` bytes from `start` and parses the complete records among them.
///
/// The handle is opened read-only and closed before returning, so writers
/// appending to the file are never blocked by it.
fn read_tail(path: &Path, start: u64, len: u64) -> Result<TailChunk> {
    let mut file = File::open(path).map_err(|e| not_found_or_io(e, path))?;
    file.seek(SeekFrom::Start(start))?;

    let mut buffer = Vec::with_capacity(usize::try_from(len).unwrap_or_default());
    file.take(len).read_to_end(&mut buffer)?;

    let consumed = consumable_len(&buffer);
    if consumed == 0 {
        return Ok(TailChunk::default());
    }

    let records = parse_records(&buffer[..consumed]).collect::<Result<Vec<_>>>()?;
    Ok(TailChunk {
        records,
        consumed: consumed as u64,
    })
}

/// Length of the prefix of `buffer` that can be parsed without cutting a record short.
///
/// Everything up to the last newline is complete. When an unterminated line
/// follows and is not itself a header, it may still continue the last record,
/// so that record is left unread from the start of its header line.
fn consumable_len(buffer: &[u8]) -> usize {
    let complete = match buffer.iter().rposition(|&b| b == b'\n') {
        Some(i) => i + 1,
        None => return 0,
    };
    if complete == buffer.len() || is_header_line(&buffer[complete..]) {
        return complete;
    }
    last_header_start(&buffer[..complete]).unwrap_or(complete)
}

/// Byte offset of the last header line in `lines`.
fn last_header_start(lines: &[u8]) -> Option<usize> {
    let mut start = 0;
    let mut last = None;
    for line in lines.split_inclusive(|&b| b == b'\n') {
        if is_header_line(line) {
            last = Some(start);
        }
        start += line.len();
    }
    last
}

fn not_found_or_io(error: std::io::Error, path: &Path) -> Error {
    if error.kind() == ErrorKind::NotFound {
        Error::FileNotFound {
            path: path.display().to_string(),
        }
    } else {
        Error::Io(error)
    }
}

/// Detect if the file was truncated by comparing current size with last position
fn detect_file_truncation(current_size: u64, last_position: u64) -> bool {
    current_size < last_position
}

/// Calculate bytes to read based on current size and last position
fn calculate_bytes_to_read(current_size: u64, last_position: u64) -> Option<u64> {
    if current_size <= last_position {
        None
    } else {
        Some(current_size - last_position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::TempLogFile;

    const FIRST: &str = "2023-01-01 10:00:00.000 +00:00 INFO Starting application";
    const SECOND: &str = "2023-01-01 10:00:01.000 +00:00 INFO Loading configuration";

    #[test]
    fn test_consumable_len_complete_lines() {
        assert_eq!(consumable_len(b"one\ntwo\n"), 8);
        assert_eq!(consumable_len(b"one\ntw"), 4);
        assert_eq!(consumable_len(b"partial"), 0);
        assert_eq!(consumable_len(b""), 0);
    }

    #[test]
    fn test_consumable_len_holds_back_open_record() {
        let first = format!("{FIRST}\n");
        let second = format!("{SECOND}\n");

        let held = format!("{first}{second}stack line without newline");
        assert_eq!(consumable_len(held.as_bytes()), first.len());

        let next_header = format!("{first}{second}2023-01-01 10:00:02.000 +00:00 partial");
        assert_eq!(
            consumable_len(next_header.as_bytes()),
            first.len() + second.len()
        );

        let only_noise = "noise\nmore noise";
        assert_eq!(consumable_len(only_noise.as_bytes()), "noise\n".len());
    }

    #[test]
    fn test_detect_file_truncation() {
        assert!(detect_file_truncation(100, 200));
        assert!(!detect_file_truncation(200, 100));
        assert!(!detect_file_truncation(100, 100));
        assert!(!detect_file_truncation(0, 0));
    }

    #[test]
    fn test_calculate_bytes_to_read() {
        assert_eq!(calculate_bytes_to_read(200, 100), Some(100));
        assert_eq!(calculate_bytes_to_read(100, 100), None);
        assert_eq!(calculate_bytes_to_read(50, 100), None);
        assert_eq!(calculate_bytes_to_read(0, 0), None);
        assert_eq!(calculate_bytes_to_read(u64::MAX, u64::MAX - 1), Some(1));
    }

    #[tokio::test]
    async fn test_reads_whole_file_from_start() {
        let file = TempLogFile::with_content(&format!("{FIRST}\n{SECOND}")).unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;

        let count = update_records(file.path(), &mut position, &records)
            .await
            .expect("Should read file successfully");

        assert_eq!(count, 2);
        assert_eq!(records.get(0).unwrap().message(), "INFO Starting application");
        assert_eq!(records.get(1).unwrap().message(), "INFO Loading configuration");
        assert_eq!(position, file.len());
    }

    #[tokio::test]
    async fn test_second_update_without_growth_changes_nothing() {
        let file = TempLogFile::with_content(FIRST).unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;

        update_records(file.path(), &mut position, &records).await.unwrap();
        let position_after_first = position;

        let count = update_records(file.path(), &mut position, &records).await.unwrap();

        assert_eq!(count, 0);
        assert_eq!(position, position_after_first);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_incremental_reading_appends_only_new_records() {
        let file = TempLogFile::with_content(FIRST).unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;
        update_records(file.path(), &mut position, &records).await.unwrap();

        file.append_content(SECOND).unwrap();
        let count = update_records(file.path(), &mut position, &records).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(records.len(), 2);
        assert_eq!(records.get(1).unwrap().message(), "INFO Loading configuration");
        assert_eq!(position, file.len());
    }

    #[tokio::test]
    async fn test_unterminated_line_is_left_for_next_update() {
        let file = TempLogFile::with_content(FIRST).unwrap();
        file.write_raw("2023-01-01 10:00:02.000 +00:00 half writ").unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;

        update_records(file.path(), &mut position, &records).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(position, FIRST.len() as u64 + 1);

        file.write_raw("ten\n").unwrap();
        update_records(file.path(), &mut position, &records).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records.get(1).unwrap().message(), "half written");
        assert_eq!(position, file.len());
    }

    #[tokio::test]
    async fn test_unterminated_continuation_stays_with_its_record() {
        let file = TempLogFile::new().unwrap();
        file.write_raw(
            "confusing file start\n\
             without records\n\
             2010-01-01 00:00:00.000 +00:00 simple log record\n\
             2010-01-02 00:00:00.000 +00:00 log record with\n\
             continuation line",
        )
        .unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;

        update_records(file.path(), &mut position, &records).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records.get(0).unwrap().message(), "simple log record");

        file.write_raw("\n").unwrap();
        let count = update_records(file.path(), &mut position, &records).await.unwrap();

        assert_eq!(count, 1);
        assert_eq!(
            records.get(1).unwrap().message(),
            "log record with\ncontinuation line"
        );
        assert_eq!(position, file.len());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nonexistent.log");
        let records = AppendOnlySequence::new();
        let mut position = 0u64;

        let result = update_records(&missing, &mut position, &records).await;

        assert!(matches!(result, Err(Error::FileNotFound { .. })));
        assert_eq!(position, 0);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_shrunk_file_is_reported_and_state_kept() {
        let file = TempLogFile::with_content(FIRST).unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;
        update_records(file.path(), &mut position, &records).await.unwrap();
        let before = position;

        file.truncate().unwrap();
        let result = update_records(file.path(), &mut position, &records).await;

        match result {
            Err(Error::FileShrunk { len, position: at, .. }) => {
                assert_eq!(len, 0);
                assert_eq!(at, before);
            }
            other => panic!("Expected FileShrunk, got {:?}", other),
        }
        assert_eq!(position, before);
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_file() {
        let file = TempLogFile::new().unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;

        let count = update_records(file.path(), &mut position, &records).await.unwrap();

        assert_eq!(count, 0);
        assert_eq!(position, 0);
    }

    #[tokio::test]
    async fn test_noise_only_content_is_consumed_without_records() {
        let file = TempLogFile::with_content("no header here\nnor here").unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;

        let count = update_records(file.path(), &mut position, &records).await.unwrap();

        assert_eq!(count, 0);
        assert!(records.is_empty());
        assert_eq!(position, file.len());
    }

    #[tokio::test]
    async fn test_large_file_reading() {
        let mut content = String::new();
        for i in 0..1000 {
            content.push_str(&format!("2023-01-01 10:00:00.000 +00:00 Line number {i}\n"));
        }
        let file = TempLogFile::new().unwrap();
        file.write_raw(&content).unwrap();
        let records = AppendOnlySequence::new();
        let mut position = 0u64;

        let count = update_records(file.path(), &mut position, &records).await.unwrap();

        assert_eq!(count, 1000);
        assert_eq!(records.get(0).unwrap().message(), "Line number 0");
        assert_eq!(records.get(999).unwrap().message(), "Line number 999");
    }

    #[tokio::test]
    async fn test_reading_while_file_is_open_for_writing() {
        use std::io::Write;

        let file = TempLogFile::new().unwrap();
        let mut writer = std::fs::OpenOptions::new()
            .append(true)
            .open(file.path())
            .unwrap();
        writeln!(writer, "{FIRST}").unwrap();
        writer.flush().unwrap();

        let records = AppendOnlySequence::new();
        let mut position = 0u64;
        update_records(file.path(), &mut position, &records).await.unwrap();

        writeln!(writer, "{SECOND}").unwrap();
        writer.flush().unwrap();
        update_records(file.path(), &mut position, &records).await.unwrap();

        assert_eq!(records.len(), 2);
    }
}
