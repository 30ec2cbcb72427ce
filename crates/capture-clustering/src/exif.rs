//! Capture-time extraction using exiftool.
//!
//! Uses exiftool's stay-open mode so one child process serves a whole batch
//! of files. Only the sub-second capture time is requested: whole-second
//! timestamps systematically misclassify bracket gaps, which are often
//! shorter than a second.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use chrono::{DateTime, FixedOffset};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};

/// Number of photos handed to one exiftool process when extracting in
/// parallel.
const CHUNK_SIZE: usize = 64;

/// A photo with its capture timestamp, the unit the classifier works on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedPhoto {
    pub path: PathBuf,
    pub capture_time: DateTime<FixedOffset>,
}

impl CapturedPhoto {
    pub fn new(path: PathBuf, capture_time: DateTime<FixedOffset>) -> Self {
        Self { path, capture_time }
    }

    /// File name component, used as the leaf of the destination path.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }
}

#[derive(Deserialize)]
struct ExiftoolRecord {
    #[serde(rename = "SourceFile")]
    source_file: String,
    #[serde(rename = "SubSecDateTimeOriginal")]
    subsec_date_time_original: Option<String>,
    #[serde(rename = "SubSecCreateDate")]
    subsec_create_date: Option<String>,
}

/// Probe the exiftool installation, returning its version string.
pub fn exiftool_version() -> Result<String> {
    let output = Command::new("exiftool").arg("-ver").output().map_err(|e| {
        SessionError::Exiftool(format!(
            "failed to run exiftool -ver ({e}); make sure exiftool is installed and in PATH"
        ))
    })?;

    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if version.parse::<f64>().is_err() {
        return Err(SessionError::Exiftool(format!(
            "unexpected output from exiftool -ver: {version:?}"
        )));
    }
    Ok(version)
}

pub struct ExiftoolRunner {
    child: Child,
    stdin: BufWriter<std::process::ChildStdin>,
    stdout: BufReader<std::process::ChildStdout>,
}

impl ExiftoolRunner {
    /// Spawn a persistent exiftool process.
    pub fn new() -> Result<Self> {
        let mut child = Command::new("exiftool")
            .args(["-stay_open", "True", "-@", "-"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                SessionError::Exiftool(format!(
                    "failed to spawn exiftool ({e}); make sure exiftool is installed and in PATH"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .map(BufWriter::new)
            .ok_or_else(|| SessionError::Exiftool("no stdin handle".to_string()))?;

        let stdout = child
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| SessionError::Exiftool("no stdout handle".to_string()))?;

        Ok(Self {
            child,
            stdin,
            stdout,
        })
    }

    /// Extract capture times for a batch of photos, preserving input order.
    ///
    /// Any photo without a timezone-aware, sub-second capture time fails
    /// the whole batch.
    pub fn extract(&mut self, paths: &[PathBuf]) -> Result<Vec<CapturedPhoto>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        writeln!(self.stdin, "-json")?;
        writeln!(self.stdin, "-fast")?;
        writeln!(self.stdin, "-SubSecDateTimeOriginal")?;
        writeln!(self.stdin, "-SubSecCreateDate")?;

        for path in paths {
            writeln!(self.stdin, "{}", path.display())?;
        }

        writeln!(self.stdin, "-execute")?;
        self.stdin.flush()?;

        // Read JSON output until the {ready} sentinel
        let mut json_output = String::new();
        loop {
            let mut line = String::new();
            let bytes_read = self.stdout.read_line(&mut line)?;
            if bytes_read == 0 {
                return Err(SessionError::Exiftool(
                    "unexpected EOF from exiftool process".to_string(),
                ));
            }

            let trimmed = line.trim();
            if trimmed.starts_with("{ready") && trimmed.ends_with('}') {
                break;
            }
            json_output.push_str(&line);
        }

        let records: Vec<ExiftoolRecord> = serde_json::from_str(&json_output)
            .map_err(|e| SessionError::Exiftool(format!("unparsable JSON output: {e}")))?;

        if records.len() != paths.len() {
            return Err(SessionError::Exiftool(format!(
                "asked for {} files, got {} records back",
                paths.len(),
                records.len()
            )));
        }

        let mut photos = Vec::with_capacity(records.len());
        for record in records {
            let path = PathBuf::from(&record.source_file);
            let raw = record
                .subsec_date_time_original
                .or(record.subsec_create_date)
                .ok_or_else(|| SessionError::CaptureTime {
                    path: path.clone(),
                    reason: "no SubSecDateTimeOriginal or SubSecCreateDate tag".to_string(),
                })?;

            let capture_time =
                parse_capture_time(&raw).map_err(|reason| SessionError::CaptureTime {
                    path: path.clone(),
                    reason,
                })?;

            photos.push(CapturedPhoto::new(path, capture_time));
        }

        Ok(photos)
    }
}

impl Drop for ExiftoolRunner {
    fn drop(&mut self) {
        // Gracefully shut down exiftool
        let _ = writeln!(self.stdin, "-stay_open");
        let _ = writeln!(self.stdin, "False");
        let _ = self.stdin.flush();
        let _ = self.child.wait();
    }
}

/// Extract capture times for a whole session, chunked across the rayon
/// thread pool with one exiftool process per chunk.
///
/// `progress` is called with a chunk's size as each chunk completes.
/// Output order matches `paths`; the downstream sort puts the photos in
/// chronological order either way.
pub fn extract_all<F>(paths: &[PathBuf], progress: F) -> Result<Vec<CapturedPhoto>>
where
    F: Fn(usize) + Sync,
{
    let chunks: Vec<Vec<CapturedPhoto>> = paths
        .par_chunks(CHUNK_SIZE)
        .map(|chunk| {
            let mut runner = ExiftoolRunner::new()?;
            let photos = runner.extract(chunk)?;
            progress(chunk.len());
            Ok(photos)
        })
        .collect::<Result<_>>()?;

    Ok(chunks.into_iter().flatten().collect())
}

/// Parse an exiftool timestamp like `2021:07:15 02:07:17.24+08:00`.
///
/// Both the UTC offset and the fractional second are required.
fn parse_capture_time(raw: &str) -> std::result::Result<DateTime<FixedOffset>, String> {
    let raw = raw.trim();
    if !raw.contains('.') {
        return Err(format!("no sub-second precision in {raw:?}"));
    }
    DateTime::parse_from_str(raw, "%Y:%m:%d %H:%M:%S%.f%z")
        .map_err(|e| format!("unparsable timestamp {raw:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_capture_time() {
        let dt = parse_capture_time("2021:07:15 02:07:17.24+08:00").unwrap();
        assert_eq!(dt.year(), 2021);
        assert_eq!(dt.month(), 7);
        assert_eq!(dt.day(), 15);
        assert_eq!(dt.hour(), 2);
        assert_eq!(dt.minute(), 7);
        assert_eq!(dt.second(), 17);
        assert_eq!(dt.nanosecond(), 240_000_000); // .24 seconds
        assert_eq!(dt.offset().local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn test_parse_capture_time_negative_offset() {
        let dt = parse_capture_time("2024:01:15 14:30:25.503-05:00").unwrap();
        assert_eq!(dt.nanosecond(), 503_000_000);
        assert_eq!(dt.offset().local_minus_utc(), -5 * 3600);
    }

    #[test]
    fn test_whole_second_timestamp_rejected() {
        let err = parse_capture_time("2021:07:15 02:07:17+08:00").unwrap_err();
        assert!(err.contains("sub-second"));
    }

    #[test]
    fn test_offset_less_timestamp_rejected() {
        assert!(parse_capture_time("2021:07:15 02:07:17.24").is_err());
    }

    #[test]
    fn test_file_name() {
        let photo = CapturedPhoto::new(
            PathBuf::from("/session/raw/IMG_0042.tif"),
            parse_capture_time("2021:07:15 02:07:17.24+08:00").unwrap(),
        );
        assert_eq!(photo.file_name(), "IMG_0042.tif");
    }
}
