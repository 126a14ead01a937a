//! Run summaries, in memory and on disk.
//!
//! Every dispatch returns a [`RunSummary`] to its caller and, when an
//! output directory is configured, writes it out twice: a machine-readable
//! `batch_<timestamp>.json` with the full per-file detail, and a flat
//! `batch_<timestamp>.csv` for spreadsheet triage. The CSV is simple enough
//! that it is emitted by hand (RFC 4180 quoting only).

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use time::UtcDateTime;
use time::macros::format_description;
use tome_ledger::{FileOutcome, FileStatus};

/// What one dispatch run did, in aggregate and per file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub session_id: i64,
    pub started_at: UtcDateTime,
    pub ended_at: UtcDateTime,
    pub total: u32,
    pub successful: u32,
    pub failed: u32,
    pub skipped: u32,
    /// Files deferred for human review (status `manual`).
    pub low_confidence: u32,
    pub files: Vec<FileOutcome>,
}

impl RunSummary {
    pub fn new(session_id: i64, total: u32) -> Self {
        let now = UtcDateTime::now();
        Self {
            session_id,
            started_at: now,
            ended_at: now,
            total,
            successful: 0,
            failed: 0,
            skipped: 0,
            low_confidence: 0,
            files: Vec::new(),
        }
    }

    /// Fold one outcome into the tallies.
    pub fn record(&mut self, outcome: &FileOutcome) {
        match outcome.status {
            FileStatus::Success => self.successful += 1,
            FileStatus::Failed => self.failed += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Manual => self.low_confidence += 1,
            FileStatus::Pending => {},
        }
        self.files.push(outcome.clone());
    }

    /// Stamp the end of the run.
    pub fn close(&mut self) {
        self.ended_at = UtcDateTime::now();
    }

    /// Write the JSON and CSV reports into `dir`, creating it if needed.
    /// Returns the two paths written.
    pub async fn write(&self, dir: impl AsRef<Path>) -> Result<(PathBuf, PathBuf)> {
        let dir = dir.as_ref();
        tokio::fs::create_dir_all(dir).await.or_raise(|| ErrorKind::Report(dir.to_path_buf()))?;

        let stamp = self
            .started_at
            .format(format_description!("[year][month][day]_[hour][minute][second]"))
            .or_raise(|| ErrorKind::Report(dir.to_path_buf()))?;

        let json_path = dir.join(format!("batch_{stamp}.json"));
        let json = serde_json::to_vec_pretty(self).or_raise(|| ErrorKind::Report(json_path.clone()))?;
        tokio::fs::write(&json_path, json).await.or_raise(|| ErrorKind::Report(json_path.clone()))?;

        let csv_path = dir.join(format!("batch_{stamp}.csv"));
        tokio::fs::write(&csv_path, self.to_csv()).await.or_raise(|| ErrorKind::Report(csv_path.clone()))?;

        tracing::info!(json = %json_path.display(), csv = %csv_path.display(), "run summary written");
        Ok((json_path, csv_path))
    }

    fn to_csv(&self) -> String {
        let mut out = String::from("path,status,album_id,title,series,volume,confidence,attempts,duration_ms,error\n");
        for file in &self.files {
            let album = file.album.as_ref();
            let row = [
                file.path.display().to_string(),
                file.status.to_string(),
                album.map(|a| a.album_id.to_string()).unwrap_or_default(),
                album.map(|a| a.title.clone()).unwrap_or_default(),
                album.and_then(|a| a.series.clone()).unwrap_or_default(),
                album.and_then(|a| a.volume).map(|v| v.to_string()).unwrap_or_default(),
                file.confidence.map(|c| format!("{c:.3}")).unwrap_or_default(),
                file.attempts.to_string(),
                file.duration_ms.to_string(),
                file.error.clone().unwrap_or_default(),
            ];
            let line: Vec<String> = row.into_iter().map(|field| csv_field(&field)).collect();
            out.push_str(&line.join(","));
            out.push('\n');
        }
        out
    }
}

/// RFC 4180 quoting: wrap the field when it contains a comma, a quote or a
/// newline, doubling any embedded quotes.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::TempDir;

    fn outcome(path: &str, status: FileStatus) -> FileOutcome {
        FileOutcome {
            path: PathBuf::from(path),
            hash: "aa".to_string(),
            size: Some(10),
            status,
            album: None,
            confidence: None,
            error: None,
            attempts: 1,
            duration_ms: 5,
        }
    }

    #[rstest]
    #[case("plain", "plain")]
    #[case("with,comma", "\"with,comma\"")]
    #[case("with \"quote\"", "\"with \"\"quote\"\"\"")]
    #[case("multi\nline", "\"multi\nline\"")]
    fn test_csv_quoting(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(csv_field(input), expected);
    }

    #[test]
    fn test_tallies() {
        let mut summary = RunSummary::new(1, 4);
        summary.record(&outcome("/a.cbz", FileStatus::Success));
        summary.record(&outcome("/b.cbz", FileStatus::Manual));
        summary.record(&outcome("/c.cbz", FileStatus::Failed));
        summary.record(&outcome("/d.cbz", FileStatus::Skipped));
        assert_eq!(summary.successful, 1);
        assert_eq!(summary.low_confidence, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.files.len(), 4);
    }

    #[tokio::test]
    async fn test_write_emits_both_files() {
        let dir = TempDir::new().unwrap();
        let mut summary = RunSummary::new(1, 1);
        let mut file = outcome("/data/bd/Thorgal, Tome 3.cbz", FileStatus::Success);
        file.confidence = Some(0.912);
        summary.record(&file);
        summary.close();

        let (json_path, csv_path) = summary.write(dir.path().join("reports")).await.unwrap();
        let json = std::fs::read_to_string(&json_path).unwrap();
        let parsed: RunSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.successful, 1);

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let mut lines = csv.lines();
        assert!(lines.next().unwrap().starts_with("path,status"));
        let row = lines.next().unwrap();
        // Comma in the path forces quoting.
        assert!(row.starts_with("\"/data/bd/Thorgal, Tome 3.cbz\",success"));
        assert!(row.contains("0.912"));
    }
}
