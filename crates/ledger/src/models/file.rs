use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use time::UtcDateTime;

/// Per-file processing status.
///
/// `Pending` rows are pre-registered when a dispatch starts so that a resume
/// can see files the interrupted run never got to. `Success` and `Manual`
/// both count as "processed" for dedup purposes: a file waiting for human
/// review should not be silently re-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[display("pending")]
    Pending,
    #[display("success")]
    Success,
    #[display("manual")]
    Manual,
    #[display("skipped")]
    Skipped,
    #[display("failed")]
    Failed,
}

impl FileStatus {
    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Success | Self::Manual)
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl FromStr for FileStatus {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "manual" => Ok(Self::Manual),
            "skipped" => Ok(Self::Skipped),
            "failed" => Ok(Self::Failed),
            _ => Err(exn::Exn::from(ErrorKind::InvalidData("file status"))),
        }
    }
}

/// The catalog album a file was matched to, as flattened into the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedAlbum {
    pub album_id: u64,
    pub title: String,
    pub series: Option<String>,
    pub volume: Option<u32>,
    pub publisher: Option<String>,
    pub year: Option<i32>,
}

/// What a worker reports for one file. This is the message that crosses the
/// worker boundary, hence the serde derives: workers exchange plain values
/// with the dispatcher, never shared objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub hash: String,
    pub size: Option<u64>,
    pub status: FileStatus,
    pub album: Option<MatchedAlbum>,
    pub confidence: Option<f64>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
}

/// One ledger row for a processed (or pending) file.
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub id: i64,
    pub path: PathBuf,
    pub hash: String,
    pub size: Option<u64>,
    pub session_id: i64,
    pub status: FileStatus,
    pub album: Option<MatchedAlbum>,
    pub confidence: Option<f64>,
    pub error: Option<String>,
    pub attempts: u32,
    pub duration_ms: u64,
    pub recorded_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    id: i64,
    file_path: String,
    file_hash: String,
    file_size: Option<i64>,
    session_id: i64,
    status: String,
    album_id: Option<i64>,
    title: Option<String>,
    series: Option<String>,
    volume: Option<i64>,
    publisher: Option<String>,
    year: Option<i64>,
    confidence: Option<f64>,
    error_msg: Option<String>,
    attempts: i64,
    duration_ms: i64,
    recorded_at: i64,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self, Self::Error> {
        let album = match (row.album_id, row.title) {
            (Some(album_id), Some(title)) => Some(MatchedAlbum {
                album_id: u64::try_from(album_id).or_raise(|| ErrorKind::InvalidData("album id"))?,
                title,
                series: row.series,
                volume: row
                    .volume
                    .map(|v| u32::try_from(v).or_raise(|| ErrorKind::InvalidData("volume")))
                    .transpose()?,
                publisher: row.publisher,
                year: row
                    .year
                    .map(|y| i32::try_from(y).or_raise(|| ErrorKind::InvalidData("year")))
                    .transpose()?,
            }),
            _ => None,
        };
        Ok(Self {
            id: row.id,
            path: PathBuf::from(row.file_path),
            hash: row.file_hash,
            size: row
                .file_size
                .map(|s| u64::try_from(s).or_raise(|| ErrorKind::InvalidData("file size")))
                .transpose()?,
            session_id: row.session_id,
            status: row.status.parse::<FileStatus>()?,
            album,
            confidence: row.confidence,
            error: row.error_msg,
            attempts: u32::try_from(row.attempts).or_raise(|| ErrorKind::InvalidData("attempts"))?,
            duration_ms: u64::try_from(row.duration_ms).or_raise(|| ErrorKind::InvalidData("duration"))?,
            recorded_at: UtcDateTime::from_unix_timestamp(row.recorded_at)
                .or_raise(|| ErrorKind::InvalidData("recorded date"))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_model_with_album() {
        let row = FileRow {
            id: 1,
            file_path: "/data/bd/Thorgal - Tome 03.cbz".to_string(),
            file_hash: "6f1b17063da8508541eb76dac260748a".to_string(),
            file_size: Some(52_428_800),
            session_id: 7,
            status: "success".to_string(),
            album_id: Some(4211),
            title: Some("Les Trois Vieillards du pays d'Aran".to_string()),
            series: Some("Thorgal".to_string()),
            volume: Some(3),
            publisher: Some("Le Lombard".to_string()),
            year: Some(1982),
            confidence: Some(0.91),
            error_msg: None,
            attempts: 1,
            duration_ms: 2350,
            recorded_at: 1756500000,
        };
        let record = FileRecord::try_from(row).unwrap();
        assert!(record.status.is_processed());
        assert_eq!(record.album.as_ref().unwrap().volume, Some(3));
    }

    #[test]
    fn test_row_without_album() {
        let row = FileRow {
            id: 2,
            file_path: "/data/bd/unknown.cbz".to_string(),
            file_hash: String::new(),
            file_size: None,
            session_id: 7,
            status: "pending".to_string(),
            album_id: None,
            title: None,
            series: None,
            volume: None,
            publisher: None,
            year: None,
            confidence: None,
            error_msg: None,
            attempts: 0,
            duration_ms: 0,
            recorded_at: 1756500000,
        };
        let record = FileRecord::try_from(row).unwrap();
        assert_eq!(record.album, None);
        assert!(!record.status.is_terminal());
    }
}
