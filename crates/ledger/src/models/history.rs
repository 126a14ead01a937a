use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use time::UtcDateTime;

/// Where a metadata change came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum ChangeSource {
    /// Written by the batch pipeline after an auto-accepted match.
    #[display("auto")]
    Auto,
    /// Written after a human review decision.
    #[display("manual")]
    Manual,
    /// Written by a direct catalog refresh.
    #[display("api")]
    Api,
}

impl FromStr for ChangeSource {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            "api" => Ok(Self::Api),
            _ => Err(exn::Exn::from(ErrorKind::InvalidData("change source"))),
        }
    }
}

/// One append-only audit row. These are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: i64,
    pub file_id: i64,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub source: ChangeSource,
    pub changed_at: UtcDateTime,
}

#[derive(sqlx::FromRow)]
pub(crate) struct HistoryRow {
    id: i64,
    file_id: i64,
    field: String,
    old_value: Option<String>,
    new_value: Option<String>,
    source: String,
    changed_at: i64,
}

impl TryFrom<HistoryRow> for HistoryEntry {
    type Error = Error;
    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            file_id: row.file_id,
            field: row.field,
            old_value: row.old_value,
            new_value: row.new_value,
            source: row.source.parse::<ChangeSource>()?,
            changed_at: UtcDateTime::from_unix_timestamp(row.changed_at)
                .or_raise(|| ErrorKind::InvalidData("history date"))?,
        })
    }
}
