use crate::error::{Error, ErrorKind};
use exn::ResultExt;
use time::UtcDateTime;
use tome_catalog::MetadataRecord;

/// A catalog album record held in the ledger's TTL'd cache table.
///
/// The scalar columns exist for SQL-side filtering and the catalog browsing
/// queries; the `metadata` JSON blob is the authoritative full record.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAlbum {
    pub record: MetadataRecord,
    pub cached_at: UtcDateTime,
    pub valid_until: UtcDateTime,
}

impl CachedAlbum {
    pub fn is_fresh(&self, now: UtcDateTime) -> bool {
        now <= self.valid_until
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AlbumRow {
    pub(crate) metadata: String,
    pub(crate) cached_at: i64,
    pub(crate) valid_until: i64,
}

impl TryFrom<AlbumRow> for CachedAlbum {
    type Error = Error;
    fn try_from(row: AlbumRow) -> Result<Self, Self::Error> {
        Ok(Self {
            record: serde_json::from_str::<MetadataRecord>(&row.metadata)
                .or_raise(|| ErrorKind::InvalidData("album metadata"))?,
            cached_at: UtcDateTime::from_unix_timestamp(row.cached_at)
                .or_raise(|| ErrorKind::InvalidData("album cache date"))?,
            valid_until: UtcDateTime::from_unix_timestamp(row.valid_until)
                .or_raise(|| ErrorKind::InvalidData("album cache expiry"))?,
        })
    }
}
