mod album;
mod file;
mod history;
mod session;

pub use self::album::CachedAlbum;
pub(crate) use self::album::AlbumRow;
pub use self::file::{FileOutcome, FileRecord, FileStatus, MatchedAlbum};
pub(crate) use self::file::FileRow;
pub use self::history::{ChangeSource, HistoryEntry};
pub(crate) use self::history::HistoryRow;
pub use self::session::{RunMode, Session, SessionConfig, SessionCounters, SessionDelta, SessionStatus};
pub(crate) use self::session::SessionRow;
