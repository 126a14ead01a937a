//! Session lifecycle transitions.
//!
//! Resuming never reopens the interrupted session. It creates a child
//! session carrying the parent's configuration snapshot, and the remaining
//! work list comes from walking the whole parent chain: anything recorded
//! success or manual anywhere in the chain stays done, everything else
//! (failed, skipped, still pending) is re-dispatched.

use crate::error::{ErrorKind, Result};
use std::path::PathBuf;
use tome_ledger::{Ledger, SessionConfig, SessionStatus};

/// State machine over session rows. Stateless itself; every call reads the
/// current status from the ledger first.
#[derive(Debug, Clone)]
pub struct ResumeManager {
    ledger: Ledger,
}

impl ResumeManager {
    pub fn new(ledger: Ledger) -> Self {
        Self { ledger }
    }

    /// Open a fresh root session.
    pub async fn start(&self, config: &SessionConfig) -> Result<i64> {
        self.ledger.start_session(config, None).await.map_err(ErrorKind::ledger)
    }

    /// Pause a running session. Pausing an already paused session is a
    /// no-op; pausing a terminal one is an error.
    pub async fn pause(&self, session_id: i64) -> Result<()> {
        let session = self.ledger.get_session(session_id).await.map_err(ErrorKind::ledger)?;
        match session.status {
            SessionStatus::Paused => Ok(()),
            SessionStatus::Running => {
                self.ledger.set_status(session_id, SessionStatus::Paused).await.map_err(ErrorKind::ledger)
            },
            status => exn::bail!(ErrorKind::InvalidSessionState { session: session_id, status, action: "pause" }),
        }
    }

    /// Resume a paused or failed session.
    ///
    /// Returns the child session's id together with the list of files still
    /// owed to the directory. The caller is expected to hand both straight
    /// to the dispatcher.
    pub async fn resume(&self, session_id: i64) -> Result<(i64, Vec<PathBuf>)> {
        let session = self.ledger.get_session(session_id).await.map_err(ErrorKind::ledger)?;
        if !matches!(session.status, SessionStatus::Paused | SessionStatus::Failed) {
            exn::bail!(ErrorKind::InvalidSessionState {
                session: session_id,
                status: session.status,
                action: "resume",
            });
        }
        let child = self.ledger.start_session(&session.config, Some(session_id)).await.map_err(ErrorKind::ledger)?;
        let remaining = self.ledger.unprocessed_in_chain(child).await.map_err(ErrorKind::ledger)?;
        tracing::info!(parent = session_id, session = child, remaining = remaining.len(), "resuming session");
        Ok((child, remaining))
    }

    /// Mark a session completed. Idempotent for sessions already completed.
    pub async fn complete(&self, session_id: i64) -> Result<()> {
        self.finish(session_id, SessionStatus::Completed).await
    }

    /// Mark a session failed. Idempotent for sessions already failed.
    pub async fn fail(&self, session_id: i64, reason: &str) -> Result<()> {
        tracing::warn!(session = session_id, reason, "session failed");
        self.finish(session_id, SessionStatus::Failed).await
    }

    async fn finish(&self, session_id: i64, target: SessionStatus) -> Result<()> {
        let session = self.ledger.get_session(session_id).await.map_err(ErrorKind::ledger)?;
        if session.status == target {
            return Ok(());
        }
        // One terminal state never overwrites the other.
        if session.status.is_terminal() {
            exn::bail!(ErrorKind::InvalidSessionState {
                session: session_id,
                status: session.status,
                action: "finish",
            });
        }
        self.ledger.set_status(session_id, target).await.map_err(ErrorKind::ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_ledger::{Database, RunMode};

    async fn manager() -> ResumeManager {
        let db = Database::connect_in_memory().await.unwrap();
        ResumeManager::new(Ledger::from(&db))
    }

    fn config() -> SessionConfig {
        SessionConfig {
            directory: PathBuf::from("/data/bd"),
            mode: RunMode::Strict,
            num_workers: 2,
            force: false,
        }
    }

    #[tokio::test]
    async fn test_pause_only_from_running() {
        let manager = manager().await;
        let session = manager.start(&config()).await.unwrap();

        manager.pause(session).await.unwrap();
        // Idempotent.
        manager.pause(session).await.unwrap();

        let (child, _) = manager.resume(session).await.unwrap();
        manager.complete(child).await.unwrap();
        assert!(manager.pause(child).await.is_err(), "completed sessions cannot pause");
    }

    #[tokio::test]
    async fn test_resume_copies_config_and_links_parent() {
        let manager = manager().await;
        let session = manager.start(&config()).await.unwrap();
        manager.pause(session).await.unwrap();

        let (child, remaining) = manager.resume(session).await.unwrap();
        assert_ne!(child, session);
        assert!(remaining.is_empty());

        let loaded = manager.ledger.get_session(child).await.unwrap();
        assert_eq!(loaded.parent_id, Some(session));
        assert_eq!(loaded.config, config());
        assert_eq!(loaded.status, SessionStatus::Running);
    }

    #[tokio::test]
    async fn test_resume_rejects_running_and_completed() {
        let manager = manager().await;
        let session = manager.start(&config()).await.unwrap();
        assert!(manager.resume(session).await.is_err());

        manager.complete(session).await.unwrap();
        assert!(manager.resume(session).await.is_err());
    }

    #[tokio::test]
    async fn test_failed_sessions_can_resume() {
        let manager = manager().await;
        let session = manager.start(&config()).await.unwrap();
        manager.fail(session, "catalog unreachable").await.unwrap();
        // Idempotent.
        manager.fail(session, "catalog unreachable").await.unwrap();

        let (child, _) = manager.resume(session).await.unwrap();
        assert!(child > session);
    }

    #[tokio::test]
    async fn test_terminal_states_never_flip() {
        let manager = manager().await;
        let session = manager.start(&config()).await.unwrap();
        manager.complete(session).await.unwrap();
        assert!(manager.fail(session, "late failure").await.is_err());
    }
}
