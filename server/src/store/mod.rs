use async_trait::async_trait;
use poll_system::{serde_json, CommandError, FieldUpdate, Session, SessionId};
use thiserror::Error;

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("session {session_id} is at version {actual}, the edit was based on version {expected}")]
    VersionConflict {
        session_id: SessionId,
        expected: u64,
        actual: u64,
    },
    #[error("session id {0:?} cannot be used as a storage key")]
    InvalidKey(SessionId),
    #[error("storage i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored session {session_id} is corrupt: {source}")]
    Corrupt {
        session_id: SessionId,
        #[source]
        source: serde_json::Error,
    },
}

impl From<StoreError> for CommandError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::VersionConflict {
                expected, actual, ..
            } => CommandError::VersionConflict { expected, actual },
            StoreError::InvalidKey(_) => CommandError::Invalid {
                reason: error.to_string(),
            },
            error => CommandError::Unavailable {
                reason: error.to_string(),
            },
        }
    }
}

/// Authoritative owner of session documents.
///
/// Every successful write bumps the session version by one.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_one(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// Replaces the whole document. With `expected_version`, fails unless the stored version
    /// (0 for an absent session) matches.
    async fn upsert(
        &mut self,
        session: Session,
        expected_version: Option<u64>,
    ) -> Result<Session, StoreError>;

    /// Applies targeted field updates. Returns `None` when the session does not exist.
    async fn update(
        &mut self,
        session_id: &SessionId,
        updates: &[FieldUpdate],
    ) -> Result<Option<Session>, StoreError>;

    async fn session_ids(&self) -> Result<Vec<SessionId>, StoreError>;
}

fn next_version(
    session_id: &SessionId,
    stored: Option<&Session>,
    expected_version: Option<u64>,
) -> Result<u64, StoreError> {
    let actual = stored.map_or(0, |session| session.version);
    match expected_version {
        Some(expected) if expected != actual => Err(StoreError::VersionConflict {
            session_id: session_id.clone(),
            expected,
            actual,
        }),
        _ => Ok(actual + 1),
    }
}

/// Returns true when at least one update changed the document.
fn apply_updates(session: &mut Session, updates: &[FieldUpdate]) -> bool {
    let mut changed = false;
    for update in updates {
        if update.apply(session) {
            log::debug!("Session {}: updated {}", session.id, update.path());
            changed = true;
        }
    }
    if changed {
        session.version += 1;
    }
    changed
}
