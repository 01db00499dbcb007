use super::{apply_updates, next_version, Store, StoreError};
use async_trait::async_trait;
use poll_system::{serde_json, validate_session_id, FieldUpdate, Session, SessionId};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const EXTENSION: &str = ".session.json";

/// Keeps one JSON file per session in a directory.
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn file_path(&self, session_id: &SessionId) -> Result<PathBuf, StoreError> {
        validate_session_id(session_id)
            .map_err(|_| StoreError::InvalidKey(session_id.clone()))?;
        Ok(self.dir.join(format!("{}{}", session_id, EXTENSION)))
    }

    async fn read(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        let path = self.file_path(session_id)?;
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    session_id: session_id.clone(),
                    source,
                }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn write(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.file_path(&session.id)?;
        let content = serde_json::to_vec_pretty(session).map_err(|source| StoreError::Corrupt {
            session_id: session.id.clone(),
            source,
        })?;
        // rename is atomic, readers never see a half-written file
        let tmp_path = path.with_extension("tmp");
        fs::write(&tmp_path, content).await?;
        fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn find_one(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        self.read(session_id).await
    }

    async fn upsert(
        &mut self,
        mut session: Session,
        expected_version: Option<u64>,
    ) -> Result<Session, StoreError> {
        let stored = self.read(&session.id).await?;
        session.version = next_version(&session.id, stored.as_ref(), expected_version)?;
        self.write(&session).await?;
        Ok(session)
    }

    async fn update(
        &mut self,
        session_id: &SessionId,
        updates: &[FieldUpdate],
    ) -> Result<Option<Session>, StoreError> {
        match self.read(session_id).await? {
            Some(mut session) => {
                if apply_updates(&mut session, updates) {
                    self.write(&session).await?;
                }
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    async fn session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut result = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if let Ok(file_name) = entry.file_name().into_string() {
                if let Some(session_id) = file_name.strip_suffix(EXTENSION) {
                    result.push(session_id.to_owned());
                }
            }
        }
        result.sort();
        Ok(result)
    }
}
