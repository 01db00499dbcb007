use super::{apply_updates, next_version, Store, StoreError};
use async_trait::async_trait;
use poll_system::{FieldUpdate, Session, SessionId};
use std::collections::HashMap;

pub struct MemoryStore {
    sessions: HashMap<SessionId, Session>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_one(&self, session_id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get(session_id).cloned())
    }

    async fn upsert(
        &mut self,
        mut session: Session,
        expected_version: Option<u64>,
    ) -> Result<Session, StoreError> {
        session.version = next_version(
            &session.id,
            self.sessions.get(&session.id),
            expected_version,
        )?;
        self.sessions.insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn update(
        &mut self,
        session_id: &SessionId,
        updates: &[FieldUpdate],
    ) -> Result<Option<Session>, StoreError> {
        Ok(self.sessions.get_mut(session_id).map(|session| {
            apply_updates(session, updates);
            session.clone()
        }))
    }

    async fn session_ids(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut ids = self.sessions.keys().cloned().collect::<Vec<_>>();
        ids.sort();
        Ok(ids)
    }
}
