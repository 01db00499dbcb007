use crate::store::{Store, StoreError};
use poll_system::{
    completion_updates, evaluate_polls, ConnectionId, FieldUpdate, PollId, Session, SessionId,
    Username,
};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Active,
    Closed,
}

#[derive(Debug, PartialEq)]
pub enum CloseOutcome {
    AlreadyClosed,
    SessionMissing,
    Reconciled {
        removed: Vec<Username>,
        completed: Vec<PollId>,
        session: Session,
    },
}

impl CloseOutcome {
    /// The stored document, when closing changed it.
    pub fn changed_session(&self) -> Option<&Session> {
        match self {
            CloseOutcome::Reconciled {
                removed,
                completed,
                session,
            } if !removed.is_empty() || !completed.is_empty() => Some(session),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
#[error("reconciling session {session_id} after connection {connection_id} closed: {source}")]
pub struct WatchError {
    pub session_id: SessionId,
    pub connection_id: ConnectionId,
    #[source]
    pub source: StoreError,
}

/// One connection watching one session.
///
/// Closing removes the registrations bound to the connection and completes the polls that were
/// only waiting on them. This happens at most once; a failed close still leaves the watcher closed.
#[derive(Debug)]
pub struct SessionWatcher {
    session_id: SessionId,
    connection_id: ConnectionId,
    state: WatcherState,
}

impl SessionWatcher {
    pub fn new(session_id: SessionId, connection_id: ConnectionId) -> Self {
        Self {
            session_id,
            connection_id,
            state: WatcherState::Active,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub async fn close<S>(&mut self, store: &mut S) -> Result<CloseOutcome, WatchError>
    where
        S: Store + ?Sized,
    {
        if self.state == WatcherState::Closed {
            return Ok(CloseOutcome::AlreadyClosed);
        }
        self.state = WatcherState::Closed;

        self.reconcile(store).await.map_err(|source| WatchError {
            session_id: self.session_id.clone(),
            connection_id: self.connection_id.clone(),
            source,
        })
    }

    async fn reconcile<S>(&self, store: &mut S) -> Result<CloseOutcome, StoreError>
    where
        S: Store + ?Sized,
    {
        let session = match store.find_one(&self.session_id).await? {
            Some(session) => session,
            None => return Ok(CloseOutcome::SessionMissing),
        };

        let removed = session.usernames_bound_to(&self.connection_id);
        let unset = removed
            .iter()
            .map(|username| FieldUpdate::UnsetRegisteredUser {
                username: username.clone(),
            })
            .collect::<Vec<_>>();
        if !unset.is_empty() {
            log::info!(
                "Connection {} left session {}, removing {:?}",
                self.connection_id,
                self.session_id,
                removed
            );
            store.update(&self.session_id, &unset).await?;
        }

        let mut session = match store.find_one(&self.session_id).await? {
            Some(session) => session,
            None => return Ok(CloseOutcome::SessionMissing),
        };
        let completed = evaluate_polls(&mut session);
        if !completed.is_empty() {
            if let Some(updated) = store
                .update(&self.session_id, &completion_updates(&completed))
                .await?
            {
                session = updated;
            }
        }

        Ok(CloseOutcome::Reconciled {
            removed,
            completed,
            session,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use poll_system::serde_json::json;
    use poll_system::Poll;

    async fn store_with(session: Session) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.upsert(session, None).await.expect("");
        store
    }

    fn alice_voted_bob_did_not() -> Session {
        let mut session = Session::new("s1");
        session
            .registered_users
            .insert("alice".into(), Some("c1".into()));
        session
            .registered_users
            .insert("bob".into(), Some("c2".into()));
        let mut poll = Poll::default();
        poll.votes.insert("alice".into(), json!("yes"));
        session.polls.insert("p1".into(), poll);
        session
    }

    #[tokio::test]
    async fn it_completes_polls_when_the_last_holdout_leaves() {
        let mut store = store_with(alice_voted_bob_did_not()).await;
        let mut watcher = SessionWatcher::new("s1".into(), "c2".into());

        let outcome = watcher.close(&mut store).await.expect("");
        let session = match &outcome {
            CloseOutcome::Reconciled {
                removed,
                completed,
                session,
            } => {
                assert_eq!(removed, &vec!["bob".to_owned()]);
                assert_eq!(completed, &vec!["p1".to_owned()]);
                session.clone()
            }
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(outcome.changed_session(), Some(&session));
        assert!(!session.registered_users.contains_key("bob"));
        assert!(session.polls["p1"].completed);
        assert_eq!(session.version, 3);

        let stored = store.find_one(&"s1".to_owned()).await.expect("");
        assert_eq!(stored, Some(session));
    }

    #[tokio::test]
    async fn it_closes_exactly_once() {
        let mut store = store_with(alice_voted_bob_did_not()).await;
        let mut watcher = SessionWatcher::new("s1".into(), "c2".into());

        watcher.close(&mut store).await.expect("");
        assert_eq!(watcher.state(), WatcherState::Closed);
        assert_eq!(
            watcher.close(&mut store).await.expect(""),
            CloseOutcome::AlreadyClosed
        );
    }

    #[tokio::test]
    async fn it_keeps_polls_open_while_voters_are_missing() {
        let mut store = store_with(alice_voted_bob_did_not()).await;
        let mut watcher = SessionWatcher::new("s1".into(), "c1".into());

        let outcome = watcher.close(&mut store).await.expect("");
        match outcome {
            CloseOutcome::Reconciled {
                removed,
                completed,
                session,
            } => {
                assert_eq!(removed, vec!["alice".to_owned()]);
                assert!(completed.is_empty());
                assert!(!session.polls["p1"].completed);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn it_reports_sessions_that_are_gone() {
        let mut store = MemoryStore::new();
        let mut watcher = SessionWatcher::new("s1".into(), "c1".into());
        assert_eq!(
            watcher.close(&mut store).await.expect(""),
            CloseOutcome::SessionMissing
        );
        assert_eq!(watcher.state(), WatcherState::Closed);
    }

    #[tokio::test]
    async fn it_leaves_untouched_sessions_unchanged() {
        let mut store = store_with(alice_voted_bob_did_not()).await;
        let mut watcher = SessionWatcher::new("s1".into(), "c7".into());
        let outcome = watcher.close(&mut store).await.expect("");
        assert_eq!(outcome.changed_session(), None);
        assert_eq!(
            store
                .find_one(&"s1".to_owned())
                .await
                .expect("")
                .map(|s| s.version),
            Some(1)
        );
    }

    #[tokio::test]
    async fn it_stays_closed_when_the_store_fails() {
        let dir = tempfile::tempdir().expect("");
        let mut store = FileStore::new(dir.path());
        store.upsert(alice_voted_bob_did_not(), None).await.expect("");
        std::fs::write(dir.path().join("s1.session.json"), "{ not json").expect("");

        let mut watcher = SessionWatcher::new("s1".into(), "c2".into());
        match watcher.close(&mut store).await {
            Err(WatchError {
                session_id,
                connection_id,
                source: StoreError::Corrupt { .. },
            }) => assert_eq!((session_id.as_str(), connection_id.as_str()), ("s1", "c2")),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(watcher.state(), WatcherState::Closed);
        assert_eq!(
            watcher.close(&mut store).await.expect(""),
            CloseOutcome::AlreadyClosed
        );
    }
}
