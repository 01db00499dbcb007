use crate::store::StoreError;
use poll_system::{Session, SessionId};
use tokio::sync::oneshot::Sender;

/// Read-only requests from the HTTP handlers, answered by the server loop.
#[derive(Debug)]
pub enum QueryCommand {
    GetSession {
        session_id: SessionId,
        tx: Sender<Result<Option<Session>, StoreError>>,
    },
    ListSessions {
        tx: Sender<Result<Vec<SessionId>, StoreError>>,
    },
}
