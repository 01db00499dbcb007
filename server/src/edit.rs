use crate::store::{Store, StoreError};
use poll_system::{
    evaluate_polls, reconcile_edit, CommandError, ConnectionId, Session, Username,
    ValidationError,
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EditError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<EditError> for CommandError {
    fn from(error: EditError) -> Self {
        match error {
            EditError::Invalid(error) => error.into(),
            EditError::Store(error) => error.into(),
        }
    }
}

/// Merges a client-submitted document into the store.
///
/// Registrations are repaired before completion is evaluated, so a participant who just
/// reconnected is judged with its new binding. The document is written only if the stored version
/// still matches the one the client edited.
pub async fn submit_edit<S>(
    store: &mut S,
    caller: &ConnectionId,
    mut session: Session,
    claim: Option<&Username>,
) -> Result<Session, EditError>
where
    S: Store + ?Sized,
{
    session.validate()?;
    if claim.map_or(false, |username| username.is_empty()) {
        return Err(ValidationError::EmptyClaim(session.id).into());
    }

    reconcile_edit(&mut session, caller, claim);
    evaluate_polls(&mut session);

    let expected_version = session.version;
    let stored = store.upsert(session, Some(expected_version)).await?;
    log::info!(
        "Session {} edited by connection {} (version {})",
        stored.id,
        caller,
        stored.version
    );
    Ok(stored)
}
