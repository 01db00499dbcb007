use crate::message::{PollId, Session, Username};
use serde::{Deserialize, Serialize};

/// A targeted change to one field of a stored session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldUpdate {
    SetPollCompleted { poll_id: PollId, completed: bool },
    UnsetRegisteredUser { username: Username },
}

impl FieldUpdate {
    /// Dotted path of the field this update touches.
    pub fn path(&self) -> String {
        match self {
            FieldUpdate::SetPollCompleted { poll_id, .. } => format!("polls.{}.completed", poll_id),
            FieldUpdate::UnsetRegisteredUser { username } => {
                format!("registeredUsers.{}", username)
            }
        }
    }

    /// Applies the update in place. Returns false when the target does not exist.
    pub fn apply(&self, session: &mut Session) -> bool {
        match self {
            FieldUpdate::SetPollCompleted { poll_id, completed } => {
                if let Some(poll) = session.polls.get_mut(poll_id) {
                    poll.completed = *completed;
                    true
                } else {
                    false
                }
            }
            FieldUpdate::UnsetRegisteredUser { username } => {
                session.registered_users.remove(username).is_some()
            }
        }
    }
}

pub fn completion_updates(poll_ids: &[PollId]) -> Vec<FieldUpdate> {
    poll_ids
        .iter()
        .map(|poll_id| FieldUpdate::SetPollCompleted {
            poll_id: poll_id.clone(),
            completed: true,
        })
        .collect()
}
