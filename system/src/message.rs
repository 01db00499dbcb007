use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use thiserror::Error;

pub type Username = String;
pub type PollId = String;
pub type SessionId = String;
pub type ConnectionId = String;
pub type CommandId = u16;

/// Root document of a voting session.
///
/// `registered_users` maps a username to the connection it is bound to. `None` means the
/// registration is not bound to a live connection; on the wire this is an empty string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    #[serde(with = "connection_bindings")]
    pub registered_users: HashMap<Username, Option<ConnectionId>>,
    pub polls: HashMap<PollId, Poll>,
    #[serde(default)]
    pub version: u64,
    /// Client fields the server does not interpret. Kept so a full replace never drops them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub votes: HashMap<Username, Value>,
    #[serde(default)]
    pub completed: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("session id must not be empty")]
    EmptySessionId,
    #[error("session id {0:?} may only contain ASCII letters, digits, '-' and '_'")]
    InvalidSessionId(SessionId),
    #[error("edit of session {0} claims an empty username")]
    EmptyClaim(SessionId),
    #[error("session {0} registers an empty username")]
    EmptyUsername(SessionId),
    #[error("session {0} contains a poll with an empty id")]
    EmptyPollId(SessionId),
    #[error("poll {0} contains a vote from an empty username")]
    EmptyVoter(PollId),
}

impl Session {
    pub fn new(id: impl Into<SessionId>) -> Self {
        Self {
            id: id.into(),
            registered_users: HashMap::new(),
            polls: HashMap::new(),
            version: 0,
            extra: Map::new(),
        }
    }

    /// Usernames whose registration currently points at `connection_id`, sorted.
    pub fn usernames_bound_to(&self, connection_id: &str) -> Vec<Username> {
        let mut usernames = self
            .registered_users
            .iter()
            .filter(|(_, bound)| bound.as_deref() == Some(connection_id))
            .map(|(username, _)| username.clone())
            .collect::<Vec<_>>();
        usernames.sort();
        usernames
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_session_id(&self.id)?;
        if self.registered_users.keys().any(|username| username.is_empty()) {
            return Err(ValidationError::EmptyUsername(self.id.clone()));
        }
        for (poll_id, poll) in &self.polls {
            if poll_id.is_empty() {
                return Err(ValidationError::EmptyPollId(self.id.clone()));
            }
            if poll.votes.keys().any(|username| username.is_empty()) {
                return Err(ValidationError::EmptyVoter(poll_id.clone()));
            }
        }
        Ok(())
    }
}

/// Session ids double as storage keys, so every store accepts the same set.
pub fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    if session_id.is_empty() {
        return Err(ValidationError::EmptySessionId);
    }
    let valid = session_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(ValidationError::InvalidSessionId(session_id.to_owned()))
    }
}

/// Empty strings and `null` both mean "unbound".
mod connection_bindings {
    use super::{ConnectionId, Username};
    use serde::ser::SerializeMap;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::collections::HashMap;

    pub fn serialize<S>(
        bindings: &HashMap<Username, Option<ConnectionId>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(bindings.len()))?;
        for (username, connection_id) in bindings {
            map.serialize_entry(username, connection_id.as_deref().unwrap_or(""))?;
        }
        map.end()
    }

    pub fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<HashMap<Username, Option<ConnectionId>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = HashMap::<Username, Option<ConnectionId>>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .map(|(username, connection_id)| {
                (username, connection_id.filter(|id| !id.is_empty()))
            })
            .collect())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifiableCommand {
    pub command_id: CommandId,
    pub command: ClientCommand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    WatchSession {
        session_id: SessionId,
    },
    UnwatchSession {
        session_id: SessionId,
    },
    /// `claim` names the username the caller owns. Without it the server falls back to binding
    /// every unbound registration to the caller.
    EditSession {
        session: Session,
        #[serde(default)]
        claim: Option<Username>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum IdentifiableEvent {
    ByMyself {
        command_id: CommandId,
        result: CommandResult,
    },
    BySystem {
        system_event: SystemEvent,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CommandResult {
    Ok(SystemEvent),
    Error(CommandError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemEvent {
    Connected {
        connection_id: ConnectionId,
    },
    Watching {
        session_id: SessionId,
        session: Option<Session>,
    },
    Unwatched {
        session_id: SessionId,
    },
    Edited {
        session_id: SessionId,
        version: u64,
    },
    SessionChanged {
        session: Session,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CommandError {
    #[error("invalid command: {reason}")]
    Invalid { reason: String },
    #[error("session was edited concurrently (expected version {expected}, stored {actual})")]
    VersionConflict { expected: u64, actual: u64 },
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
    #[error("not watching session {session_id}")]
    NotWatching { session_id: SessionId },
}

impl From<ValidationError> for CommandError {
    fn from(error: ValidationError) -> Self {
        CommandError::Invalid {
            reason: error.to_string(),
        }
    }
}
