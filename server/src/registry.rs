use poll_system::{ConnectionId, SessionId};
use std::collections::{HashMap, HashSet};

/// Which connections receive live updates of which sessions.
pub struct SubscriptionRegistry {
    subscribers: HashMap<SessionId, HashSet<ConnectionId>>,
    subscriptions: HashMap<ConnectionId, HashSet<SessionId>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: HashMap::new(),
            subscriptions: HashMap::new(),
        }
    }

    /// Returns false when the connection was already subscribed.
    pub fn subscribe(&mut self, connection_id: &ConnectionId, session_id: &SessionId) -> bool {
        self.subscriptions
            .entry(connection_id.clone())
            .or_insert_with(HashSet::new)
            .insert(session_id.clone());
        let inserted = self
            .subscribers
            .entry(session_id.clone())
            .or_insert_with(HashSet::new)
            .insert(connection_id.clone());
        if inserted {
            log::info!(
                "Connection {} subscribed to session {}",
                connection_id,
                session_id
            );
        }
        inserted
    }

    pub fn unsubscribe(&mut self, connection_id: &ConnectionId, session_id: &SessionId) -> bool {
        let removed = remove_and_prune(&mut self.subscribers, session_id, connection_id);
        remove_and_prune(&mut self.subscriptions, connection_id, session_id);
        if removed {
            log::info!(
                "Connection {} unsubscribed from session {}",
                connection_id,
                session_id
            );
        }
        removed
    }

    pub fn is_subscribed(&self, connection_id: &ConnectionId, session_id: &SessionId) -> bool {
        self.subscribers
            .get(session_id)
            .map_or(false, |connections| connections.contains(connection_id))
    }

    /// Subscribers of a session, sorted.
    pub fn subscribers(&self, session_id: &SessionId) -> Vec<ConnectionId> {
        let mut result = self
            .subscribers
            .get(session_id)
            .map(|connections| connections.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default();
        result.sort();
        result
    }

    /// Drops every subscription of the connection and returns the sessions it watched, sorted.
    pub fn remove_connection(&mut self, connection_id: &ConnectionId) -> Vec<SessionId> {
        let mut session_ids = self
            .subscriptions
            .remove(connection_id)
            .map(|sessions| sessions.into_iter().collect::<Vec<_>>())
            .unwrap_or_default();
        session_ids.sort();
        for session_id in &session_ids {
            remove_and_prune(&mut self.subscribers, session_id, connection_id);
        }
        session_ids
    }
}

fn remove_and_prune(
    map: &mut HashMap<String, HashSet<String>>,
    key: &String,
    value: &String,
) -> bool {
    let (removed, is_empty) = match map.get_mut(key) {
        Some(set) => (set.remove(value), set.is_empty()),
        None => (false, false),
    };
    if is_empty {
        map.remove(key);
    }
    removed
}
