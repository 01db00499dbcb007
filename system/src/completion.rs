use crate::message::{Poll, PollId, Session, Username};
use std::collections::{HashMap, HashSet};

/// Participants whose vote is required before a poll completes.
///
/// Every registered username counts, whether or not its registration is currently bound to a
/// connection. A participant stops counting only when its registration is removed.
pub fn active_usernames<T>(registered_users: &HashMap<Username, T>) -> HashSet<&Username> {
    registered_users.keys().collect()
}

/// A poll is complete once it has votes and every active participant is among the voters.
/// An empty participant set never completes a poll.
pub fn is_poll_complete(poll: &Poll, active: &HashSet<&Username>) -> bool {
    !poll.votes.is_empty()
        && !active.is_empty()
        && active
            .iter()
            .all(|username| poll.votes.contains_key(*username))
}

/// Marks every poll whose participants have all voted as completed.
///
/// Completed polls are left alone, even if a participant was added since. Returns the ids of the
/// polls completed by this call, sorted.
pub fn evaluate_polls(session: &mut Session) -> Vec<PollId> {
    let Session {
        registered_users,
        polls,
        ..
    } = &mut *session;
    let active = active_usernames(registered_users);

    let mut completed = polls
        .iter_mut()
        .filter(|(_, poll)| !poll.completed)
        .filter_map(|(poll_id, poll)| {
            if is_poll_complete(poll, &active) {
                poll.completed = true;
                Some(poll_id.clone())
            } else {
                None
            }
        })
        .collect::<Vec<_>>();
    completed.sort();

    if !completed.is_empty() {
        log::debug!("Session {} completed polls {:?}", session.id, completed);
    }
    completed
}
