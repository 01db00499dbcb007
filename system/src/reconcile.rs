use crate::message::{ConnectionId, Session, Username};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    /// The username was unbound and is now bound to the caller.
    Bound,
    /// The username was bound to another connection.
    Rebound { previous: ConnectionId },
    /// The username was not registered yet.
    Registered,
    Unchanged,
}

/// Binds every unbound registration to `caller`.
///
/// Only sound while at most one registration is unbound at a time: concurrent unbound
/// registrations all end up bound to the same caller. Prefer [`claim_registration`] when the
/// client tells us which username it owns.
pub fn reconcile_connections(session: &mut Session, caller: &ConnectionId) -> Vec<Username> {
    let mut rebound = Vec::new();
    for (username, connection_id) in session.registered_users.iter_mut() {
        if connection_id.is_none() {
            *connection_id = Some(caller.clone());
            rebound.push(username.clone());
        }
    }
    rebound.sort();

    for username in &rebound {
        log::info!(
            "Session {}: bound unbound user {} to connection {}",
            session.id,
            username,
            caller
        );
    }
    rebound
}

/// Binds exactly `username` to `caller`, registering it when absent.
pub fn claim_registration(session: &mut Session, username: &Username, caller: &ConnectionId) -> Claim {
    let claim = match session
        .registered_users
        .insert(username.clone(), Some(caller.clone()))
    {
        None => Claim::Registered,
        Some(None) => Claim::Bound,
        Some(Some(previous)) if previous == *caller => Claim::Unchanged,
        Some(Some(previous)) => Claim::Rebound { previous },
    };
    if claim != Claim::Unchanged {
        log::info!(
            "Session {}: user {} claimed by connection {} ({:?})",
            session.id,
            username,
            caller,
            claim
        );
    }
    claim
}

/// Repairs the registrations of an incoming edit before completion is evaluated.
pub fn reconcile_edit(session: &mut Session, caller: &ConnectionId, claim: Option<&Username>) {
    match claim {
        Some(username) => {
            claim_registration(session, username, caller);
        }
        None => {
            reconcile_connections(session, caller);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(users: &[(&str, Option<&str>)]) -> Session {
        let mut session = Session::new("s1");
        for (username, connection_id) in users {
            session
                .registered_users
                .insert(username.to_string(), connection_id.map(String::from));
        }
        session
    }

    #[test]
    fn it_binds_unbound_users_to_the_caller() {
        let mut s = session(&[("alice", None), ("bob", Some("c2"))]);
        let rebound = reconcile_connections(&mut s, &"c9".to_owned());
        assert_eq!(rebound, vec!["alice"]);
        assert_eq!(s.registered_users["alice"].as_deref(), Some("c9"));
        assert_eq!(s.registered_users["bob"].as_deref(), Some("c2"));
    }

    #[test]
    fn it_is_a_no_op_when_everyone_is_bound() {
        let mut s = session(&[("alice", Some("c1")), ("bob", Some("c2"))]);
        let before = s.clone();
        assert!(reconcile_connections(&mut s, &"c9".to_owned()).is_empty());
        assert_eq!(s, before);
    }

    #[test]
    fn it_binds_all_unbound_users_to_the_same_caller() {
        let mut s = session(&[("alice", None), ("bob", None)]);
        reconcile_connections(&mut s, &"c9".to_owned());
        assert_eq!(s.usernames_bound_to("c9"), vec!["alice", "bob"]);
    }

    #[test]
    fn it_binds_only_the_claimed_user() {
        let mut s = session(&[("alice", None), ("bob", None)]);
        reconcile_edit(&mut s, &"c9".to_owned(), Some(&"bob".to_owned()));
        assert_eq!(s.registered_users["alice"], None);
        assert_eq!(s.registered_users["bob"].as_deref(), Some("c9"));
    }

    #[test]
    fn it_reports_what_a_claim_changed() {
        let mut s = session(&[("alice", None), ("bob", Some("c2"))]);
        let caller = "c9".to_owned();
        assert_eq!(claim_registration(&mut s, &"alice".into(), &caller), Claim::Bound);
        assert_eq!(
            claim_registration(&mut s, &"bob".into(), &caller),
            Claim::Rebound {
                previous: "c2".into()
            }
        );
        assert_eq!(claim_registration(&mut s, &"carol".into(), &caller), Claim::Registered);
        assert_eq!(claim_registration(&mut s, &"carol".into(), &caller), Claim::Unchanged);
        assert_eq!(s.usernames_bound_to("c9"), vec!["alice", "bob", "carol"]);
    }
}
