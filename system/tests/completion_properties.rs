use poll_system::serde_json::json;
use poll_system::{
    evaluate_polls, reconcile_connections, Claim, FieldUpdate, Poll, Session,
};
use proptest::collection::{btree_map, btree_set};
use proptest::prelude::*;

const NAMES: &[&str] = &["alice", "bob", "carol", "dave", "erin"];

fn arb_session() -> impl Strategy<Value = Session> {
    let users = btree_map(
        proptest::sample::select(NAMES),
        proptest::option::of("c[0-9]"),
        0..NAMES.len(),
    );
    let polls = btree_map(
        "p[0-9]",
        (btree_set(proptest::sample::select(NAMES), 0..NAMES.len()), any::<bool>()),
        0..4,
    );
    (users, polls).prop_map(|(users, polls)| {
        let mut session = Session::new("s1");
        for (username, connection_id) in users {
            session
                .registered_users
                .insert(username.to_owned(), connection_id);
        }
        for (poll_id, (voters, completed)) in polls {
            let mut poll = Poll::default();
            poll.completed = completed;
            for voter in voters {
                poll.votes.insert(voter.to_owned(), json!("yes"));
            }
            session.polls.insert(poll_id, poll);
        }
        session
    })
}

proptest! {
    #[test]
    fn evaluation_is_idempotent(session in arb_session()) {
        let mut once = session.clone();
        evaluate_polls(&mut once);
        let mut twice = once.clone();
        prop_assert!(evaluate_polls(&mut twice).is_empty());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn evaluation_never_reopens(session in arb_session()) {
        let mut evaluated = session.clone();
        evaluate_polls(&mut evaluated);
        for (poll_id, poll) in &session.polls {
            if poll.completed {
                prop_assert!(evaluated.polls[poll_id].completed);
            }
        }
    }

    #[test]
    fn open_polls_complete_iff_every_participant_voted(session in arb_session()) {
        let mut evaluated = session.clone();
        evaluate_polls(&mut evaluated);
        for (poll_id, poll) in &session.polls {
            if poll.completed || poll.votes.is_empty() || session.registered_users.is_empty() {
                continue;
            }
            let everyone_voted = session
                .registered_users
                .keys()
                .all(|username| poll.votes.contains_key(username));
            prop_assert_eq!(evaluated.polls[poll_id].completed, everyone_voted);
        }
    }

    #[test]
    fn reconciling_a_fully_bound_session_changes_nothing(session in arb_session()) {
        let mut bound = session.clone();
        bound.registered_users.retain(|_, connection_id| connection_id.is_some());
        let before = bound.clone();
        prop_assert!(reconcile_connections(&mut bound, &"c9".to_owned()).is_empty());
        prop_assert_eq!(before, bound);
    }
}

fn two_users_one_vote() -> Session {
    let mut session = Session::new("s1");
    session.registered_users.insert("alice".into(), Some("c1".into()));
    session.registered_users.insert("bob".into(), Some("c2".into()));
    let mut poll = Poll::default();
    poll.votes.insert("alice".into(), json!("yes"));
    session.polls.insert("p1".into(), poll);
    session
}

#[test]
fn it_waits_for_the_participant_who_has_not_voted() {
    let mut session = two_users_one_vote();
    evaluate_polls(&mut session);
    assert!(!session.polls["p1"].completed);
}

#[test]
fn it_completes_once_the_missing_voter_leaves() {
    let mut session = two_users_one_vote();
    for username in session.usernames_bound_to("c2") {
        FieldUpdate::UnsetRegisteredUser { username }.apply(&mut session);
    }
    assert_eq!(evaluate_polls(&mut session), vec!["p1"]);
    assert!(session.polls["p1"].completed);
    assert!(!session.registered_users.contains_key("bob"));
}

#[test]
fn it_binds_a_reconnected_user_to_the_editor() {
    let mut session: Session = poll_system::serde_json::from_value(json!({
        "id": "s1",
        "registeredUsers": { "alice": "" },
        "polls": {},
    }))
    .expect("");
    reconcile_connections(&mut session, &"c9".to_owned());
    assert_eq!(session.registered_users["alice"].as_deref(), Some("c9"));
}

#[test]
fn it_keeps_polls_without_votes_open() {
    let mut session = two_users_one_vote();
    session.polls.insert("p2".into(), Poll::default());
    session.registered_users.clear();
    evaluate_polls(&mut session);
    assert!(!session.polls["p2"].completed);

    session.registered_users.insert("alice".into(), None);
    evaluate_polls(&mut session);
    assert!(!session.polls["p2"].completed);
}

#[test]
fn it_registers_a_claimed_user() {
    let mut session = Session::new("s1");
    let claim = poll_system::claim_registration(&mut session, &"alice".into(), &"c1".into());
    assert_eq!(claim, Claim::Registered);
    assert_eq!(session.usernames_bound_to("c1"), vec!["alice"]);
}
