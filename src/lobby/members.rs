//! Roster of the members connected to one lobby
//!
//! Members are keyed by session id. Arrival order is tracked separately so
//! manager hand-over always picks the earliest remaining arrival.

use crate::types::{Member, SessionId};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Default)]
pub struct MemberSet {
    members: HashMap<SessionId, Member>,
    arrival_order: VecDeque<SessionId>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a member; returns false (and changes nothing) if the session is already present
    pub fn insert(&mut self, member: Member) -> bool {
        if self.members.contains_key(&member.session_id) {
            return false;
        }
        self.arrival_order.push_back(member.session_id.clone());
        self.members.insert(member.session_id.clone(), member);
        true
    }

    pub fn remove(&mut self, session_id: &str) -> Option<Member> {
        let removed = self.members.remove(session_id)?;
        self.arrival_order.retain(|id| id != session_id);
        Some(removed)
    }

    pub fn get(&self, session_id: &str) -> Option<&Member> {
        self.members.get(session_id)
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.members.contains_key(session_id)
    }

    /// Earliest arrival still present
    pub fn first(&self) -> Option<&Member> {
        self.arrival_order
            .front()
            .and_then(|id| self.members.get(id))
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members in arrival order
    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.arrival_order
            .iter()
            .filter_map(|id| self.members.get(id))
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        self.arrival_order.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::JoinOptions;

    fn member(session_id: &str) -> Member {
        Member::new(
            session_id,
            &JoinOptions {
                id: format!("user-{}", session_id),
                name: session_id.to_uppercase(),
                login_token: None,
            },
        )
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut set = MemberSet::new();
        assert!(set.insert(member("s1")));
        assert!(set.insert(member("s2")));

        assert_eq!(set.len(), 2);
        assert!(set.contains("s1"));
        assert_eq!(set.get("s2").map(|m| m.name.as_str()), Some("S2"));
        assert!(set.get("s3").is_none());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut set = MemberSet::new();
        assert!(set.insert(member("s1")));
        assert!(!set.insert(member("s1")));
        assert_eq!(set.len(), 1);
        assert_eq!(set.session_ids(), vec!["s1"]);
    }

    #[test]
    fn test_first_follows_arrival_order() {
        let mut set = MemberSet::new();
        for id in ["s3", "s1", "s2"] {
            set.insert(member(id));
        }
        assert_eq!(set.first().map(|m| m.session_id.as_str()), Some("s3"));

        set.remove("s3");
        assert_eq!(set.first().map(|m| m.session_id.as_str()), Some("s1"));

        let order: Vec<_> = set.iter().map(|m| m.session_id.clone()).collect();
        assert_eq!(order, vec!["s1", "s2"]);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let mut set = MemberSet::new();
        set.insert(member("s1"));
        assert!(set.remove("nope").is_none());
        assert!(set.remove("s1").is_some());
        assert!(set.remove("s1").is_none());
        assert!(set.is_empty());
        assert!(set.first().is_none());
    }
}
