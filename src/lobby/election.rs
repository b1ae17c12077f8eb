//! Manager election
//!
//! There is no vote: the manager is whoever was last assigned. A join fills a
//! vacancy, and every departure hands authority to the earliest remaining
//! arrival (or clears it when the lobby is empty).

use crate::lobby::members::MemberSet;
use crate::types::SessionId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerElection {
    manager: Option<SessionId>,
}

impl ManagerElection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&str> {
        self.manager.as_deref()
    }

    pub fn has_manager(&self) -> bool {
        self.manager.is_some()
    }

    pub fn is_manager(&self, session_id: &str) -> bool {
        self.manager.as_deref() == Some(session_id)
    }

    /// A manager is set and still connected
    pub fn is_valid(&self, members: &MemberSet) -> bool {
        self.manager
            .as_deref()
            .is_some_and(|id| members.contains(id))
    }

    /// Make `session_id` manager if nobody holds the role. Returns true when assigned.
    pub fn assign_if_vacant(&mut self, session_id: &str) -> bool {
        if self.manager.is_some() {
            return false;
        }
        self.manager = Some(session_id.to_string());
        true
    }

    /// Apply the departure rule. Returns true when the manager value changed.
    pub fn reassign_after_departure(&mut self, members: &MemberSet) -> bool {
        let next = members.first().map(|m| m.session_id.clone());
        if next == self.manager {
            return false;
        }
        self.manager = next;
        true
    }
}
