//! Member roster: who belongs to a group
//!
//! The roster tracks all member records, enforces the max-members bound,
//! and keeps join idempotent per project. It is the source of truth for
//! "who's in" — it does not make admission decisions (criteria do).

use crate::errors::{GroupError, GroupResult};
use crate::ids::{GroupId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Status of a member within a group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// Member is active and eligible to accept bids
    #[default]
    Active,
    /// Member left voluntarily
    Left,
    /// Member was removed by the group admin
    Removed,
}

/// A record for a single member (one candidate project) of a group
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberRecord {
    /// The project bound to this membership
    pub project_id: ProjectId,
    /// The owning homeowner
    pub owner: UserId,
    /// Current membership status
    pub status: MemberStatus,
    /// Whether this member administers the group
    pub admin: bool,
    /// Whether this member was present at group creation
    pub founding: bool,
    /// Whether the member is visible to other members
    pub visible: bool,
    /// Individual savings in minor units, populated at settlement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub savings_minor: Option<u64>,
    /// When the member joined
    pub joined_at: DateTime<Utc>,
}

impl MemberRecord {
    pub fn new(project_id: ProjectId, owner: UserId) -> Self {
        Self {
            project_id,
            owner,
            status: MemberStatus::Active,
            admin: false,
            founding: false,
            visible: true,
            savings_minor: None,
            joined_at: Utc::now(),
        }
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn with_founding(mut self, founding: bool) -> Self {
        self.founding = founding;
        self
    }

    pub fn with_visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    /// Check if the member is currently active
    pub fn is_active(&self) -> bool {
        matches!(self.status, MemberStatus::Active)
    }
}

/// Outcome of a join call — distinguishes a fresh admission from the
/// idempotent repeat of an earlier one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The project was admitted as a new member
    Admitted,
    /// The project already holds an active membership; no change
    AlreadyMember,
}

/// The member roster for a group
///
/// Enforces the bound invariant: the number of active members never
/// exceeds `max_members`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemberRoster {
    /// The group this roster belongs to
    pub group_id: GroupId,
    /// Maximum active members allowed
    pub max_members: u32,
    /// All member records, keyed by project
    pub members: HashMap<ProjectId, MemberRecord>,
}

impl MemberRoster {
    /// Create a new empty roster
    pub fn new(group_id: GroupId, max_members: u32) -> Self {
        Self {
            group_id,
            max_members,
            members: HashMap::new(),
        }
    }

    /// Admit a project, idempotently. A project with an active membership
    /// is a no-op; a project that previously left is reactivated. The
    /// max-members bound is checked before any insertion.
    pub fn join(&mut self, record: MemberRecord) -> GroupResult<JoinOutcome> {
        let active_count = self.active_member_count();
        if let Some(existing) = self.members.get_mut(&record.project_id) {
            match existing.status {
                MemberStatus::Active => return Ok(JoinOutcome::AlreadyMember),
                MemberStatus::Removed => {
                    return Err(GroupError::MemberNotActive(record.project_id.clone()))
                }
                MemberStatus::Left => {
                    if active_count >= self.max_members {
                        return Err(GroupError::GroupFull {
                            max: self.max_members,
                        });
                    }
                    existing.status = MemberStatus::Active;
                    existing.joined_at = Utc::now();
                    return Ok(JoinOutcome::Admitted);
                }
            }
        }

        if self.active_member_count() >= self.max_members {
            return Err(GroupError::GroupFull {
                max: self.max_members,
            });
        }
        self.members.insert(record.project_id.clone(), record);
        Ok(JoinOutcome::Admitted)
    }

    /// Mark a member as having left voluntarily
    pub fn leave(&mut self, project_id: &ProjectId) -> GroupResult<()> {
        let member = self
            .members
            .get_mut(project_id)
            .ok_or_else(|| GroupError::MemberNotFound(project_id.clone()))?;
        if !member.is_active() {
            return Err(GroupError::MemberNotActive(project_id.clone()));
        }
        member.status = MemberStatus::Left;
        Ok(())
    }

    /// Remove a member (admin action, not reversible by rejoin)
    pub fn remove(&mut self, project_id: &ProjectId) -> GroupResult<()> {
        let member = self
            .members
            .get_mut(project_id)
            .ok_or_else(|| GroupError::MemberNotFound(project_id.clone()))?;
        if !member.is_active() {
            return Err(GroupError::MemberNotActive(project_id.clone()));
        }
        member.status = MemberStatus::Removed;
        Ok(())
    }

    /// Get a member record
    pub fn get(&self, project_id: &ProjectId) -> Option<&MemberRecord> {
        self.members.get(project_id)
    }

    /// Get a mutable member record
    pub fn get_mut(&mut self, project_id: &ProjectId) -> Option<&mut MemberRecord> {
        self.members.get_mut(project_id)
    }

    /// Check if a project holds an active membership
    pub fn is_active_member(&self, project_id: &ProjectId) -> bool {
        self.members
            .get(project_id)
            .map(|m| m.is_active())
            .unwrap_or(false)
    }

    /// All active members
    pub fn active_members(&self) -> Vec<&MemberRecord> {
        self.members.values().filter(|m| m.is_active()).collect()
    }

    /// Project IDs of all active members
    pub fn active_project_ids(&self) -> Vec<ProjectId> {
        self.members
            .values()
            .filter(|m| m.is_active())
            .map(|m| m.project_id.clone())
            .collect()
    }

    /// Number of active members
    pub fn active_member_count(&self) -> u32 {
        self.members.values().filter(|m| m.is_active()).count() as u32
    }

    /// Total records, any status
    pub fn total_members(&self) -> usize {
        self.members.len()
    }

    /// Whether the roster has reached the max bound
    pub fn is_full(&self) -> bool {
        self.active_member_count() >= self.max_members
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_roster(max: u32) -> MemberRoster {
        MemberRoster::new(GroupId::new("group-1"), max)
    }

    fn make_member(id: &str) -> MemberRecord {
        MemberRecord::new(ProjectId::new(id), UserId::new(format!("owner-{}", id)))
    }

    #[test]
    fn test_join_and_query() {
        let mut roster = make_roster(5);
        let outcome = roster.join(make_member("p1")).unwrap();
        assert_eq!(outcome, JoinOutcome::Admitted);
        assert!(roster.is_active_member(&ProjectId::new("p1")));
        assert_eq!(roster.active_member_count(), 1);
    }

    #[test]
    fn test_join_is_idempotent() {
        let mut roster = make_roster(5);
        roster.join(make_member("p1")).unwrap();
        let outcome = roster.join(make_member("p1")).unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyMember);
        assert_eq!(roster.total_members(), 1);
    }

    #[test]
    fn test_bound_enforced() {
        let mut roster = make_roster(2);
        roster.join(make_member("p1")).unwrap();
        roster.join(make_member("p2")).unwrap();

        let result = roster.join(make_member("p3"));
        assert!(matches!(result, Err(GroupError::GroupFull { max: 2 })));
        assert_eq!(roster.active_member_count(), 2);
    }

    #[test]
    fn test_leave_frees_a_slot() {
        let mut roster = make_roster(2);
        roster.join(make_member("p1")).unwrap();
        roster.join(make_member("p2")).unwrap();
        roster.leave(&ProjectId::new("p1")).unwrap();

        assert_eq!(roster.active_member_count(), 1);
        roster.join(make_member("p3")).unwrap();
        assert_eq!(roster.active_member_count(), 2);
    }

    #[test]
    fn test_rejoin_after_leave() {
        let mut roster = make_roster(5);
        roster.join(make_member("p1")).unwrap();
        roster.leave(&ProjectId::new("p1")).unwrap();

        let outcome = roster.join(make_member("p1")).unwrap();
        assert_eq!(outcome, JoinOutcome::Admitted);
        assert!(roster.is_active_member(&ProjectId::new("p1")));
    }

    #[test]
    fn test_removed_member_cannot_rejoin() {
        let mut roster = make_roster(5);
        roster.join(make_member("p1")).unwrap();
        roster.remove(&ProjectId::new("p1")).unwrap();

        let result = roster.join(make_member("p1"));
        assert!(matches!(result, Err(GroupError::MemberNotActive(_))));
    }

    #[test]
    fn test_leave_unknown_member() {
        let mut roster = make_roster(5);
        let result = roster.leave(&ProjectId::new("ghost"));
        assert!(matches!(result, Err(GroupError::MemberNotFound(_))));
    }
}
