//! Membership manager — admission and lifecycle for group members
//!
//! Combines the criteria validator with the roster: a candidate is
//! evaluated against the group's joining criteria, then admitted into the
//! roster under the max-members bound. Criteria freeze when formation
//! closes; membership mutations emit journal events.

use groupbid_types::{
    CandidateProject, EventEnvelope, GroupError, GroupEvent, GroupId, GroupJournal,
    GroupResult, JoinAssessment, JoinOutcome, JoiningCriterion, MemberRecord, MemberRoster,
    ProjectId,
};
use tracing::{debug, info, warn};

/// Manages membership lifecycle for one group
pub struct MembershipManager {
    /// The roster (source of truth for "who's in")
    roster: MemberRoster,
    /// Joining criteria; immutable once frozen
    criteria: Vec<JoiningCriterion>,
    /// Set when the group leaves `forming`
    frozen: bool,
}

impl MembershipManager {
    /// Create a new membership manager
    pub fn new(group_id: GroupId, max_members: u32, criteria: Vec<JoiningCriterion>) -> Self {
        Self {
            roster: MemberRoster::new(group_id, max_members),
            criteria,
            frozen: false,
        }
    }

    /// Evaluate a candidate without admitting it. Advisory failures are
    /// reported but do not block.
    pub fn evaluate_join(&self, candidate: &CandidateProject) -> JoinAssessment {
        JoinAssessment::evaluate(&self.criteria, candidate)
    }

    /// Admit a candidate: required criteria must all pass, the bound must
    /// hold, and repeated joins for the same project are no-ops.
    pub fn join(
        &mut self,
        candidate: &CandidateProject,
        founding: bool,
        admin: bool,
        journal: &mut GroupJournal,
    ) -> GroupResult<JoinOutcome> {
        let assessment = self.evaluate_join(candidate);
        if !assessment.admitted {
            let name = assessment
                .first_failed
                .unwrap_or_else(|| "unknown".to_string());
            return Err(GroupError::CriterionFailed(name));
        }
        if !assessment.advisory_failures.is_empty() {
            debug!(
                project = %candidate.project_id,
                advisory = ?assessment.advisory_failures,
                "Candidate admitted with advisory criterion failures"
            );
        }

        let record = MemberRecord::new(candidate.project_id.clone(), candidate.owner.clone())
            .with_founding(founding)
            .with_admin(admin);
        let outcome = self.roster.join(record)?;

        if outcome == JoinOutcome::Admitted {
            info!(
                group = %self.roster.group_id,
                project = %candidate.project_id,
                members = self.roster.active_member_count(),
                "Member joined group"
            );
            journal.log(
                EventEnvelope::new(GroupEvent::MemberJoined {
                    group_id: self.roster.group_id.clone(),
                    project_id: candidate.project_id.clone(),
                })
                .with_actor(candidate.owner.to_string()),
            );
        }

        Ok(outcome)
    }

    /// Voluntary departure
    pub fn leave(&mut self, project_id: &ProjectId, journal: &mut GroupJournal) -> GroupResult<()> {
        self.roster.leave(project_id)?;

        info!(group = %self.roster.group_id, project = %project_id, "Member left group");

        journal.log(EventEnvelope::new(GroupEvent::MemberLeft {
            group_id: self.roster.group_id.clone(),
            project_id: project_id.clone(),
        }));
        Ok(())
    }

    /// Admin removal (permanent; the project cannot rejoin)
    pub fn remove(
        &mut self,
        project_id: &ProjectId,
        reason: &str,
        journal: &mut GroupJournal,
    ) -> GroupResult<()> {
        self.roster.remove(project_id)?;

        warn!(
            group = %self.roster.group_id,
            project = %project_id,
            reason = reason,
            "Member removed from group"
        );

        journal.log(EventEnvelope::new(GroupEvent::MemberRemoved {
            group_id: self.roster.group_id.clone(),
            project_id: project_id.clone(),
            reason: reason.to_string(),
        }));
        Ok(())
    }

    /// Add a criterion; rejected once criteria are frozen
    pub fn add_criterion(&mut self, criterion: JoiningCriterion) -> GroupResult<()> {
        if self.frozen {
            return Err(GroupError::CriteriaFrozen);
        }
        self.criteria.push(criterion);
        Ok(())
    }

    /// Freeze criteria (called when formation closes)
    pub fn freeze_criteria(&mut self) {
        self.frozen = true;
    }

    /// Whether criteria are frozen
    pub fn criteria_frozen(&self) -> bool {
        self.frozen
    }

    /// Record a member's individual savings at settlement
    pub fn record_savings(&mut self, project_id: &ProjectId, savings_minor: u64) {
        if let Some(member) = self.roster.get_mut(project_id) {
            member.savings_minor = Some(savings_minor);
        }
    }

    // --- Query methods (delegate to roster) ---

    pub fn roster(&self) -> &MemberRoster {
        &self.roster
    }

    pub fn criteria(&self) -> &[JoiningCriterion] {
        &self.criteria
    }

    pub fn is_active_member(&self, project_id: &ProjectId) -> bool {
        self.roster.is_active_member(project_id)
    }

    pub fn get_member(&self, project_id: &ProjectId) -> Option<&MemberRecord> {
        self.roster.get(project_id)
    }

    pub fn active_member_count(&self) -> u32 {
        self.roster.active_member_count()
    }

    pub fn active_project_ids(&self) -> Vec<ProjectId> {
        self.roster.active_project_ids()
    }

    pub fn is_full(&self) -> bool {
        self.roster.is_full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupbid_types::{CriterionPredicate, UserId};

    fn setup() -> (MembershipManager, GroupJournal) {
        let id = GroupId::new("group-1");
        let criteria = vec![JoiningCriterion::required(
            "roof-size",
            CriterionPredicate::NumericRange {
                attribute: "roof_area_sqm".into(),
                min: Some(50.0),
                max: Some(400.0),
            },
        )];
        (
            MembershipManager::new(id.clone(), 5, criteria),
            GroupJournal::new(id),
        )
    }

    fn make_candidate(id: &str, area: f64) -> CandidateProject {
        CandidateProject::new(ProjectId::new(id), UserId::new(format!("owner-{}", id)))
            .with_number("roof_area_sqm", area)
    }

    #[test]
    fn test_join_with_passing_criteria() {
        let (mut mgr, mut journal) = setup();
        let outcome = mgr
            .join(&make_candidate("p1", 120.0), false, false, &mut journal)
            .unwrap();
        assert_eq!(outcome, JoinOutcome::Admitted);
        assert_eq!(mgr.active_member_count(), 1);
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_join_rejected_on_required_criterion() {
        let (mut mgr, mut journal) = setup();
        let result = mgr.join(&make_candidate("p1", 20.0), false, false, &mut journal);
        assert!(matches!(result, Err(GroupError::CriterionFailed(name)) if name == "roof-size"));
        assert_eq!(mgr.active_member_count(), 0);
        assert!(journal.is_empty());
    }

    #[test]
    fn test_repeated_join_logs_once() {
        let (mut mgr, mut journal) = setup();
        let candidate = make_candidate("p1", 120.0);
        mgr.join(&candidate, false, false, &mut journal).unwrap();
        let outcome = mgr.join(&candidate, false, false, &mut journal).unwrap();
        assert_eq!(outcome, JoinOutcome::AlreadyMember);
        assert_eq!(journal.len(), 1);
    }

    #[test]
    fn test_criteria_freeze() {
        let (mut mgr, _journal) = setup();
        mgr.freeze_criteria();
        let result = mgr.add_criterion(JoiningCriterion::advisory(
            "late",
            CriterionPredicate::Boolean {
                attribute: "x".into(),
                expected: true,
            },
        ));
        assert!(matches!(result, Err(GroupError::CriteriaFrozen)));
    }

    #[test]
    fn test_leave_and_remove() {
        let (mut mgr, mut journal) = setup();
        mgr.join(&make_candidate("p1", 120.0), false, false, &mut journal)
            .unwrap();
        mgr.join(&make_candidate("p2", 130.0), false, false, &mut journal)
            .unwrap();

        mgr.leave(&ProjectId::new("p1"), &mut journal).unwrap();
        assert_eq!(mgr.active_member_count(), 1);

        mgr.remove(&ProjectId::new("p2"), "spam", &mut journal)
            .unwrap();
        assert_eq!(mgr.active_member_count(), 0);
        assert_eq!(journal.len(), 4); // 2 joins, 1 leave, 1 remove
    }

    #[test]
    fn test_record_savings() {
        let (mut mgr, mut journal) = setup();
        mgr.join(&make_candidate("p1", 120.0), false, false, &mut journal)
            .unwrap();
        mgr.record_savings(&ProjectId::new("p1"), 36_000);
        assert_eq!(
            mgr.get_member(&ProjectId::new("p1")).unwrap().savings_minor,
            Some(36_000)
        );
    }
}
