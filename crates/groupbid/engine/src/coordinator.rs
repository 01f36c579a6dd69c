//! Group coordinator — the aggregate root for one group
//!
//! Composes the membership manager, the bid book, and the journal, and
//! enforces the group's lifecycle status across every operation. The
//! service layer holds exactly one coordinator per group behind an async
//! mutex; everything here is synchronous and single-writer.

use crate::acceptance_engine::{
    AcceptTicket, CompensationRequest, ConfirmOutcome, FailOutcome, RevokeOutcome,
};
use crate::bid_book::BidBook;
use crate::membership_manager::MembershipManager;
use chrono::{DateTime, Duration, Utc};
use groupbid_types::{
    AcceptanceId, CandidateProject, EventEnvelope, Group, GroupBidId, GroupError, GroupEvent,
    GroupJournal, GroupResult, GroupSpec, GroupStatus, FormationPolicy, JoinAssessment,
    JoinOutcome, JoiningCriterion, MemberRecord, PendingPaymentRef, ProjectId, UserId,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Quorum progress for the query surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuorumProgress {
    pub bid_id: GroupBidId,
    pub confirmed: u32,
    pub required: u32,
    pub deadline: DateTime<Utc>,
}

/// Read-only snapshot of a group for the query surface
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupSnapshot {
    pub group: Group,
    pub member_count: u32,
    pub members: Vec<MemberRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_bid_id: Option<GroupBidId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_bid_id: Option<GroupBidId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quorum: Option<QuorumProgress>,
}

/// What a sweep pass did to this group
#[derive(Debug, Default)]
pub struct SweepReport {
    /// Reversals the service must request
    pub compensations: Vec<CompensationRequest>,
    /// A bid that expired below quorum
    pub expired_bid: Option<GroupBidId>,
    /// Formation auto-closed (deadline reached with min met)
    pub formation_closed: bool,
    /// Group dissolved (formation timeout)
    pub dissolved: bool,
    /// Group expired (bid deadline passed with no accepted bid)
    pub group_expired: bool,
}

impl SweepReport {
    /// Whether the sweep changed anything
    pub fn is_noop(&self) -> bool {
        self.compensations.is_empty()
            && self.expired_bid.is_none()
            && !self.formation_closed
            && !self.dissolved
            && !self.group_expired
    }
}

/// The coordinator for a single group aggregate
pub struct GroupCoordinator {
    group: Group,
    membership: MembershipManager,
    bids: BidBook,
    journal: GroupJournal,
}

impl GroupCoordinator {
    /// Create a new group from a spec and its joining criteria
    pub fn new(spec: GroupSpec, criteria: Vec<JoiningCriterion>) -> GroupResult<Self> {
        spec.validate()?;
        let group = Group::new(spec);
        let id = group.id.clone();

        info!(group = %id, name = %group.spec.name, "Group created");

        let mut journal = GroupJournal::new(id.clone());
        journal.log(
            EventEnvelope::new(GroupEvent::GroupCreated {
                group_id: id.clone(),
            })
            .with_actor(group.spec.created_by.to_string()),
        );

        Ok(Self {
            membership: MembershipManager::new(id.clone(), group.spec.max_members, criteria),
            bids: BidBook::new(id),
            group,
            journal,
        })
    }

    // =========================================================================
    // IDENTITY & STATUS
    // =========================================================================

    pub fn id(&self) -> &groupbid_types::GroupId {
        &self.group.id
    }

    pub fn group(&self) -> &Group {
        &self.group
    }

    pub fn status(&self) -> GroupStatus {
        self.group.status
    }

    pub fn journal(&self) -> &GroupJournal {
        &self.journal
    }

    pub fn membership(&self) -> &MembershipManager {
        &self.membership
    }

    pub fn bids(&self) -> &BidBook {
        &self.bids
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    /// Evaluate a candidate without admitting it
    pub fn evaluate_join(&self, candidate: &CandidateProject) -> JoinAssessment {
        self.membership.evaluate_join(candidate)
    }

    /// Admit a candidate while the group is forming. The first admitted
    /// project is the founding member; the effective admin's own project
    /// joins with the admin flag. Reaching `max_members` auto-closes
    /// formation.
    pub fn join(&mut self, candidate: &CandidateProject) -> GroupResult<JoinOutcome> {
        if !self.group.status.is_open_for_join() {
            return Err(GroupError::GroupNotOpenForJoin(self.group.status));
        }

        let founding = self.membership.roster().total_members() == 0;
        let admin = candidate.owner == *self.group.spec.effective_admin();
        let outcome = self
            .membership
            .join(candidate, founding, admin, &mut self.journal)?;

        if self.membership.is_full() {
            // Bound reached; formation closes on its own
            self.close_formation()?;
        }

        Ok(outcome)
    }

    /// Voluntary departure. A live acceptance on the open bid is revoked
    /// first so no payment is left dangling.
    pub fn leave(&mut self, project_id: &ProjectId) -> GroupResult<Vec<CompensationRequest>> {
        self.ensure_membership_mutable()?;

        let mut compensations = Vec::new();
        if self.has_live_acceptance(project_id) {
            let outcome = self.bids.revoke(project_id, &mut self.journal)?;
            compensations.extend(outcome.compensation);
        }

        self.membership.leave(project_id, &mut self.journal)?;
        Ok(compensations)
    }

    /// Admin removal of a member, with the same acceptance cleanup
    pub fn remove_member(
        &mut self,
        project_id: &ProjectId,
        reason: &str,
    ) -> GroupResult<Vec<CompensationRequest>> {
        self.ensure_membership_mutable()?;

        let mut compensations = Vec::new();
        if self.has_live_acceptance(project_id) {
            let outcome = self.bids.revoke(project_id, &mut self.journal)?;
            compensations.extend(outcome.compensation);
        }

        self.membership.remove(project_id, reason, &mut self.journal)?;
        Ok(compensations)
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Close formation: `forming → formed`, criteria freeze
    pub fn close_formation(&mut self) -> GroupResult<()> {
        if self.group.status != GroupStatus::Forming {
            return Err(GroupError::InvalidTransition {
                from: self.group.status,
                to: GroupStatus::Formed,
            });
        }

        let current = self.membership.active_member_count();
        let min = self.group.spec.min_members;
        if current < min {
            return Err(GroupError::InsufficientMembers { current, min });
        }

        self.group.transition(GroupStatus::Formed)?;
        self.membership.freeze_criteria();

        info!(group = %self.group.id, members = current, "Formation closed");

        self.journal.log(EventEnvelope::new(GroupEvent::FormationClosed {
            group_id: self.group.id.clone(),
            member_count: current,
        }));

        Ok(())
    }

    /// Dissolve the group. Terminal; the open bid is withdrawn and every
    /// live acceptance cancelled or refunded via the returned
    /// compensations.
    pub fn dissolve(&mut self, reason: &str) -> GroupResult<Vec<CompensationRequest>> {
        self.group.transition(GroupStatus::Dissolved)?;

        let compensations = self.bids.withdraw_open(&mut self.journal);

        warn!(group = %self.group.id, reason = reason, "Group dissolved");

        self.journal.log(EventEnvelope::new(GroupEvent::GroupDissolved {
            group_id: self.group.id.clone(),
            reason: reason.to_string(),
        }));

        Ok(compensations)
    }

    // =========================================================================
    // BIDS
    // =========================================================================

    /// Submit a contractor's offer. Allowed only while the group is
    /// formed/bidding and before the group's bid deadline.
    pub fn submit_bid(
        &mut self,
        offer: groupbid_types::BidOffer,
        now: DateTime<Utc>,
    ) -> GroupResult<(GroupBidId, Vec<CompensationRequest>)> {
        if !self.group.status.is_biddable() || now >= self.group.spec.bid_deadline {
            return Err(GroupError::GroupNotBiddable(self.group.status));
        }

        let active = self.membership.active_project_ids();
        let result = self.bids.submit(
            offer,
            &active,
            now,
            self.group.spec.acceptance_deadline,
            &mut self.journal,
        )?;

        if self.group.status == GroupStatus::Formed {
            self.group.transition(GroupStatus::Bidding)?;
        }

        Ok(result)
    }

    /// Explicitly invalidate the open bid (group decision) so a new
    /// contractor's offer can open
    pub fn invalidate_open_bid(
        &mut self,
        reason: &str,
    ) -> GroupResult<(GroupBidId, Vec<CompensationRequest>)> {
        self.bids.invalidate_open(reason, &mut self.journal)
    }

    /// Extend the open bid's acceptance deadline, bounded by the group's
    /// own acceptance deadline if one is set
    pub fn extend_deadline(
        &mut self,
        bid_id: &GroupBidId,
        new_deadline: DateTime<Utc>,
        reason: &str,
        actor: UserId,
    ) -> GroupResult<()> {
        self.bids.extend_deadline(
            bid_id,
            new_deadline,
            reason,
            actor,
            self.group.spec.acceptance_deadline,
            &mut self.journal,
        )
    }

    // =========================================================================
    // ACCEPTANCE PROTOCOL
    // =========================================================================

    /// Start an acceptance for an active member against the open bid
    pub fn accept(
        &mut self,
        project_id: &ProjectId,
        now: DateTime<Utc>,
    ) -> GroupResult<AcceptTicket> {
        let member = self
            .membership
            .get_member(project_id)
            .ok_or_else(|| GroupError::MemberNotFound(project_id.clone()))?;
        if !member.is_active() {
            return Err(GroupError::MemberNotActive(project_id.clone()));
        }

        self.bids.accept(project_id, now, &mut self.journal)
    }

    /// Record an initiated payment attempt
    pub fn record_payment_attempt(
        &mut self,
        bid_id: &GroupBidId,
        acceptance_id: &AcceptanceId,
        payment_ref: PendingPaymentRef,
    ) -> GroupResult<()> {
        self.bids
            .record_payment_attempt(bid_id, acceptance_id, payment_ref)
    }

    /// Apply a payment confirmation. On quorum the group settles: the bid
    /// becomes the group's accepted bid and each confirmed member's
    /// individual savings is recorded from the bid's savings percentage.
    pub fn payment_confirmed(
        &mut self,
        bid_id: &GroupBidId,
        acceptance_id: &AcceptanceId,
        now: DateTime<Utc>,
    ) -> GroupResult<ConfirmOutcome> {
        let active_members = self.membership.active_member_count();
        let outcome =
            self.bids
                .apply_confirmation(bid_id, acceptance_id, active_members, now, &mut self.journal)?;

        if let ConfirmOutcome::QuorumReached { .. } = &outcome {
            self.settle(bid_id)?;
        }

        Ok(outcome)
    }

    /// Apply a payment failure
    pub fn payment_failed(
        &mut self,
        bid_id: &GroupBidId,
        acceptance_id: &AcceptanceId,
        reason: &str,
        retryable: bool,
        max_attempts: u32,
    ) -> GroupResult<FailOutcome> {
        self.bids.apply_failure(
            bid_id,
            acceptance_id,
            reason,
            retryable,
            max_attempts,
            &mut self.journal,
        )
    }

    /// Revoke a member's acceptance on the open bid
    pub fn revoke_acceptance(&mut self, project_id: &ProjectId) -> GroupResult<RevokeOutcome> {
        if !self.membership.is_active_member(project_id) {
            return Err(GroupError::MemberNotActive(project_id.clone()));
        }
        self.bids.revoke(project_id, &mut self.journal)
    }

    // =========================================================================
    // SWEEP
    // =========================================================================

    /// One sweep pass over this group's deadlines. The sweeper calls this
    /// periodically; every deadline is also re-validated synchronously at
    /// point of use, so a missed pass only delays transitions.
    pub fn sweep(
        &mut self,
        now: DateTime<Utc>,
        grace_secs: u64,
        payment_window_secs: u64,
    ) -> GroupResult<SweepReport> {
        let mut report = SweepReport::default();
        let grace = Duration::seconds(grace_secs as i64);

        match self.group.status {
            GroupStatus::Forming => {
                if now >= self.group.spec.formation_deadline + grace {
                    let enough = self.membership.active_member_count()
                        >= self.group.spec.min_members;
                    let close = matches!(
                        self.group.spec.formation_policy,
                        FormationPolicy::AutoClose
                    ) && enough;

                    if close {
                        self.close_formation()?;
                        report.formation_closed = true;
                    } else {
                        report.compensations =
                            self.dissolve("formation deadline passed")?;
                        report.dissolved = true;
                    }
                }
            }
            GroupStatus::Formed | GroupStatus::Bidding => {
                let active_members = self.membership.active_member_count();
                if let Some((bid_id, comps)) = self.bids.expire_open_if_due(
                    now,
                    grace_secs,
                    active_members,
                    &mut self.journal,
                ) {
                    report.expired_bid = Some(bid_id);
                    report.compensations.extend(comps);
                }

                report.compensations.extend(self.bids.fail_overdue_payments(
                    now,
                    payment_window_secs,
                    &mut self.journal,
                ));

                // No accepted bid by the group's bid deadline: the group
                // itself expires
                if now >= self.group.spec.bid_deadline + grace
                    && self.bids.accepted_bid_id().is_none()
                {
                    report
                        .compensations
                        .extend(self.bids.withdraw_open(&mut self.journal));
                    self.group.transition(GroupStatus::Expired)?;

                    warn!(group = %self.group.id, "Group expired without an accepted bid");

                    self.journal.log(EventEnvelope::new(GroupEvent::GroupExpired {
                        group_id: self.group.id.clone(),
                    }));
                    report.group_expired = true;
                }
            }
            GroupStatus::Settled => {
                // Stray pendings on the accepted bid still time out
                report.compensations.extend(self.bids.fail_overdue_payments(
                    now,
                    payment_window_secs,
                    &mut self.journal,
                ));
            }
            GroupStatus::Dissolved | GroupStatus::Expired => {}
        }

        Ok(report)
    }

    // =========================================================================
    // QUERY
    // =========================================================================

    /// Snapshot for the query surface
    pub fn snapshot(&self) -> GroupSnapshot {
        let quorum = self.bids.open_bid().map(|bid| QuorumProgress {
            bid_id: bid.id.clone(),
            confirmed: bid.current_acceptance_count,
            required: bid.required_acceptances(self.membership.active_member_count()),
            deadline: bid.acceptance_deadline,
        });

        GroupSnapshot {
            group: self.group.clone(),
            member_count: self.membership.active_member_count(),
            members: self
                .membership
                .roster()
                .members
                .values()
                .cloned()
                .collect(),
            open_bid_id: self.bids.open_bid_id().cloned(),
            accepted_bid_id: self.bids.accepted_bid_id().cloned(),
            quorum,
        }
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    /// Quorum reached: mark the group settled and record each confirmed
    /// member's savings
    fn settle(&mut self, bid_id: &GroupBidId) -> GroupResult<()> {
        self.group.transition(GroupStatus::Settled)?;
        self.group.accepted_bid = Some(bid_id.clone());

        if let Some(bid) = self.bids.get(bid_id) {
            let savings: Vec<(ProjectId, u64)> = bid
                .confirmed_acceptances()
                .iter()
                .map(|a| {
                    let saved =
                        (a.amount_minor as f64 * bid.savings_pct / 100.0).round() as u64;
                    (a.project_id.clone(), saved)
                })
                .collect();
            for (project_id, saved) in savings {
                self.membership.record_savings(&project_id, saved);
            }
        }

        info!(group = %self.group.id, bid = %bid_id, "Group settled");

        self.journal.log(EventEnvelope::new(GroupEvent::GroupSettled {
            group_id: self.group.id.clone(),
            bid_id: bid_id.clone(),
        }));

        Ok(())
    }

    fn ensure_membership_mutable(&self) -> GroupResult<()> {
        if self.group.status.is_terminal() {
            return Err(GroupError::MembershipFrozen(self.group.status));
        }
        Ok(())
    }

    fn has_live_acceptance(&self, project_id: &ProjectId) -> bool {
        self.bids
            .open_bid()
            .and_then(|bid| bid.acceptance_for(project_id))
            .map(|a| a.status.is_live())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use groupbid_types::{BidOffer, ContractorId, GeoScope, ProjectSpecific};

    fn make_spec(min: u32, max: u32) -> GroupSpec {
        let now = Utc::now();
        GroupSpec::new(
            "Elm Street Solar",
            "solar",
            GeoScope::Region("Greater Boston".into()),
            min,
            max,
            now + Duration::days(7),
            now + Duration::days(30),
            UserId::new("creator-1"),
        )
    }

    fn make_coordinator(min: u32, max: u32) -> GroupCoordinator {
        GroupCoordinator::new(make_spec(min, max), vec![]).unwrap()
    }

    fn make_candidate(id: &str) -> CandidateProject {
        CandidateProject::new(ProjectId::new(id), UserId::new(format!("owner-{}", id)))
    }

    fn make_offer(projects: &[ProjectId], pct: f64, count: u32) -> BidOffer {
        BidOffer {
            contractor: ContractorId::new("c1"),
            group_price_minor: 2_000_000,
            per_member_price_minor: 500_000,
            savings_pct: 15.0,
            required_acceptance_count: count,
            required_acceptance_pct: pct,
            acceptance_deadline: Utc::now() + Duration::days(3),
            final_offer: false,
            items: vec![],
            specifics: projects
                .iter()
                .map(|p| ProjectSpecific::new(p.clone(), 480_000, "panels + install"))
                .collect(),
        }
    }

    fn join_n(coordinator: &mut GroupCoordinator, n: u32) -> Vec<ProjectId> {
        (1..=n)
            .map(|i| {
                let candidate = make_candidate(&format!("p{}", i));
                coordinator.join(&candidate).unwrap();
                candidate.project_id
            })
            .collect()
    }

    fn accept_and_confirm(coordinator: &mut GroupCoordinator, project: &ProjectId) -> ConfirmOutcome {
        let ticket = coordinator.accept(project, Utc::now()).unwrap();
        coordinator
            .record_payment_attempt(
                &ticket.bid_id,
                &ticket.acceptance_id,
                PendingPaymentRef::generate(),
            )
            .unwrap();
        coordinator
            .payment_confirmed(&ticket.bid_id, &ticket.acceptance_id, Utc::now())
            .unwrap()
    }

    #[test]
    fn test_scenario_a_close_formation() {
        // min=3, max=10; 3 projects join; closeFormation succeeds
        let mut coordinator = make_coordinator(3, 10);
        join_n(&mut coordinator, 3);

        coordinator.close_formation().unwrap();
        assert_eq!(coordinator.status(), GroupStatus::Formed);
        assert!(coordinator.membership().criteria_frozen());
    }

    #[test]
    fn test_close_formation_insufficient() {
        let mut coordinator = make_coordinator(3, 10);
        join_n(&mut coordinator, 2);

        let result = coordinator.close_formation();
        assert!(matches!(
            result,
            Err(GroupError::InsufficientMembers { current: 2, min: 3 })
        ));
        assert_eq!(coordinator.status(), GroupStatus::Forming);
    }

    #[test]
    fn test_join_auto_closes_at_max() {
        let mut coordinator = make_coordinator(2, 3);
        join_n(&mut coordinator, 3);
        assert_eq!(coordinator.status(), GroupStatus::Formed);

        let result = coordinator.join(&make_candidate("p4"));
        assert!(matches!(result, Err(GroupError::GroupNotOpenForJoin(_))));
    }

    #[test]
    fn test_first_member_is_founding() {
        let mut coordinator = make_coordinator(2, 5);
        join_n(&mut coordinator, 2);
        let roster = coordinator.membership().roster();
        assert!(roster.get(&ProjectId::new("p1")).unwrap().founding);
        assert!(!roster.get(&ProjectId::new("p2")).unwrap().founding);
    }

    #[test]
    fn test_scenario_b_quorum_then_late_accept() {
        // 50% over 4 members requires 2 confirmations
        let mut coordinator = make_coordinator(3, 10);
        let projects = join_n(&mut coordinator, 4);
        coordinator.close_formation().unwrap();
        coordinator
            .submit_bid(make_offer(&projects, 50.0, 0), Utc::now())
            .unwrap();
        assert_eq!(coordinator.status(), GroupStatus::Bidding);

        let outcome = accept_and_confirm(&mut coordinator, &projects[0]);
        assert!(matches!(
            outcome,
            ConfirmOutcome::Confirmed {
                confirmed: 1,
                required: 2
            }
        ));

        let outcome = accept_and_confirm(&mut coordinator, &projects[1]);
        assert!(matches!(outcome, ConfirmOutcome::QuorumReached { .. }));
        assert_eq!(coordinator.status(), GroupStatus::Settled);
        assert!(coordinator.group().accepted_bid.is_some());

        // Third member's subsequent accept attempt is rejected
        let result = coordinator.accept(&projects[2], Utc::now());
        assert!(matches!(result, Err(GroupError::BidAlreadyAccepted(_))));
    }

    #[test]
    fn test_savings_recorded_at_settlement() {
        let mut coordinator = make_coordinator(2, 4);
        let projects = join_n(&mut coordinator, 2);
        coordinator.close_formation().unwrap();
        coordinator
            .submit_bid(make_offer(&projects, 100.0, 0), Utc::now())
            .unwrap();

        accept_and_confirm(&mut coordinator, &projects[0]);
        accept_and_confirm(&mut coordinator, &projects[1]);

        // 15% of 480_000
        let member = coordinator.membership().get_member(&projects[0]).unwrap();
        assert_eq!(member.savings_minor, Some(72_000));
        // Non-accepting members carry no savings and no obligation
    }

    #[test]
    fn test_scenario_c_sweep_expires_bid_and_refunds() {
        let mut coordinator = make_coordinator(2, 4);
        let projects = join_n(&mut coordinator, 4);
        coordinator.close_formation().unwrap();
        let (bid_id, _) = coordinator
            .submit_bid(make_offer(&projects, 0.0, 2), Utc::now())
            .unwrap();

        // 1 of 2 required confirmed
        accept_and_confirm(&mut coordinator, &projects[0]);

        // Force the deadline past and sweep
        coordinator.bids.bids.get_mut(&bid_id).unwrap().acceptance_deadline =
            Utc::now() - Duration::hours(1);
        let report = coordinator.sweep(Utc::now(), 0, 3600).unwrap();

        assert_eq!(report.expired_bid, Some(bid_id));
        assert_eq!(report.compensations.len(), 1);
        // Group returns to bidding; a new bid may be submitted
        assert_eq!(coordinator.status(), GroupStatus::Bidding);
        assert!(coordinator
            .submit_bid(make_offer(&projects, 0.0, 2), Utc::now())
            .is_ok());
    }

    #[test]
    fn test_scenario_d_extension_defers_expiry() {
        let mut coordinator = make_coordinator(2, 4);
        let projects = join_n(&mut coordinator, 3);
        coordinator.close_formation().unwrap();
        let (bid_id, _) = coordinator
            .submit_bid(make_offer(&projects, 0.0, 2), Utc::now())
            .unwrap();

        let old_deadline = Utc::now() + Duration::seconds(1);
        coordinator.bids.bids.get_mut(&bid_id).unwrap().acceptance_deadline = old_deadline;

        coordinator
            .extend_deadline(
                &bid_id,
                old_deadline + Duration::hours(48),
                "weather delay",
                UserId::new("creator-1"),
            )
            .unwrap();

        // Sweep just after the old deadline: bid survives
        let report = coordinator
            .sweep(old_deadline + Duration::minutes(5), 0, 3600)
            .unwrap();
        assert!(report.expired_bid.is_none());
        assert!(coordinator.bids().open_bid().is_some());
    }

    #[test]
    fn test_formation_timeout_auto_close() {
        let mut coordinator = make_coordinator(2, 10);
        join_n(&mut coordinator, 2);

        let past_deadline = coordinator.group().spec.formation_deadline + Duration::hours(1);
        let report = coordinator.sweep(past_deadline, 0, 3600).unwrap();

        assert!(report.formation_closed);
        assert_eq!(coordinator.status(), GroupStatus::Formed);
    }

    #[test]
    fn test_formation_timeout_dissolves_below_min() {
        let mut coordinator = make_coordinator(3, 10);
        join_n(&mut coordinator, 1);

        let past_deadline = coordinator.group().spec.formation_deadline + Duration::hours(1);
        let report = coordinator.sweep(past_deadline, 0, 3600).unwrap();

        assert!(report.dissolved);
        assert_eq!(coordinator.status(), GroupStatus::Dissolved);
    }

    #[test]
    fn test_group_expires_past_bid_deadline() {
        let mut coordinator = make_coordinator(2, 4);
        join_n(&mut coordinator, 2);
        coordinator.close_formation().unwrap();

        let past = coordinator.group().spec.bid_deadline + Duration::hours(1);
        let report = coordinator.sweep(past, 0, 3600).unwrap();

        assert!(report.group_expired);
        assert_eq!(coordinator.status(), GroupStatus::Expired);
    }

    #[test]
    fn test_dissolve_cascades() {
        let mut coordinator = make_coordinator(2, 4);
        let projects = join_n(&mut coordinator, 3);
        coordinator.close_formation().unwrap();
        let (bid_id, _) = coordinator
            .submit_bid(make_offer(&projects, 0.0, 3), Utc::now())
            .unwrap();

        accept_and_confirm(&mut coordinator, &projects[0]);

        let compensations = coordinator.dissolve("organizer withdrew").unwrap();
        assert_eq!(compensations.len(), 1); // the confirmed acceptance refunds
        assert_eq!(coordinator.status(), GroupStatus::Dissolved);
        assert_eq!(
            coordinator.bids().get(&bid_id).unwrap().status,
            groupbid_types::GroupBidStatus::Withdrawn
        );

        // Nothing works on a dissolved group
        assert!(coordinator.join(&make_candidate("p9")).is_err());
        assert!(coordinator
            .submit_bid(make_offer(&projects, 0.0, 1), Utc::now())
            .is_err());
    }

    #[test]
    fn test_leave_revokes_live_acceptance() {
        let mut coordinator = make_coordinator(2, 4);
        let projects = join_n(&mut coordinator, 3);
        coordinator.close_formation().unwrap();
        coordinator
            .submit_bid(make_offer(&projects, 0.0, 3), Utc::now())
            .unwrap();

        accept_and_confirm(&mut coordinator, &projects[0]);
        let compensations = coordinator.leave(&projects[0]).unwrap();

        assert_eq!(compensations.len(), 1);
        assert!(!coordinator.membership().is_active_member(&projects[0]));
        assert_eq!(
            coordinator.bids().open_bid().unwrap().current_acceptance_count,
            0
        );
    }

    #[test]
    fn test_non_member_cannot_accept() {
        let mut coordinator = make_coordinator(2, 4);
        let projects = join_n(&mut coordinator, 2);
        coordinator.close_formation().unwrap();
        coordinator
            .submit_bid(make_offer(&projects, 0.0, 2), Utc::now())
            .unwrap();

        let result = coordinator.accept(&ProjectId::new("outsider"), Utc::now());
        assert!(matches!(result, Err(GroupError::MemberNotFound(_))));
    }

    #[test]
    fn test_submit_after_bid_deadline_rejected() {
        let mut coordinator = make_coordinator(2, 4);
        let projects = join_n(&mut coordinator, 2);
        coordinator.close_formation().unwrap();

        let late = coordinator.group().spec.bid_deadline + Duration::hours(1);
        let result = coordinator.submit_bid(make_offer(&projects, 0.0, 2), late);
        assert!(matches!(result, Err(GroupError::GroupNotBiddable(_))));
    }

    #[test]
    fn test_snapshot_quorum_progress() {
        let mut coordinator = make_coordinator(2, 4);
        let projects = join_n(&mut coordinator, 4);
        coordinator.close_formation().unwrap();
        coordinator
            .submit_bid(make_offer(&projects, 50.0, 0), Utc::now())
            .unwrap();
        accept_and_confirm(&mut coordinator, &projects[0]);

        let snapshot = coordinator.snapshot();
        let quorum = snapshot.quorum.unwrap();
        assert_eq!(quorum.confirmed, 1);
        assert_eq!(quorum.required, 2);
        assert_eq!(snapshot.member_count, 4);
    }
}
