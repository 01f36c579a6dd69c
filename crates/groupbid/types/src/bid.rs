//! Group bids: one contractor's offer to an entire group
//!
//! A bid carries group-level pricing, the quorum requirement, and one
//! ProjectSpecific per member so every homeowner sees their own concrete
//! price and scope before being asked to accept. Acceptances live on the
//! bid; `current_acceptance_count` is maintained alongside them and is
//! always the number of confirmed acceptances.

use crate::acceptance::{Acceptance, AcceptanceStatus};
use crate::errors::{GroupError, GroupResult};
use crate::ids::{AcceptanceId, ContractorId, GroupBidId, GroupId, ProjectId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A line item on a group bid
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BidItem {
    /// What the line covers
    pub description: String,
    /// Line amount in minor units
    pub amount_minor: u64,
}

/// Per-project variance layered on a group bid
///
/// Exists at most once per (bid, member) pair; submission rejects offers
/// that do not cover every current member.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProjectSpecific {
    /// The member's project
    pub project_id: ProjectId,
    /// This member's concrete price in minor units
    pub price_minor: u64,
    /// Scope description for this project
    pub scope: String,
    /// Expected duration for this project, if quoted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline_days: Option<u32>,
}

impl ProjectSpecific {
    pub fn new(project_id: ProjectId, price_minor: u64, scope: impl Into<String>) -> Self {
        Self {
            project_id,
            price_minor,
            scope: scope.into(),
            timeline_days: None,
        }
    }

    pub fn with_timeline_days(mut self, days: u32) -> Self {
        self.timeline_days = Some(days);
        self
    }
}

/// A contractor's offer as submitted, before it becomes a tracked bid
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BidOffer {
    /// The submitting contractor
    pub contractor: ContractorId,
    /// Collective price for the whole group, minor units
    pub group_price_minor: u64,
    /// Baseline per-member price, minor units
    pub per_member_price_minor: u64,
    /// Claimed savings over individual pricing, percent
    pub savings_pct: f64,
    /// Absolute quorum requirement
    pub required_acceptance_count: u32,
    /// Percentage quorum requirement over current members (0–100)
    pub required_acceptance_pct: f64,
    /// Deadline for collecting acceptances
    pub acceptance_deadline: DateTime<Utc>,
    /// Whether this is the contractor's final offer
    #[serde(default)]
    pub final_offer: bool,
    /// Line items
    #[serde(default)]
    pub items: Vec<BidItem>,
    /// Per-member specifics; must cover every active member
    pub specifics: Vec<ProjectSpecific>,
}

/// Status of a group bid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupBidStatus {
    /// Submitted, open for acceptance, no confirmations yet
    #[default]
    Submitted,
    /// Open for acceptance with at least one confirmation
    Active,
    /// Quorum reached; the bid is binding
    Accepted,
    /// Deadline passed below quorum
    Expired,
    /// Withdrawn (invalidation or dissolution cascade)
    Withdrawn,
    /// Replaced by a newer offer from the same contractor
    Superseded,
}

impl GroupBidStatus {
    /// Whether members may still accept
    pub fn is_open(&self) -> bool {
        matches!(self, GroupBidStatus::Submitted | GroupBidStatus::Active)
    }

    /// Whether the bid has reached a final state
    pub fn is_terminal(&self) -> bool {
        !self.is_open()
    }
}

/// Audit record of a deadline push on a bid. Append-only; the only
/// sanctioned mechanism to move `acceptance_deadline` forward.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeadlineExtension {
    /// Unique extension identifier
    pub extension_id: String,
    /// The extended bid
    pub bid_id: GroupBidId,
    /// Deadline before the extension
    pub previous_deadline: DateTime<Utc>,
    /// Deadline after the extension
    pub new_deadline: DateTime<Utc>,
    /// Why the deadline moved
    pub reason: String,
    /// Who authorized the extension
    pub actor: UserId,
    /// When the extension was recorded
    pub extended_at: DateTime<Utc>,
}

impl DeadlineExtension {
    pub fn new(
        bid_id: GroupBidId,
        previous_deadline: DateTime<Utc>,
        new_deadline: DateTime<Utc>,
        reason: impl Into<String>,
        actor: UserId,
    ) -> Self {
        Self {
            extension_id: uuid::Uuid::new_v4().to_string(),
            bid_id,
            previous_deadline,
            new_deadline,
            reason: reason.into(),
            actor,
            extended_at: Utc::now(),
        }
    }
}

/// One contractor's offer to an entire formed group
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupBid {
    /// Unique bid identity
    pub id: GroupBidId,
    /// The group this bid targets
    pub group_id: GroupId,
    /// The submitting contractor
    pub contractor: ContractorId,
    /// Current status
    pub status: GroupBidStatus,
    /// Collective price, minor units
    pub group_price_minor: u64,
    /// Baseline per-member price, minor units
    pub per_member_price_minor: u64,
    /// Claimed savings percent
    pub savings_pct: f64,
    /// Absolute quorum requirement
    pub required_acceptance_count: u32,
    /// Percentage quorum requirement over current members (0–100)
    pub required_acceptance_pct: f64,
    /// Confirmed acceptances; maintained only through acceptance
    /// transitions, never set directly
    pub current_acceptance_count: u32,
    /// Deadline for collecting acceptances (moved only via extensions)
    pub acceptance_deadline: DateTime<Utc>,
    /// Whether this is the contractor's final offer
    pub final_offer: bool,
    /// Line items
    pub items: Vec<BidItem>,
    /// Per-member specifics, keyed by project
    pub specifics: HashMap<ProjectId, ProjectSpecific>,
    /// All acceptances against this bid, keyed by project
    pub acceptances: HashMap<ProjectId, Acceptance>,
    /// When the bid was submitted
    pub submitted_at: DateTime<Utc>,
    /// When the bid reached a terminal state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl GroupBid {
    /// Build a tracked bid from a submitted offer
    pub fn from_offer(group_id: GroupId, offer: BidOffer) -> Self {
        let specifics = offer
            .specifics
            .into_iter()
            .map(|s| (s.project_id.clone(), s))
            .collect();
        Self {
            id: GroupBidId::generate(),
            group_id,
            contractor: offer.contractor,
            status: GroupBidStatus::Submitted,
            group_price_minor: offer.group_price_minor,
            per_member_price_minor: offer.per_member_price_minor,
            savings_pct: offer.savings_pct,
            required_acceptance_count: offer.required_acceptance_count,
            required_acceptance_pct: offer.required_acceptance_pct,
            current_acceptance_count: 0,
            acceptance_deadline: offer.acceptance_deadline,
            final_offer: offer.final_offer,
            items: offer.items,
            specifics,
            acceptances: HashMap::new(),
            submitted_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Whether members may still accept
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// Whether the acceptance deadline has passed
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.acceptance_deadline
    }

    /// The quorum target given the group's current active member count:
    /// max(absolute count, ceil(percentage × members)).
    pub fn required_acceptances(&self, active_members: u32) -> u32 {
        let from_pct = ((self.required_acceptance_pct / 100.0) * active_members as f64).ceil();
        self.required_acceptance_count.max(from_pct as u32)
    }

    /// Whether the confirmed count meets the quorum target
    pub fn is_quorum_met(&self, active_members: u32) -> bool {
        self.current_acceptance_count >= self.required_acceptances(active_members)
    }

    /// The specific price for one member's project
    pub fn specific_for(&self, project_id: &ProjectId) -> Option<&ProjectSpecific> {
        self.specifics.get(project_id)
    }

    /// Projects among `active` that this bid has no specific for
    pub fn uncovered_projects(&self, active: &[ProjectId]) -> Vec<ProjectId> {
        active
            .iter()
            .filter(|p| !self.specifics.contains_key(p))
            .cloned()
            .collect()
    }

    /// The acceptance a member currently holds against this bid
    pub fn acceptance_for(&self, project_id: &ProjectId) -> Option<&Acceptance> {
        self.acceptances.get(project_id)
    }

    /// Find an acceptance by its id
    pub fn acceptance_by_id(&self, id: &AcceptanceId) -> Option<&Acceptance> {
        self.acceptances.values().find(|a| a.id == *id)
    }

    /// Find a mutable acceptance by its id
    pub fn acceptance_by_id_mut(&mut self, id: &AcceptanceId) -> Option<&mut Acceptance> {
        self.acceptances.values_mut().find(|a| a.id == *id)
    }

    /// All confirmed acceptances
    pub fn confirmed_acceptances(&self) -> Vec<&Acceptance> {
        self.acceptances
            .values()
            .filter(|a| a.status == AcceptanceStatus::Confirmed)
            .collect()
    }

    /// Recount confirmed acceptances — the invariant the counter must
    /// always satisfy
    pub fn confirmed_count(&self) -> u32 {
        self.acceptances
            .values()
            .filter(|a| a.status == AcceptanceStatus::Confirmed)
            .count() as u32
    }

    /// Insert a fresh pending acceptance for a member. Rejects members
    /// that already hold a live (pending or confirmed) acceptance.
    pub fn insert_acceptance(&mut self, acceptance: Acceptance) -> GroupResult<AcceptanceId> {
        if let Some(existing) = self.acceptances.get(&acceptance.project_id) {
            if existing.status.is_live() {
                return Err(GroupError::DuplicateAcceptance(
                    acceptance.project_id.clone(),
                ));
            }
        }
        let id = acceptance.id.clone();
        self.acceptances
            .insert(acceptance.project_id.clone(), acceptance);
        Ok(id)
    }

    /// Move the bid to a terminal status and stamp resolution time
    pub fn resolve(&mut self, status: GroupBidStatus) {
        self.status = status;
        self.resolved_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_offer(specifics: Vec<ProjectSpecific>) -> BidOffer {
        BidOffer {
            contractor: ContractorId::new("contractor-1"),
            group_price_minor: 1_000_000,
            per_member_price_minor: 250_000,
            savings_pct: 15.0,
            required_acceptance_count: 2,
            required_acceptance_pct: 50.0,
            acceptance_deadline: Utc::now() + chrono::Duration::days(3),
            final_offer: false,
            items: vec![],
            specifics,
        }
    }

    fn make_bid() -> GroupBid {
        let specifics = (1..=4)
            .map(|i| {
                ProjectSpecific::new(ProjectId::new(format!("p{}", i)), 240_000, "roof swap")
            })
            .collect();
        GroupBid::from_offer(GroupId::new("group-1"), make_offer(specifics))
    }

    #[test]
    fn test_required_acceptances_takes_the_max() {
        let bid = make_bid();
        // 50% of 4 members = 2; absolute requirement = 2
        assert_eq!(bid.required_acceptances(4), 2);
        // 50% of 6 = 3 beats the absolute 2
        assert_eq!(bid.required_acceptances(6), 3);
        // 50% of 3 = ceil(1.5) = 2
        assert_eq!(bid.required_acceptances(3), 2);
        // absolute dominates small groups
        assert_eq!(bid.required_acceptances(1), 2);
    }

    #[test]
    fn test_uncovered_projects() {
        let bid = make_bid();
        let active = vec![
            ProjectId::new("p1"),
            ProjectId::new("p2"),
            ProjectId::new("p5"),
        ];
        assert_eq!(bid.uncovered_projects(&active), vec![ProjectId::new("p5")]);
    }

    #[test]
    fn test_duplicate_live_acceptance_rejected() {
        let mut bid = make_bid();
        let a1 = Acceptance::new(bid.id.clone(), ProjectId::new("p1"), 240_000);
        bid.insert_acceptance(a1).unwrap();

        let a2 = Acceptance::new(bid.id.clone(), ProjectId::new("p1"), 240_000);
        let result = bid.insert_acceptance(a2);
        assert!(matches!(result, Err(GroupError::DuplicateAcceptance(_))));
    }

    #[test]
    fn test_reaccept_after_failed() {
        let mut bid = make_bid();
        let mut a1 = Acceptance::new(bid.id.clone(), ProjectId::new("p1"), 240_000);
        a1.fail("card declined");
        bid.insert_acceptance(a1).unwrap();

        let a2 = Acceptance::new(bid.id.clone(), ProjectId::new("p1"), 240_000);
        assert!(bid.insert_acceptance(a2).is_ok());
    }

    #[test]
    fn test_counter_matches_confirmed() {
        let mut bid = make_bid();
        for i in 1..=3 {
            let mut a = Acceptance::new(
                bid.id.clone(),
                ProjectId::new(format!("p{}", i)),
                240_000,
            );
            if i < 3 {
                a.confirm();
            }
            bid.insert_acceptance(a).unwrap();
        }
        assert_eq!(bid.confirmed_count(), 2);
    }

    #[test]
    fn test_deadline_check() {
        let mut bid = make_bid();
        assert!(!bid.is_past_deadline(Utc::now()));
        bid.acceptance_deadline = Utc::now() - chrono::Duration::hours(1);
        assert!(bid.is_past_deadline(Utc::now()));
    }

    #[test]
    fn test_resolve_stamps_time() {
        let mut bid = make_bid();
        bid.resolve(GroupBidStatus::Expired);
        assert_eq!(bid.status, GroupBidStatus::Expired);
        assert!(bid.resolved_at.is_some());
        assert!(bid.status.is_terminal());
    }
}
