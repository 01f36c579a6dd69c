//! Bid book — submission and specification store for one group
//!
//! Holds every bid a group has received, the single bid currently open
//! for acceptance, and the append-only extension log. Submission gating
//! lives here; the acceptance protocol over the open bid is in
//! `acceptance_engine`.

use crate::acceptance_engine::CompensationRequest;
use chrono::{DateTime, Utc};
use groupbid_types::{
    BidOffer, DeadlineExtension, EventEnvelope, GroupBid, GroupBidId, GroupBidStatus,
    GroupError, GroupEvent, GroupId, GroupJournal, GroupResult, ProjectId, UserId,
};
use std::collections::HashMap;
use tracing::{info, warn};

/// The bid book for a single group
pub struct BidBook {
    /// The group this book belongs to
    pub(crate) group_id: GroupId,
    /// All bids ever submitted, keyed by id
    pub(crate) bids: HashMap<GroupBidId, GroupBid>,
    /// The single bid currently open for acceptance
    pub(crate) open_bid: Option<GroupBidId>,
    /// The single accepted bid, once quorum is reached
    pub(crate) accepted_bid: Option<GroupBidId>,
    /// Append-only extension audit log
    pub(crate) extensions: Vec<DeadlineExtension>,
}

impl BidBook {
    /// Create an empty bid book
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            bids: HashMap::new(),
            open_bid: None,
            accepted_bid: None,
            extensions: Vec::new(),
        }
    }

    /// Submit a contractor's offer.
    ///
    /// The offer must cover every active member with a ProjectSpecific and
    /// carry a future acceptance deadline within the group's outer bound.
    /// A contractor superseding their own open bid implicitly invalidates
    /// it (returned compensations cancel/refund its acceptances); a
    /// different contractor must wait for an explicit invalidation.
    pub fn submit(
        &mut self,
        offer: BidOffer,
        active_projects: &[ProjectId],
        now: DateTime<Utc>,
        outer_deadline: Option<DateTime<Utc>>,
        journal: &mut GroupJournal,
    ) -> GroupResult<(GroupBidId, Vec<CompensationRequest>)> {
        if offer.acceptance_deadline <= now {
            return Err(GroupError::InvalidOffer(
                "acceptance_deadline must be in the future".into(),
            ));
        }
        if let Some(outer) = outer_deadline {
            if offer.acceptance_deadline > outer {
                return Err(GroupError::InvalidOffer(format!(
                    "acceptance_deadline exceeds the group bound {}",
                    outer
                )));
            }
        }

        let bid = GroupBid::from_offer(self.group_id.clone(), offer);

        let missing = bid.uncovered_projects(active_projects);
        if !missing.is_empty() {
            return Err(GroupError::IncompleteCoverage { missing });
        }

        let mut compensations = Vec::new();
        if let Some(open_id) = self.open_bid.clone() {
            let open_contractor = self
                .bids
                .get(&open_id)
                .map(|b| b.contractor.clone())
                .ok_or_else(|| GroupError::BidNotFound(open_id.clone()))?;

            if open_contractor != bid.contractor {
                return Err(GroupError::ActiveBidExists(open_id));
            }

            // Supersession by the owning contractor
            compensations = self.cancel_acceptances(&open_id);
            if let Some(old) = self.bids.get_mut(&open_id) {
                old.resolve(GroupBidStatus::Superseded);
            }
            self.open_bid = None;

            info!(
                group = %self.group_id,
                old_bid = %open_id,
                new_bid = %bid.id,
                "Bid superseded by its contractor"
            );

            journal.log(EventEnvelope::new(GroupEvent::BidSuperseded {
                group_id: self.group_id.clone(),
                old_bid_id: open_id,
                new_bid_id: bid.id.clone(),
            }));
        }

        let bid_id = bid.id.clone();
        info!(
            group = %self.group_id,
            bid = %bid_id,
            contractor = %bid.contractor,
            deadline = %bid.acceptance_deadline,
            "Group bid submitted"
        );

        journal.log(EventEnvelope::new(GroupEvent::BidSubmitted {
            group_id: self.group_id.clone(),
            bid_id: bid_id.clone(),
            contractor: bid.contractor.clone(),
        }));

        self.bids.insert(bid_id.clone(), bid);
        self.open_bid = Some(bid_id.clone());

        Ok((bid_id, compensations))
    }

    /// Explicitly invalidate the open bid so a new one can open. All of
    /// its acceptances are cancelled/refunded via the returned
    /// compensations.
    pub fn invalidate_open(
        &mut self,
        reason: &str,
        journal: &mut GroupJournal,
    ) -> GroupResult<(GroupBidId, Vec<CompensationRequest>)> {
        let open_id = self.open_bid.clone().ok_or(GroupError::NoOpenBid)?;

        let compensations = self.cancel_acceptances(&open_id);
        if let Some(bid) = self.bids.get_mut(&open_id) {
            bid.resolve(GroupBidStatus::Withdrawn);
        }
        self.open_bid = None;

        warn!(group = %self.group_id, bid = %open_id, reason = reason, "Open bid invalidated");

        journal.log(EventEnvelope::new(GroupEvent::BidInvalidated {
            group_id: self.group_id.clone(),
            bid_id: open_id.clone(),
            reason: reason.to_string(),
        }));

        Ok((open_id, compensations))
    }

    /// Withdraw the open bid as part of group dissolution
    pub fn withdraw_open(&mut self, journal: &mut GroupJournal) -> Vec<CompensationRequest> {
        let Some(open_id) = self.open_bid.take() else {
            return Vec::new();
        };

        let compensations = self.cancel_acceptances(&open_id);
        if let Some(bid) = self.bids.get_mut(&open_id) {
            bid.resolve(GroupBidStatus::Withdrawn);
        }

        journal.log(EventEnvelope::new(GroupEvent::BidInvalidated {
            group_id: self.group_id.clone(),
            bid_id: open_id,
            reason: "group dissolved".to_string(),
        }));

        compensations
    }

    /// Extend the open bid's acceptance deadline. Extensions are the only
    /// sanctioned way to move the deadline, always forward, and each one
    /// is recorded in the append-only extension log.
    pub fn extend_deadline(
        &mut self,
        bid_id: &GroupBidId,
        new_deadline: DateTime<Utc>,
        reason: &str,
        actor: UserId,
        outer_deadline: Option<DateTime<Utc>>,
        journal: &mut GroupJournal,
    ) -> GroupResult<()> {
        let bid = self
            .bids
            .get_mut(bid_id)
            .ok_or_else(|| GroupError::BidNotFound(bid_id.clone()))?;

        if !bid.is_open() {
            return Err(GroupError::BidNotOpen(bid.status));
        }
        if new_deadline <= bid.acceptance_deadline {
            return Err(GroupError::InvalidExtension(
                "new deadline must be after the current one".into(),
            ));
        }
        if let Some(outer) = outer_deadline {
            if new_deadline > outer {
                return Err(GroupError::InvalidExtension(format!(
                    "new deadline exceeds the group bound {}",
                    outer
                )));
            }
        }

        let previous = bid.acceptance_deadline;
        bid.acceptance_deadline = new_deadline;

        self.extensions.push(DeadlineExtension::new(
            bid_id.clone(),
            previous,
            new_deadline,
            reason,
            actor.clone(),
        ));

        info!(
            group = %self.group_id,
            bid = %bid_id,
            previous = %previous,
            new = %new_deadline,
            "Acceptance deadline extended"
        );

        journal.log(
            EventEnvelope::new(GroupEvent::DeadlineExtended {
                group_id: self.group_id.clone(),
                bid_id: bid_id.clone(),
                previous_deadline: previous,
                new_deadline,
            })
            .with_actor(actor.to_string()),
        );

        Ok(())
    }

    // --- Query methods ---

    /// Get a bid by id
    pub fn get(&self, bid_id: &GroupBidId) -> Option<&GroupBid> {
        self.bids.get(bid_id)
    }

    /// The bid currently open for acceptance
    pub fn open_bid(&self) -> Option<&GroupBid> {
        self.open_bid.as_ref().and_then(|id| self.bids.get(id))
    }

    /// Id of the open bid
    pub fn open_bid_id(&self) -> Option<&GroupBidId> {
        self.open_bid.as_ref()
    }

    /// Id of the accepted bid
    pub fn accepted_bid_id(&self) -> Option<&GroupBidId> {
        self.accepted_bid.as_ref()
    }

    /// The extension audit log
    pub fn extensions(&self) -> &[DeadlineExtension] {
        &self.extensions
    }

    /// Number of bids ever submitted
    pub fn bid_count(&self) -> usize {
        self.bids.len()
    }
}
