//! Threshold acceptance protocol
//!
//! The quorum state machine over the bid book's open bid: acceptances are
//! created in `pending_payment`, count toward quorum only when their
//! payment confirms, and the bid becomes binding the instant the
//! threshold is crossed. Confirmations are applied in arrival order under
//! the group lock; anything that strands a payment comes back as a
//! compensation request for the service layer to reverse outside the
//! lock.

use crate::bid_book::BidBook;
use chrono::{DateTime, Duration, Utc};
use groupbid_types::{
    Acceptance, AcceptanceId, AcceptanceStatus, EventEnvelope, GroupBidId, GroupBidStatus,
    GroupError, GroupEvent, GroupJournal, GroupResult, PendingPaymentRef, ProjectId,
};
use tracing::{debug, info, warn};

/// A reversal the service layer must request from the payment
/// collaborator. Produced whenever a confirmed or in-flight payment is
/// stranded by revocation, expiry, supersession, invalidation, or
/// dissolution.
#[derive(Clone, Debug)]
pub struct CompensationRequest {
    pub acceptance_id: AcceptanceId,
    pub project_id: ProjectId,
    pub payment_ref: PendingPaymentRef,
    pub amount_minor: u64,
    pub kind: CompensationKind,
}

/// Why a payment is being reversed
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompensationKind {
    /// The payment may still be in flight; cancel it
    CancelPending,
    /// The payment confirmed; refund it
    Refund,
}

/// Handed back from `accept`: what the service needs to initiate payment
#[derive(Clone, Debug)]
pub struct AcceptTicket {
    pub bid_id: GroupBidId,
    pub acceptance_id: AcceptanceId,
    pub project_id: ProjectId,
    pub amount_minor: u64,
}

/// Result of applying a payment confirmation
#[derive(Debug)]
pub enum ConfirmOutcome {
    /// Confirmed; quorum not yet met
    Confirmed { confirmed: u32, required: u32 },
    /// Confirmed AND the threshold is now crossed — the bid is binding
    QuorumReached {
        confirmed: u32,
        finalized: Vec<AcceptanceId>,
    },
    /// Replay of an already-confirmed acceptance; counter untouched
    AlreadyConfirmed,
    /// The confirmation lost a race (bid or acceptance already terminal);
    /// the member missed the window and the payment is refunded
    Late {
        compensation: Option<CompensationRequest>,
    },
    /// The deadline had passed when the confirmation arrived; the bid
    /// expired at application time
    ExpiredAtDeadline {
        compensations: Vec<CompensationRequest>,
    },
}

/// Result of applying a payment failure
#[derive(Debug, PartialEq, Eq)]
pub enum FailOutcome {
    /// Another attempt is allowed
    Retry { attempt: u32 },
    /// Attempts exhausted (or failure non-retryable); acceptance failed
    Failed,
    /// Stale callback for a non-pending acceptance; nothing changed
    Ignored,
}

/// Result of a revocation
#[derive(Debug)]
pub struct RevokeOutcome {
    /// Whether the revoked acceptance had counted toward quorum
    pub was_confirmed: bool,
    /// Reversal to request, if a payment was attached
    pub compensation: Option<CompensationRequest>,
}

impl BidBook {
    /// Start an acceptance for a member against the open bid.
    ///
    /// Deadline and bid state are validated here, at the moment of use —
    /// a missed sweep cycle can never let a stale bid collect money. The
    /// caller validates membership before calling.
    pub fn accept(
        &mut self,
        project_id: &ProjectId,
        now: DateTime<Utc>,
        journal: &mut GroupJournal,
    ) -> GroupResult<AcceptTicket> {
        if let Some(accepted) = &self.accepted_bid {
            return Err(GroupError::BidAlreadyAccepted(accepted.clone()));
        }
        let open_id = self.open_bid.clone().ok_or(GroupError::NoOpenBid)?;
        let bid = self
            .bids
            .get_mut(&open_id)
            .ok_or_else(|| GroupError::BidNotFound(open_id.clone()))?;

        if !bid.is_open() {
            return Err(GroupError::BidNotOpen(bid.status));
        }
        if bid.is_past_deadline(now) {
            return Err(GroupError::DeadlinePassed(bid.acceptance_deadline));
        }

        let specific = bid
            .specific_for(project_id)
            .ok_or_else(|| GroupError::IncompleteCoverage {
                missing: vec![project_id.clone()],
            })?;
        let amount_minor = specific.price_minor;

        let acceptance = Acceptance::new(open_id.clone(), project_id.clone(), amount_minor);
        let acceptance_id = bid.insert_acceptance(acceptance)?;

        debug!(
            group = %self.group_id,
            bid = %open_id,
            project = %project_id,
            acceptance = %acceptance_id,
            amount_minor,
            "Acceptance pending payment"
        );

        journal.log(EventEnvelope::new(GroupEvent::AcceptancePending {
            group_id: self.group_id.clone(),
            bid_id: open_id.clone(),
            project_id: project_id.clone(),
            acceptance_id: acceptance_id.clone(),
        }));

        Ok(AcceptTicket {
            bid_id: open_id,
            acceptance_id,
            project_id: project_id.clone(),
            amount_minor,
        })
    }

    /// Record an initiated payment attempt against an acceptance
    pub fn record_payment_attempt(
        &mut self,
        bid_id: &GroupBidId,
        acceptance_id: &AcceptanceId,
        payment_ref: PendingPaymentRef,
    ) -> GroupResult<()> {
        let bid = self
            .bids
            .get_mut(bid_id)
            .ok_or_else(|| GroupError::BidNotFound(bid_id.clone()))?;
        let acceptance = bid
            .acceptance_by_id_mut(acceptance_id)
            .ok_or_else(|| GroupError::AcceptanceNotFound(acceptance_id.clone()))?;
        acceptance.record_attempt(payment_ref);
        Ok(())
    }

    /// Apply a payment confirmation.
    ///
    /// At-most-once: a replayed confirmation finds the acceptance already
    /// confirmed and changes nothing. A confirmation for a terminal
    /// acceptance or an already-resolved bid is a no-op refund. Quorum is
    /// evaluated here, at confirmation time, against the live member
    /// count.
    pub fn apply_confirmation(
        &mut self,
        bid_id: &GroupBidId,
        acceptance_id: &AcceptanceId,
        active_members: u32,
        now: DateTime<Utc>,
        journal: &mut GroupJournal,
    ) -> GroupResult<ConfirmOutcome> {
        let bid = self
            .bids
            .get_mut(bid_id)
            .ok_or_else(|| GroupError::BidNotFound(bid_id.clone()))?;

        let (status, payment_ref, amount_minor, project_id) = {
            let acceptance = bid
                .acceptance_by_id(acceptance_id)
                .ok_or_else(|| GroupError::AcceptanceNotFound(acceptance_id.clone()))?;
            (
                acceptance.status,
                acceptance.payment_ref.clone(),
                acceptance.amount_minor,
                acceptance.project_id.clone(),
            )
        };
        let refund = |r: PendingPaymentRef| CompensationRequest {
            acceptance_id: acceptance_id.clone(),
            project_id: project_id.clone(),
            payment_ref: r,
            amount_minor,
            kind: CompensationKind::Refund,
        };

        match status {
            AcceptanceStatus::Confirmed => return Ok(ConfirmOutcome::AlreadyConfirmed),
            AcceptanceStatus::Failed | AcceptanceStatus::Revoked => {
                // Confirmation lost the cancellation race; refund
                return Ok(ConfirmOutcome::Late {
                    compensation: payment_ref.map(refund),
                });
            }
            AcceptanceStatus::PendingPayment => {}
        }

        if !bid.is_open() {
            // Bid already resolved (accepted without this member, or
            // expired/withdrawn); the member missed the window
            if let Some(acceptance) = bid.acceptance_by_id_mut(acceptance_id) {
                acceptance.revoke();
            }

            warn!(
                group = %self.group_id,
                bid = %bid_id,
                acceptance = %acceptance_id,
                "Late payment confirmation on resolved bid; refunding"
            );

            return Ok(ConfirmOutcome::Late {
                compensation: payment_ref.map(refund),
            });
        }

        if bid.is_past_deadline(now) {
            // Synchronous re-validation: expire here rather than let a
            // missed sweep admit a post-deadline quorum
            let confirmed = bid.confirmed_count();
            let required = bid.required_acceptances(active_members);
            let compensations = self.expire_bid_internal(bid_id, confirmed, required, journal);
            return Ok(ConfirmOutcome::ExpiredAtDeadline { compensations });
        }

        {
            let acceptance = bid
                .acceptance_by_id_mut(acceptance_id)
                .expect("acceptance exists");
            let confirmed_now = acceptance.confirm();
            debug_assert!(confirmed_now, "pending acceptance must confirm");
        }
        bid.current_acceptance_count += 1;
        debug_assert_eq!(bid.current_acceptance_count, bid.confirmed_count());

        if bid.status == GroupBidStatus::Submitted {
            bid.status = GroupBidStatus::Active;
        }

        let confirmed = bid.current_acceptance_count;
        let required = bid.required_acceptances(active_members);

        info!(
            group = %self.group_id,
            bid = %bid_id,
            project = %project_id,
            confirmed,
            required,
            "Acceptance confirmed"
        );

        journal.log(EventEnvelope::new(GroupEvent::AcceptanceConfirmed {
            group_id: self.group_id.clone(),
            bid_id: bid_id.clone(),
            project_id,
            confirmed,
            required,
        }));

        if confirmed >= required {
            bid.resolve(GroupBidStatus::Accepted);
            let finalized: Vec<AcceptanceId> = bid
                .confirmed_acceptances()
                .iter()
                .map(|a| a.id.clone())
                .collect();
            self.accepted_bid = Some(bid_id.clone());
            self.open_bid = None;

            info!(group = %self.group_id, bid = %bid_id, confirmed, "Quorum reached; bid accepted");

            journal.log(EventEnvelope::new(GroupEvent::QuorumReached {
                group_id: self.group_id.clone(),
                bid_id: bid_id.clone(),
                confirmed,
            }));

            return Ok(ConfirmOutcome::QuorumReached {
                confirmed,
                finalized,
            });
        }

        Ok(ConfirmOutcome::Confirmed {
            confirmed,
            required,
        })
    }

    /// Apply a payment failure. Retryable failures below the attempt
    /// bound leave the acceptance pending for another initiation;
    /// otherwise it fails and is surfaced.
    pub fn apply_failure(
        &mut self,
        bid_id: &GroupBidId,
        acceptance_id: &AcceptanceId,
        reason: &str,
        retryable: bool,
        max_attempts: u32,
        journal: &mut GroupJournal,
    ) -> GroupResult<FailOutcome> {
        let bid = self
            .bids
            .get_mut(bid_id)
            .ok_or_else(|| GroupError::BidNotFound(bid_id.clone()))?;
        let acceptance = bid
            .acceptance_by_id_mut(acceptance_id)
            .ok_or_else(|| GroupError::AcceptanceNotFound(acceptance_id.clone()))?;

        if acceptance.status != AcceptanceStatus::PendingPayment {
            return Ok(FailOutcome::Ignored);
        }

        if retryable && acceptance.attempts < max_attempts {
            debug!(
                group = %self.group_id,
                acceptance = %acceptance_id,
                attempt = acceptance.attempts,
                reason = reason,
                "Payment failed; retrying"
            );
            return Ok(FailOutcome::Retry {
                attempt: acceptance.attempts,
            });
        }

        acceptance.fail(reason);
        let project_id = acceptance.project_id.clone();

        warn!(
            group = %self.group_id,
            bid = %bid_id,
            project = %project_id,
            reason = reason,
            "Acceptance failed"
        );

        journal.log(EventEnvelope::new(GroupEvent::AcceptanceFailed {
            group_id: self.group_id.clone(),
            bid_id: bid_id.clone(),
            project_id,
            reason: reason.to_string(),
        }));

        Ok(FailOutcome::Failed)
    }

    /// Revoke a member's acceptance on the open bid. Permitted only while
    /// the bid has not become binding; a confirmed acceptance is refunded
    /// and the counter decremented atomically with the revocation.
    pub fn revoke(
        &mut self,
        project_id: &ProjectId,
        journal: &mut GroupJournal,
    ) -> GroupResult<RevokeOutcome> {
        if let Some(accepted) = &self.accepted_bid {
            return Err(GroupError::BidAlreadyAccepted(accepted.clone()));
        }
        let open_id = self.open_bid.clone().ok_or(GroupError::NoOpenBid)?;
        let bid = self
            .bids
            .get_mut(&open_id)
            .ok_or_else(|| GroupError::BidNotFound(open_id.clone()))?;

        let acceptance = bid
            .acceptances
            .get_mut(project_id)
            .ok_or_else(|| GroupError::NoAcceptanceForMember(project_id.clone()))?;

        if !acceptance.status.is_live() {
            return Err(GroupError::AcceptanceNotRevocable(acceptance.status));
        }

        let was_confirmed = acceptance.status == AcceptanceStatus::Confirmed;
        let kind = if was_confirmed {
            CompensationKind::Refund
        } else {
            CompensationKind::CancelPending
        };
        let compensation = acceptance.payment_ref.clone().map(|r| CompensationRequest {
            acceptance_id: acceptance.id.clone(),
            project_id: project_id.clone(),
            payment_ref: r,
            amount_minor: acceptance.amount_minor,
            kind,
        });
        acceptance.revoke();

        if was_confirmed {
            bid.current_acceptance_count -= 1;
            debug_assert_eq!(bid.current_acceptance_count, bid.confirmed_count());
        }

        info!(
            group = %self.group_id,
            bid = %open_id,
            project = %project_id,
            was_confirmed,
            "Acceptance revoked"
        );

        journal.log(EventEnvelope::new(GroupEvent::AcceptanceRevoked {
            group_id: self.group_id.clone(),
            bid_id: open_id,
            project_id: project_id.clone(),
        }));

        Ok(RevokeOutcome {
            was_confirmed,
            compensation,
        })
    }

    /// Expire the open bid if its deadline (plus the clock-skew grace
    /// window) has passed below quorum. Called by the sweeper; a late
    /// sweep expires late, never early.
    pub fn expire_open_if_due(
        &mut self,
        now: DateTime<Utc>,
        grace_secs: u64,
        active_members: u32,
        journal: &mut GroupJournal,
    ) -> Option<(GroupBidId, Vec<CompensationRequest>)> {
        let open_id = self.open_bid.clone()?;
        let bid = self.bids.get(&open_id)?;

        let cutoff = bid.acceptance_deadline + Duration::seconds(grace_secs as i64);
        if now < cutoff {
            return None;
        }

        let confirmed = bid.confirmed_count();
        let required = bid.required_acceptances(active_members);
        let compensations = self.expire_bid_internal(&open_id, confirmed, required, journal);
        Some((open_id, compensations))
    }

    /// Auto-fail pending acceptances whose payment never resolved within
    /// the bounded window, across every bid in the book.
    pub fn fail_overdue_payments(
        &mut self,
        now: DateTime<Utc>,
        window_secs: u64,
        journal: &mut GroupJournal,
    ) -> Vec<CompensationRequest> {
        let mut compensations = Vec::new();

        for bid in self.bids.values_mut() {
            for acceptance in bid.acceptances.values_mut() {
                if !acceptance.is_payment_overdue(now, window_secs) {
                    continue;
                }
                if let Some(payment_ref) = acceptance.payment_ref.clone() {
                    compensations.push(CompensationRequest {
                        acceptance_id: acceptance.id.clone(),
                        project_id: acceptance.project_id.clone(),
                        payment_ref,
                        amount_minor: acceptance.amount_minor,
                        kind: CompensationKind::CancelPending,
                    });
                }
                acceptance.fail("payment window elapsed");

                warn!(
                    group = %self.group_id,
                    bid = %bid.id,
                    project = %acceptance.project_id,
                    "Pending acceptance timed out"
                );

                journal.log(EventEnvelope::new(GroupEvent::AcceptanceFailed {
                    group_id: self.group_id.clone(),
                    bid_id: bid.id.clone(),
                    project_id: acceptance.project_id.clone(),
                    reason: "payment window elapsed".to_string(),
                }));
            }
        }

        compensations
    }

    /// Cancel every live acceptance on a bid, returning the reversals.
    /// The counter is recomputed so it keeps matching the confirmed set.
    pub(crate) fn cancel_acceptances(&mut self, bid_id: &GroupBidId) -> Vec<CompensationRequest> {
        let Some(bid) = self.bids.get_mut(bid_id) else {
            return Vec::new();
        };

        let mut compensations = Vec::new();
        for acceptance in bid.acceptances.values_mut() {
            if !acceptance.status.is_live() {
                continue;
            }
            let kind = if acceptance.status == AcceptanceStatus::Confirmed {
                CompensationKind::Refund
            } else {
                CompensationKind::CancelPending
            };
            if let Some(payment_ref) = acceptance.payment_ref.clone() {
                compensations.push(CompensationRequest {
                    acceptance_id: acceptance.id.clone(),
                    project_id: acceptance.project_id.clone(),
                    payment_ref,
                    amount_minor: acceptance.amount_minor,
                    kind,
                });
            }
            acceptance.revoke();
        }
        bid.current_acceptance_count = bid.confirmed_count();

        compensations
    }

    fn expire_bid_internal(
        &mut self,
        bid_id: &GroupBidId,
        confirmed: u32,
        required: u32,
        journal: &mut GroupJournal,
    ) -> Vec<CompensationRequest> {
        let compensations = self.cancel_acceptances(bid_id);
        if let Some(bid) = self.bids.get_mut(bid_id) {
            bid.resolve(GroupBidStatus::Expired);
        }
        if self.open_bid.as_ref() == Some(bid_id) {
            self.open_bid = None;
        }

        warn!(
            group = %self.group_id,
            bid = %bid_id,
            confirmed,
            required,
            "Bid expired below quorum"
        );

        journal.log(EventEnvelope::new(GroupEvent::BidExpired {
            group_id: self.group_id.clone(),
            bid_id: bid_id.clone(),
            confirmed,
            required,
        }));

        compensations
    }
}
