//! Acceptance records: one member's payment-backed commitment to a bid
//!
//! An acceptance is created in `pending_payment` and only counts toward
//! quorum once the payment collaborator confirms. Terminal states are
//! final — the confirmation-vs-cancellation race resolves to whichever
//! terminal state is recorded first, and the loser is compensated.

use crate::ids::{AcceptanceId, GroupBidId, PendingPaymentRef, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of an acceptance
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AcceptanceStatus {
    /// Created, waiting for payment confirmation
    #[default]
    PendingPayment,
    /// Payment confirmed; counts toward quorum
    Confirmed,
    /// Payment failed or timed out
    Failed,
    /// Revoked by the member (or cancelled by a cascade)
    Revoked,
}

impl AcceptanceStatus {
    /// Whether the acceptance has reached a final state
    pub fn is_terminal(&self) -> bool {
        matches!(self, AcceptanceStatus::Failed | AcceptanceStatus::Revoked)
    }

    /// Whether the acceptance still occupies the member's slot for this
    /// bid (pending or confirmed)
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            AcceptanceStatus::PendingPayment | AcceptanceStatus::Confirmed
        )
    }
}

/// One member's individual commitment to a specific group bid
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Acceptance {
    /// Unique acceptance identity — also the settlement idempotency key
    pub id: AcceptanceId,
    /// The bid being accepted
    pub bid_id: GroupBidId,
    /// The accepting member's project
    pub project_id: ProjectId,
    /// Committed amount in minor units (the member's specific price)
    pub amount_minor: u64,
    /// Current status
    pub status: AcceptanceStatus,
    /// Reference to the in-flight payment, once initiated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_ref: Option<PendingPaymentRef>,
    /// Payment attempts made so far
    pub attempts: u32,
    /// Failure detail, if the acceptance failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
    /// When the acceptance was created
    pub created_at: DateTime<Utc>,
    /// When the acceptance reached Confirmed/Failed/Revoked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Acceptance {
    /// Create a fresh pending acceptance
    pub fn new(bid_id: GroupBidId, project_id: ProjectId, amount_minor: u64) -> Self {
        Self {
            id: AcceptanceId::generate(),
            bid_id,
            project_id,
            amount_minor,
            status: AcceptanceStatus::PendingPayment,
            payment_ref: None,
            attempts: 0,
            failure_reason: None,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Record an initiated payment attempt
    pub fn record_attempt(&mut self, payment_ref: PendingPaymentRef) {
        self.payment_ref = Some(payment_ref);
        self.attempts += 1;
    }

    /// Transition to Confirmed. Returns false if the acceptance was not
    /// pending (idempotent replay or a lost race — caller compensates).
    pub fn confirm(&mut self) -> bool {
        if self.status != AcceptanceStatus::PendingPayment {
            return false;
        }
        self.status = AcceptanceStatus::Confirmed;
        self.resolved_at = Some(Utc::now());
        true
    }

    /// Transition to Failed with a reason
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = AcceptanceStatus::Failed;
        self.failure_reason = Some(reason.into());
        self.resolved_at = Some(Utc::now());
    }

    /// Transition to Revoked
    pub fn revoke(&mut self) {
        self.status = AcceptanceStatus::Revoked;
        self.resolved_at = Some(Utc::now());
    }

    /// Whether this pending acceptance has exceeded the payment window
    pub fn is_payment_overdue(&self, now: DateTime<Utc>, window_secs: u64) -> bool {
        self.status == AcceptanceStatus::PendingPayment
            && (now - self.created_at).num_seconds() >= window_secs as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_acceptance() -> Acceptance {
        Acceptance::new(
            GroupBidId::new("bid-1"),
            ProjectId::new("proj-1"),
            250_000,
        )
    }

    #[test]
    fn test_confirm_from_pending() {
        let mut a = make_acceptance();
        assert!(a.confirm());
        assert_eq!(a.status, AcceptanceStatus::Confirmed);
        assert!(a.resolved_at.is_some());
    }

    #[test]
    fn test_confirm_is_idempotent() {
        let mut a = make_acceptance();
        assert!(a.confirm());
        assert!(!a.confirm()); // replay is a no-op
    }

    #[test]
    fn test_confirm_after_revoke_loses() {
        let mut a = make_acceptance();
        a.revoke();
        assert!(!a.confirm());
        assert_eq!(a.status, AcceptanceStatus::Revoked);
    }

    #[test]
    fn test_attempt_tracking() {
        let mut a = make_acceptance();
        a.record_attempt(PendingPaymentRef::new("pay-1"));
        a.record_attempt(PendingPaymentRef::new("pay-2"));
        assert_eq!(a.attempts, 2);
        assert_eq!(a.payment_ref, Some(PendingPaymentRef::new("pay-2")));
    }

    #[test]
    fn test_payment_overdue() {
        let mut a = make_acceptance();
        a.created_at = Utc::now() - chrono::Duration::minutes(30);
        assert!(a.is_payment_overdue(Utc::now(), 15 * 60));
        assert!(!a.is_payment_overdue(Utc::now(), 60 * 60));

        a.confirm();
        assert!(!a.is_payment_overdue(Utc::now(), 15 * 60));
    }

    #[test]
    fn test_status_predicates() {
        assert!(AcceptanceStatus::PendingPayment.is_live());
        assert!(AcceptanceStatus::Confirmed.is_live());
        assert!(!AcceptanceStatus::Failed.is_live());
        assert!(AcceptanceStatus::Revoked.is_terminal());
        assert!(!AcceptanceStatus::Confirmed.is_terminal());
    }
}
