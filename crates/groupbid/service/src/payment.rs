//! Payment gateway contract and test doubles
//!
//! The engine never talks to a real payment processor; it talks to this
//! trait. `initiate` returns an opaque pending reference immediately, the
//! processor's eventual verdict arrives asynchronously as a
//! `PaymentUpdate` (webhook or callback), and `reverse` compensates a
//! stranded payment.

use async_trait::async_trait;
use groupbid_types::{GroupBidId, PendingPaymentRef, UserId};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{mpsc, Mutex};

/// Errors from the payment collaborator
#[derive(Debug, Clone, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment gateway rejected the request: {0}")]
    Rejected(String),

    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

/// Asynchronous verdict delivered by the payment collaborator
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PaymentUpdate {
    Confirmed {
        pending: PendingPaymentRef,
    },
    Failed {
        pending: PendingPaymentRef,
        reason: String,
        #[serde(default)]
        retryable: bool,
    },
}

/// The payment/escrow collaborator contract
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Start collecting `amount_minor` from `payer` for `bid_id`.
    /// Returns immediately with an opaque pending reference; the verdict
    /// arrives later as a `PaymentUpdate`.
    async fn initiate(
        &self,
        payer: &UserId,
        bid_id: &GroupBidId,
        amount_minor: u64,
    ) -> Result<PendingPaymentRef, PaymentError>;

    /// Reverse (cancel or refund) a previously initiated payment
    async fn reverse(&self, pending: &PendingPaymentRef) -> Result<(), PaymentError>;
}

/// A payment the mock gateway has seen
#[derive(Clone, Debug)]
pub struct InitiatedPayment {
    pub pending: PendingPaymentRef,
    pub payer: UserId,
    pub bid_id: GroupBidId,
    pub amount_minor: u64,
}

/// Scriptable gateway for tests: records initiations and reversals,
/// delivers nothing on its own — the test drives verdicts through the
/// service's update handler.
#[derive(Default)]
pub struct MockGateway {
    initiated: Mutex<Vec<InitiatedPayment>>,
    reversed: Mutex<Vec<PendingPaymentRef>>,
    fail_initiate: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent initiations fail
    pub fn set_fail_initiate(&self, fail: bool) {
        self.fail_initiate.store(fail, Ordering::SeqCst);
    }

    /// Everything initiated so far
    pub async fn initiated(&self) -> Vec<InitiatedPayment> {
        self.initiated.lock().await.clone()
    }

    /// The most recently initiated payment
    pub async fn last_initiated(&self) -> Option<InitiatedPayment> {
        self.initiated.lock().await.last().cloned()
    }

    /// Everything reversed so far
    pub async fn reversals(&self) -> Vec<PendingPaymentRef> {
        self.reversed.lock().await.clone()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn initiate(
        &self,
        payer: &UserId,
        bid_id: &GroupBidId,
        amount_minor: u64,
    ) -> Result<PendingPaymentRef, PaymentError> {
        if self.fail_initiate.load(Ordering::SeqCst) {
            return Err(PaymentError::Unavailable("gateway offline".into()));
        }
        let pending = PendingPaymentRef::generate();
        self.initiated.lock().await.push(InitiatedPayment {
            pending: pending.clone(),
            payer: payer.clone(),
            bid_id: bid_id.clone(),
            amount_minor,
        });
        Ok(pending)
    }

    async fn reverse(&self, pending: &PendingPaymentRef) -> Result<(), PaymentError> {
        self.reversed.lock().await.push(pending.clone());
        Ok(())
    }
}

/// Development gateway that confirms every payment instantly by pushing
/// a `Confirmed` update into the provided channel. The daemon drains the
/// channel into the service's update handler.
pub struct InstantGateway {
    updates: mpsc::UnboundedSender<PaymentUpdate>,
}

impl InstantGateway {
    pub fn new(updates: mpsc::UnboundedSender<PaymentUpdate>) -> Self {
        Self { updates }
    }
}

#[async_trait]
impl PaymentGateway for InstantGateway {
    async fn initiate(
        &self,
        _payer: &UserId,
        _bid_id: &GroupBidId,
        _amount_minor: u64,
    ) -> Result<PendingPaymentRef, PaymentError> {
        let pending = PendingPaymentRef::generate();
        self.updates
            .send(PaymentUpdate::Confirmed {
                pending: pending.clone(),
            })
            .map_err(|_| PaymentError::Unavailable("update channel closed".into()))?;
        Ok(pending)
    }

    async fn reverse(&self, _pending: &PendingPaymentRef) -> Result<(), PaymentError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_gateway_records() {
        let gateway = MockGateway::new();
        let pending = gateway
            .initiate(&UserId::new("u1"), &GroupBidId::new("b1"), 500)
            .await
            .unwrap();

        let initiated = gateway.initiated().await;
        assert_eq!(initiated.len(), 1);
        assert_eq!(initiated[0].pending, pending);
        assert_eq!(initiated[0].amount_minor, 500);

        gateway.reverse(&pending).await.unwrap();
        assert_eq!(gateway.reversals().await, vec![pending]);
    }

    #[tokio::test]
    async fn test_mock_gateway_scripted_failure() {
        let gateway = MockGateway::new();
        gateway.set_fail_initiate(true);
        let result = gateway
            .initiate(&UserId::new("u1"), &GroupBidId::new("b1"), 500)
            .await;
        assert!(matches!(result, Err(PaymentError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_instant_gateway_confirms() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let gateway = InstantGateway::new(tx);
        let pending = gateway
            .initiate(&UserId::new("u1"), &GroupBidId::new("b1"), 500)
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            PaymentUpdate::Confirmed { pending: p } => assert_eq!(p, pending),
            other => panic!("unexpected update: {:?}", other),
        }
    }

    #[test]
    fn test_update_serialization() {
        let update = PaymentUpdate::Failed {
            pending: PendingPaymentRef::new("pay-1"),
            reason: "insufficient funds".into(),
            retryable: true,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("\"status\":\"failed\""));

        let parsed: PaymentUpdate =
            serde_json::from_str(r#"{"status":"confirmed","pending":"pay-2"}"#).unwrap();
        assert!(matches!(parsed, PaymentUpdate::Confirmed { .. }));
    }
}
