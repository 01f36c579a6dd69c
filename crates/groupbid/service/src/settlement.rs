//! Settlement coupling — the bridge between acceptances and payments
//!
//! Owns the pending-payment index (opaque gateway reference → the
//! acceptance it belongs to) and executes compensating reversals. All
//! gateway calls happen here, outside any group lock; the caller
//! reacquires the aggregate only to apply the result.

use crate::config::SettlementConfig;
use crate::payment::{PaymentError, PaymentGateway};
use groupbid_engine::CompensationRequest;
use groupbid_types::{
    AcceptanceId, EventEnvelope, GroupBidId, GroupEvent, GroupId, PendingPaymentRef, ProjectId,
    UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, error, warn};

/// Where a pending payment reference points
#[derive(Clone, Debug)]
pub struct PaymentTarget {
    pub group_id: GroupId,
    pub bid_id: GroupBidId,
    pub acceptance_id: AcceptanceId,
    pub project_id: ProjectId,
    pub payer: UserId,
    pub amount_minor: u64,
}

/// The settlement coupler
pub struct SettlementCoupler {
    gateway: Arc<dyn PaymentGateway>,
    index: RwLock<HashMap<PendingPaymentRef, PaymentTarget>>,
    config: SettlementConfig,
}

impl SettlementCoupler {
    pub fn new(gateway: Arc<dyn PaymentGateway>, config: SettlementConfig) -> Self {
        Self {
            gateway,
            index: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    /// Initiate payment for an acceptance and register the returned
    /// reference so the asynchronous verdict can be routed back.
    pub async fn request_payment(
        &self,
        target: PaymentTarget,
    ) -> Result<PendingPaymentRef, PaymentError> {
        let pending = self
            .gateway
            .initiate(&target.payer, &target.bid_id, target.amount_minor)
            .await?;

        debug!(
            group = %target.group_id,
            acceptance = %target.acceptance_id,
            payment = %pending,
            amount_minor = target.amount_minor,
            "Payment initiated"
        );

        self.index.write().await.insert(pending.clone(), target);
        Ok(pending)
    }

    /// Resolve a gateway reference back to its acceptance. The entry
    /// stays registered so replayed callbacks still route to the engine,
    /// where the at-most-once guard lives.
    pub async fn lookup(&self, pending: &PendingPaymentRef) -> Option<PaymentTarget> {
        self.index.read().await.get(pending).cloned()
    }

    /// Drop a reference whose acceptance reached a terminal state
    pub async fn forget(&self, pending: &PendingPaymentRef) {
        self.index.write().await.remove(pending);
    }

    /// Execute compensating reversals for stranded payments. Reversal
    /// failures are surfaced as attention events, never silently dropped.
    pub async fn process_compensations(
        &self,
        group_id: &GroupId,
        compensations: Vec<CompensationRequest>,
        event_tx: &broadcast::Sender<EventEnvelope>,
    ) {
        for compensation in compensations {
            let _ = event_tx.send(EventEnvelope::new(GroupEvent::PaymentReversalRequested {
                group_id: group_id.clone(),
                acceptance_id: compensation.acceptance_id.clone(),
            }));

            match self.gateway.reverse(&compensation.payment_ref).await {
                Ok(()) => {
                    warn!(
                        group = %group_id,
                        acceptance = %compensation.acceptance_id,
                        kind = ?compensation.kind,
                        amount_minor = compensation.amount_minor,
                        "Payment reversed"
                    );
                    self.forget(&compensation.payment_ref).await;
                }
                Err(e) => {
                    error!(
                        group = %group_id,
                        acceptance = %compensation.acceptance_id,
                        error = %e,
                        "Payment reversal failed; manual intervention required"
                    );
                    let _ = event_tx.send(EventEnvelope::new(
                        GroupEvent::SettlementAttentionRequired {
                            group_id: group_id.clone(),
                            acceptance_id: compensation.acceptance_id.clone(),
                            reason: format!("reversal failed: {}", e),
                        },
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::MockGateway;
    use groupbid_engine::CompensationKind;

    fn make_target() -> PaymentTarget {
        PaymentTarget {
            group_id: GroupId::new("g1"),
            bid_id: GroupBidId::new("b1"),
            acceptance_id: AcceptanceId::new("a1"),
            project_id: ProjectId::new("p1"),
            payer: UserId::new("u1"),
            amount_minor: 250_000,
        }
    }

    #[tokio::test]
    async fn test_request_and_lookup() {
        let gateway = Arc::new(MockGateway::new());
        let coupler = SettlementCoupler::new(gateway.clone(), SettlementConfig::default());

        let pending = coupler.request_payment(make_target()).await.unwrap();
        let target = coupler.lookup(&pending).await.unwrap();
        assert_eq!(target.acceptance_id, AcceptanceId::new("a1"));

        // Lookup does not consume the entry
        assert!(coupler.lookup(&pending).await.is_some());

        coupler.forget(&pending).await;
        assert!(coupler.lookup(&pending).await.is_none());
    }

    #[tokio::test]
    async fn test_compensations_reverse_and_forget() {
        let gateway = Arc::new(MockGateway::new());
        let coupler = SettlementCoupler::new(gateway.clone(), SettlementConfig::default());
        let (event_tx, mut event_rx) = broadcast::channel(16);

        let pending = coupler.request_payment(make_target()).await.unwrap();
        let compensation = CompensationRequest {
            acceptance_id: AcceptanceId::new("a1"),
            project_id: ProjectId::new("p1"),
            payment_ref: pending.clone(),
            amount_minor: 250_000,
            kind: CompensationKind::Refund,
        };

        coupler
            .process_compensations(&GroupId::new("g1"), vec![compensation], &event_tx)
            .await;

        assert_eq!(gateway.reversals().await, vec![pending.clone()]);
        assert!(coupler.lookup(&pending).await.is_none());

        let event = event_rx.recv().await.unwrap();
        assert!(matches!(
            event.event,
            GroupEvent::PaymentReversalRequested { .. }
        ));
    }
}
