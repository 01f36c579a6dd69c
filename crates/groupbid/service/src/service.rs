//! GroupBid service — the exposed command and query surface
//!
//! One logical worker per inbound call; each command locks exactly one
//! group aggregate for its synchronous part and never holds that lock
//! across a payment-collaborator call. Domain events produced under the
//! lock are fanned out on the broadcast channel as soon as the lock is
//! released. Commands are idempotent given a client-supplied token.

use crate::config::ServiceConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::payment::{PaymentGateway, PaymentUpdate};
use crate::settlement::{PaymentTarget, SettlementCoupler};
use crate::store::{GroupStore, InMemoryGroupStore};
use chrono::{DateTime, Utc};
use groupbid_engine::{
    ConfirmOutcome, FailOutcome, GroupCoordinator, GroupSnapshot,
};
use groupbid_types::{
    AcceptanceId, BidOffer, CandidateProject, EventEnvelope, GroupError, GroupEvent, GroupId,
    GroupBidId, GroupSpec, JoinAssessment, JoinOutcome, JoiningCriterion, ProjectId, UserId,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{info, warn};

/// Cached result of an idempotent command
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommandOutcome {
    GroupCreated { group_id: GroupId },
    Joined { group_id: GroupId, project_id: ProjectId },
    FormationClosed,
    BidSubmitted { bid_id: GroupBidId },
    BidInvalidated { bid_id: GroupBidId },
    AcceptancePending { acceptance_id: AcceptanceId },
    AcceptanceRevoked,
    DeadlineExtended,
    Dissolved,
    Left,
}

/// Per-candidate result of a ranked evaluation pass
#[derive(Clone, Debug, Serialize)]
pub struct CandidateAssessment {
    pub project_id: ProjectId,
    pub assessment: JoinAssessment,
}

/// The GroupBid service
pub struct GroupService {
    store: Arc<dyn GroupStore>,
    settlement: Arc<SettlementCoupler>,
    event_tx: broadcast::Sender<EventEnvelope>,
    idempotency: RwLock<HashMap<String, CommandOutcome>>,
    config: ServiceConfig,
}

impl GroupService {
    /// Create a service over the given store and payment gateway
    pub fn new(
        store: Arc<dyn GroupStore>,
        gateway: Arc<dyn PaymentGateway>,
        config: ServiceConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(config.event_capacity);
        let settlement = Arc::new(SettlementCoupler::new(
            gateway,
            config.settlement.clone(),
        ));
        Self {
            store,
            settlement,
            event_tx,
            idempotency: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Convenience constructor with an in-memory store
    pub fn in_memory(gateway: Arc<dyn PaymentGateway>, config: ServiceConfig) -> Self {
        Self::new(Arc::new(InMemoryGroupStore::new()), gateway, config)
    }

    pub fn store(&self) -> Arc<dyn GroupStore> {
        self.store.clone()
    }

    pub fn settlement(&self) -> Arc<SettlementCoupler> {
        self.settlement.clone()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Subscribe to the domain event stream
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.event_tx.subscribe()
    }

    /// The raw event sender (for wiring the sweeper)
    pub fn event_sender(&self) -> broadcast::Sender<EventEnvelope> {
        self.event_tx.clone()
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Create a group. The founder's own candidate project, when given,
    /// joins immediately as the founding admin member.
    pub async fn create_group(
        &self,
        spec: GroupSpec,
        criteria: Vec<JoiningCriterion>,
        founder: Option<CandidateProject>,
        token: Option<String>,
    ) -> ServiceResult<GroupId> {
        if let Some(CommandOutcome::GroupCreated { group_id }) = self.cached(&token).await {
            return Ok(group_id);
        }

        let mut coordinator = GroupCoordinator::new(spec, criteria)?;
        if let Some(founder) = founder {
            coordinator.join(&founder)?;
        }
        let group_id = coordinator.id().clone();

        for envelope in coordinator.journal().entries() {
            let _ = self.event_tx.send(envelope.clone());
        }
        self.store.insert(coordinator).await?;

        info!(group = %group_id, "Group registered");

        self.remember(&token, CommandOutcome::GroupCreated {
            group_id: group_id.clone(),
        })
        .await;
        Ok(group_id)
    }

    /// Evaluate an ordered candidate list (from the recommendation
    /// collaborator) against a group's criteria. Order is preserved; no
    /// scoring happens here.
    pub async fn evaluate_candidates(
        &self,
        group_id: &GroupId,
        candidates: Vec<CandidateProject>,
    ) -> ServiceResult<Vec<CandidateAssessment>> {
        self.with_group(group_id, |coordinator| {
            Ok(candidates
                .iter()
                .map(|candidate| CandidateAssessment {
                    project_id: candidate.project_id.clone(),
                    assessment: coordinator.evaluate_join(candidate),
                })
                .collect())
        })
        .await
    }

    /// Join a group (idempotent per (group, project) and per token)
    pub async fn join_group(
        &self,
        group_id: &GroupId,
        candidate: CandidateProject,
        token: Option<String>,
    ) -> ServiceResult<JoinOutcome> {
        if let Some(CommandOutcome::Joined { .. }) = self.cached(&token).await {
            return Ok(JoinOutcome::AlreadyMember);
        }

        let project_id = candidate.project_id.clone();
        let outcome = self
            .with_group(group_id, |coordinator| coordinator.join(&candidate))
            .await?;

        self.remember(&token, CommandOutcome::Joined {
            group_id: group_id.clone(),
            project_id,
        })
        .await;
        Ok(outcome)
    }

    /// Leave a group; any live acceptance is revoked and compensated
    pub async fn leave_group(
        &self,
        group_id: &GroupId,
        project_id: &ProjectId,
        token: Option<String>,
    ) -> ServiceResult<()> {
        if let Some(CommandOutcome::Left) = self.cached(&token).await {
            return Ok(());
        }

        let compensations = self
            .with_group(group_id, |coordinator| coordinator.leave(project_id))
            .await?;
        self.settlement
            .process_compensations(group_id, compensations, &self.event_tx)
            .await;

        self.remember(&token, CommandOutcome::Left).await;
        Ok(())
    }

    /// Close formation explicitly
    pub async fn close_formation(
        &self,
        group_id: &GroupId,
        token: Option<String>,
    ) -> ServiceResult<()> {
        if let Some(CommandOutcome::FormationClosed) = self.cached(&token).await {
            return Ok(());
        }

        self.with_group(group_id, |coordinator| coordinator.close_formation())
            .await?;

        self.remember(&token, CommandOutcome::FormationClosed).await;
        Ok(())
    }

    /// Dissolve a group; all open bids are withdrawn and every live
    /// acceptance cancelled or refunded
    pub async fn dissolve(
        &self,
        group_id: &GroupId,
        reason: &str,
        token: Option<String>,
    ) -> ServiceResult<()> {
        if let Some(CommandOutcome::Dissolved) = self.cached(&token).await {
            return Ok(());
        }

        let compensations = self
            .with_group(group_id, |coordinator| coordinator.dissolve(reason))
            .await?;
        self.settlement
            .process_compensations(group_id, compensations, &self.event_tx)
            .await;

        self.remember(&token, CommandOutcome::Dissolved).await;
        Ok(())
    }

    /// Submit a contractor's group bid
    pub async fn submit_group_bid(
        &self,
        group_id: &GroupId,
        offer: BidOffer,
        token: Option<String>,
    ) -> ServiceResult<GroupBidId> {
        if let Some(CommandOutcome::BidSubmitted { bid_id }) = self.cached(&token).await {
            return Ok(bid_id);
        }

        let (bid_id, compensations) = self
            .with_group(group_id, |coordinator| {
                coordinator.submit_bid(offer, Utc::now())
            })
            .await?;
        // Supersession may have stranded payments on the old bid
        self.settlement
            .process_compensations(group_id, compensations, &self.event_tx)
            .await;

        self.remember(&token, CommandOutcome::BidSubmitted {
            bid_id: bid_id.clone(),
        })
        .await;
        Ok(bid_id)
    }

    /// Explicitly invalidate the open bid so a new one can open
    pub async fn invalidate_open_bid(
        &self,
        group_id: &GroupId,
        reason: &str,
        token: Option<String>,
    ) -> ServiceResult<GroupBidId> {
        if let Some(CommandOutcome::BidInvalidated { bid_id }) = self.cached(&token).await {
            return Ok(bid_id);
        }

        let (bid_id, compensations) = self
            .with_group(group_id, |coordinator| {
                coordinator.invalidate_open_bid(reason)
            })
            .await?;
        self.settlement
            .process_compensations(group_id, compensations, &self.event_tx)
            .await;

        self.remember(&token, CommandOutcome::BidInvalidated {
            bid_id: bid_id.clone(),
        })
        .await;
        Ok(bid_id)
    }

    /// Accept the open bid for a member. Creates the pending acceptance
    /// under the group lock, initiates payment outside it, then
    /// reacquires the lock to record the attempt.
    pub async fn accept(
        &self,
        group_id: &GroupId,
        project_id: &ProjectId,
        token: Option<String>,
    ) -> ServiceResult<AcceptanceId> {
        if let Some(CommandOutcome::AcceptancePending { acceptance_id }) =
            self.cached(&token).await
        {
            return Ok(acceptance_id);
        }

        let (ticket, payer) = self
            .with_group(group_id, |coordinator| {
                let ticket = coordinator.accept(project_id, Utc::now())?;
                let payer = coordinator
                    .membership()
                    .get_member(project_id)
                    .map(|m| m.owner.clone())
                    .ok_or_else(|| GroupError::MemberNotFound(project_id.clone()))?;
                Ok((ticket, payer))
            })
            .await?;

        let target = PaymentTarget {
            group_id: group_id.clone(),
            bid_id: ticket.bid_id.clone(),
            acceptance_id: ticket.acceptance_id.clone(),
            project_id: project_id.clone(),
            payer,
            amount_minor: ticket.amount_minor,
        };

        match self.settlement.request_payment(target).await {
            Ok(payment_ref) => {
                self.with_group(group_id, |coordinator| {
                    coordinator.record_payment_attempt(
                        &ticket.bid_id,
                        &ticket.acceptance_id,
                        payment_ref.clone(),
                    )
                })
                .await?;
            }
            Err(e) => {
                warn!(
                    group = %group_id,
                    project = %project_id,
                    error = %e,
                    "Payment initiation failed"
                );
                let max_attempts = self.config.settlement.max_payment_attempts;
                let _ = self
                    .with_group(group_id, |coordinator| {
                        coordinator.payment_failed(
                            &ticket.bid_id,
                            &ticket.acceptance_id,
                            "payment initiation failed",
                            false,
                            max_attempts,
                        )
                    })
                    .await;
                return Err(ServiceError::Payment(e));
            }
        }

        self.remember(&token, CommandOutcome::AcceptancePending {
            acceptance_id: ticket.acceptance_id.clone(),
        })
        .await;
        Ok(ticket.acceptance_id)
    }

    /// Revoke a member's acceptance on the open bid
    pub async fn revoke_acceptance(
        &self,
        group_id: &GroupId,
        project_id: &ProjectId,
        token: Option<String>,
    ) -> ServiceResult<()> {
        if let Some(CommandOutcome::AcceptanceRevoked) = self.cached(&token).await {
            return Ok(());
        }

        let outcome = self
            .with_group(group_id, |coordinator| {
                coordinator.revoke_acceptance(project_id)
            })
            .await?;
        if let Some(compensation) = outcome.compensation {
            self.settlement
                .process_compensations(group_id, vec![compensation], &self.event_tx)
                .await;
        }

        self.remember(&token, CommandOutcome::AcceptanceRevoked).await;
        Ok(())
    }

    /// Extend the open bid's acceptance deadline
    pub async fn extend_deadline(
        &self,
        group_id: &GroupId,
        bid_id: &GroupBidId,
        new_deadline: DateTime<Utc>,
        reason: &str,
        actor: UserId,
        token: Option<String>,
    ) -> ServiceResult<()> {
        if let Some(CommandOutcome::DeadlineExtended) = self.cached(&token).await {
            return Ok(());
        }

        self.with_group(group_id, |coordinator| {
            coordinator.extend_deadline(bid_id, new_deadline, reason, actor)
        })
        .await?;

        self.remember(&token, CommandOutcome::DeadlineExtended).await;
        Ok(())
    }

    // =========================================================================
    // PAYMENT CALLBACKS
    // =========================================================================

    /// Entry point for the payment collaborator's asynchronous verdicts
    /// (webhook/callback). Replays are safe: the acceptance-level guard
    /// in the engine makes the quorum increment at-most-once.
    pub async fn handle_payment_update(&self, update: PaymentUpdate) -> ServiceResult<()> {
        match update {
            PaymentUpdate::Confirmed { pending } => {
                let Some(target) = self.resolve_target(&pending).await else {
                    warn!(payment = %pending, "Confirmation for unknown payment reference");
                    return Ok(());
                };

                let outcome = self
                    .with_group(&target.group_id, |coordinator| {
                        coordinator.payment_confirmed(
                            &target.bid_id,
                            &target.acceptance_id,
                            Utc::now(),
                        )
                    })
                    .await?;

                match outcome {
                    ConfirmOutcome::Late { compensation } => {
                        self.settlement
                            .process_compensations(
                                &target.group_id,
                                compensation.into_iter().collect(),
                                &self.event_tx,
                            )
                            .await;
                    }
                    ConfirmOutcome::ExpiredAtDeadline { compensations } => {
                        self.settlement
                            .process_compensations(
                                &target.group_id,
                                compensations,
                                &self.event_tx,
                            )
                            .await;
                    }
                    ConfirmOutcome::Confirmed { .. }
                    | ConfirmOutcome::QuorumReached { .. }
                    | ConfirmOutcome::AlreadyConfirmed => {}
                }
                Ok(())
            }
            PaymentUpdate::Failed {
                pending,
                reason,
                retryable,
            } => {
                let Some(target) = self.resolve_target(&pending).await else {
                    warn!(payment = %pending, "Failure for unknown payment reference");
                    return Ok(());
                };
                self.settlement.forget(&pending).await;

                let max_attempts = self.config.settlement.max_payment_attempts;
                let outcome = self
                    .with_group(&target.group_id, |coordinator| {
                        coordinator.payment_failed(
                            &target.bid_id,
                            &target.acceptance_id,
                            &reason,
                            retryable,
                            max_attempts,
                        )
                    })
                    .await?;

                match outcome {
                    FailOutcome::Retry { attempt } => {
                        info!(
                            group = %target.group_id,
                            acceptance = %target.acceptance_id,
                            attempt,
                            "Retrying payment"
                        );
                        self.retry_payment(target).await;
                    }
                    FailOutcome::Failed => {
                        let _ = self.event_tx.send(EventEnvelope::new(
                            GroupEvent::SettlementAttentionRequired {
                                group_id: target.group_id.clone(),
                                acceptance_id: target.acceptance_id.clone(),
                                reason,
                            },
                        ));
                    }
                    FailOutcome::Ignored => {}
                }
                Ok(())
            }
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Snapshot of one group (status, members, quorum progress)
    pub async fn get_group(&self, group_id: &GroupId) -> ServiceResult<GroupSnapshot> {
        self.with_group(group_id, |coordinator| Ok(coordinator.snapshot()))
            .await
    }

    /// Snapshots of every group
    pub async fn list_groups(&self) -> ServiceResult<Vec<GroupSnapshot>> {
        let handles = self.store.list().await?;
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            let coordinator = handle.lock().await;
            snapshots.push(coordinator.snapshot());
        }
        Ok(snapshots)
    }

    /// A group's append-only event journal
    pub async fn get_journal(&self, group_id: &GroupId) -> ServiceResult<Vec<EventEnvelope>> {
        self.with_group(group_id, |coordinator| {
            Ok(coordinator.journal().entries().to_vec())
        })
        .await
    }

    // =========================================================================
    // INTERNAL
    // =========================================================================

    /// Run a closure under the group's aggregate lock, then fan out the
    /// events the operation appended to the journal.
    async fn with_group<T>(
        &self,
        group_id: &GroupId,
        f: impl FnOnce(&mut GroupCoordinator) -> Result<T, GroupError>,
    ) -> ServiceResult<T> {
        let handle = self
            .store
            .get(group_id)
            .await?
            .ok_or_else(|| GroupError::GroupNotFound(group_id.clone()))?;

        let mut coordinator = handle.lock().await;
        let mark = coordinator.journal().len();
        let result = f(&mut coordinator);
        for envelope in coordinator.journal().entries_since(mark) {
            let _ = self.event_tx.send(envelope.clone());
        }
        drop(coordinator);

        result.map_err(ServiceError::from)
    }

    /// Resolve a gateway reference, tolerating the delivery race where a
    /// fast gateway's callback lands before the initiating request has
    /// registered the reference.
    async fn resolve_target(
        &self,
        pending: &groupbid_types::PendingPaymentRef,
    ) -> Option<PaymentTarget> {
        for attempt in 0..3 {
            if let Some(target) = self.settlement.lookup(pending).await {
                return Some(target);
            }
            if attempt < 2 {
                tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            }
        }
        None
    }

    /// Re-initiate payment after a retryable failure
    async fn retry_payment(&self, target: PaymentTarget) {
        match self.settlement.request_payment(target.clone()).await {
            Ok(payment_ref) => {
                let record = self
                    .with_group(&target.group_id, |coordinator| {
                        coordinator.record_payment_attempt(
                            &target.bid_id,
                            &target.acceptance_id,
                            payment_ref.clone(),
                        )
                    })
                    .await;
                if let Err(e) = record {
                    warn!(
                        group = %target.group_id,
                        acceptance = %target.acceptance_id,
                        error = %e,
                        "Failed to record retried payment attempt"
                    );
                }
            }
            Err(e) => {
                warn!(
                    group = %target.group_id,
                    acceptance = %target.acceptance_id,
                    error = %e,
                    "Payment retry initiation failed"
                );
                let max_attempts = self.config.settlement.max_payment_attempts;
                let _ = self
                    .with_group(&target.group_id, |coordinator| {
                        coordinator.payment_failed(
                            &target.bid_id,
                            &target.acceptance_id,
                            "payment initiation failed",
                            false,
                            max_attempts,
                        )
                    })
                    .await;
                let _ = self.event_tx.send(EventEnvelope::new(
                    GroupEvent::SettlementAttentionRequired {
                        group_id: target.group_id.clone(),
                        acceptance_id: target.acceptance_id.clone(),
                        reason: format!("retry initiation failed: {}", e),
                    },
                ));
            }
        }
    }

    async fn cached(&self, token: &Option<String>) -> Option<CommandOutcome> {
        let token = token.as_deref()?;
        self.idempotency.read().await.get(token).cloned()
    }

    async fn remember(&self, token: &Option<String>, outcome: CommandOutcome) {
        if let Some(token) = token {
            self.idempotency
                .write()
                .await
                .insert(token.clone(), outcome);
        }
    }
}
