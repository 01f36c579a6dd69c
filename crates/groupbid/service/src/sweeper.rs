//! Deadline and expiry sweeper
//!
//! A periodic background pass over every group: formation timeouts, bid
//! expiry below quorum, group expiry past the bid deadline, and stuck
//! pending payments. The sweeper is a best-effort nudge — every deadline
//! is re-validated synchronously where it matters, so a missed tick only
//! delays a transition, never breaks one. Store faults are logged and
//! retried on the next tick.

use crate::config::ServiceConfig;
use crate::error::ServiceResult;
use crate::settlement::SettlementCoupler;
use crate::store::GroupStore;
use chrono::Utc;
use groupbid_types::EventEnvelope;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, Duration};

/// The background sweeper
pub struct Sweeper {
    config: ServiceConfig,
    store: Arc<dyn GroupStore>,
    settlement: Arc<SettlementCoupler>,
    event_tx: broadcast::Sender<EventEnvelope>,
    sweep_tx: mpsc::Sender<()>,
    running: Arc<RwLock<bool>>,
}

impl Sweeper {
    /// Create a new sweeper. The returned receiver feeds manual sweep
    /// triggers into `start`.
    pub fn new(
        config: ServiceConfig,
        store: Arc<dyn GroupStore>,
        settlement: Arc<SettlementCoupler>,
        event_tx: broadcast::Sender<EventEnvelope>,
    ) -> (Arc<Self>, mpsc::Receiver<()>) {
        let (sweep_tx, sweep_rx) = mpsc::channel(10);
        let sweeper = Arc::new(Self {
            config,
            store,
            settlement,
            event_tx,
            sweep_tx,
            running: Arc::new(RwLock::new(false)),
        });
        (sweeper, sweep_rx)
    }

    /// Trigger an immediate sweep
    pub async fn trigger_sweep(&self) {
        let _ = self.sweep_tx.send(()).await;
    }

    /// Run the sweep loop until stopped
    pub async fn start(self: Arc<Self>, mut sweep_rx: mpsc::Receiver<()>) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }

        tracing::info!(
            interval_secs = self.config.sweeper.sweep_interval_secs,
            grace_secs = self.config.sweeper.grace_secs,
            "Sweeper started"
        );

        let mut tick = interval(Duration::from_secs(
            self.config.sweeper.sweep_interval_secs,
        ));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.sweep_all().await {
                        tracing::error!(error = %e, "Sweep failed; will retry next tick");
                    }
                }
                Some(_) = sweep_rx.recv() => {
                    if let Err(e) = self.sweep_all().await {
                        tracing::error!(error = %e, "Triggered sweep failed");
                    }
                }
                else => break,
            }

            let running = self.running.read().await;
            if !*running {
                break;
            }
        }

        tracing::info!("Sweeper stopped");
    }

    /// Stop the sweep loop after the current pass
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    /// One sweep over every group
    pub async fn sweep_all(&self) -> ServiceResult<()> {
        let now = Utc::now();
        let handles = self.store.list().await?;

        tracing::debug!(groups = handles.len(), "Sweeping groups");

        for handle in handles {
            let (group_id, report) = {
                let mut coordinator = handle.lock().await;
                let mark = coordinator.journal().len();
                let report = coordinator.sweep(
                    now,
                    self.config.sweeper.grace_secs,
                    self.config.settlement.payment_window_secs,
                );
                for envelope in coordinator.journal().entries_since(mark) {
                    let _ = self.event_tx.send(envelope.clone());
                }
                (coordinator.id().clone(), report)
            };

            match report {
                Ok(report) => {
                    if !report.is_noop() {
                        tracing::debug!(
                            group = %group_id,
                            expired_bid = ?report.expired_bid,
                            dissolved = report.dissolved,
                            group_expired = report.group_expired,
                            "Sweep acted on group"
                        );
                    }
                    if !report.compensations.is_empty() {
                        self.settlement
                            .process_compensations(
                                &group_id,
                                report.compensations,
                                &self.event_tx,
                            )
                            .await;
                    }
                }
                Err(e) => {
                    // Isolated to this group; the rest of the sweep
                    // continues
                    tracing::error!(group = %group_id, error = %e, "Sweep failed for group");
                }
            }
        }

        Ok(())
    }
}
