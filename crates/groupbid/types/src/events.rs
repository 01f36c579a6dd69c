//! Domain events and the per-group journal
//!
//! Every significant transition produces an event envelope. Envelopes are
//! appended to the owning group's journal (the audit surface) and fanned
//! out to collaborators over a broadcast channel by the service layer.
//! Delivery and notification content are out of scope — these are
//! fire-and-forget facts.

use crate::ids::{AcceptanceId, ContractorId, GroupBidId, GroupId, ProjectId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event severity levels
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// GroupBid domain events
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GroupEvent {
    // ── Membership ──────────────────────────────────────────────────────
    MemberJoined {
        group_id: GroupId,
        project_id: ProjectId,
    },
    MemberLeft {
        group_id: GroupId,
        project_id: ProjectId,
    },
    MemberRemoved {
        group_id: GroupId,
        project_id: ProjectId,
        reason: String,
    },

    // ── Group lifecycle ─────────────────────────────────────────────────
    GroupCreated {
        group_id: GroupId,
    },
    FormationClosed {
        group_id: GroupId,
        member_count: u32,
    },
    GroupDissolved {
        group_id: GroupId,
        reason: String,
    },
    GroupExpired {
        group_id: GroupId,
    },
    GroupSettled {
        group_id: GroupId,
        bid_id: GroupBidId,
    },

    // ── Bids ────────────────────────────────────────────────────────────
    BidSubmitted {
        group_id: GroupId,
        bid_id: GroupBidId,
        contractor: ContractorId,
    },
    BidSuperseded {
        group_id: GroupId,
        old_bid_id: GroupBidId,
        new_bid_id: GroupBidId,
    },
    BidInvalidated {
        group_id: GroupId,
        bid_id: GroupBidId,
        reason: String,
    },
    BidExpired {
        group_id: GroupId,
        bid_id: GroupBidId,
        confirmed: u32,
        required: u32,
    },
    DeadlineExtended {
        group_id: GroupId,
        bid_id: GroupBidId,
        previous_deadline: DateTime<Utc>,
        new_deadline: DateTime<Utc>,
    },

    // ── Acceptances & settlement ────────────────────────────────────────
    AcceptancePending {
        group_id: GroupId,
        bid_id: GroupBidId,
        project_id: ProjectId,
        acceptance_id: AcceptanceId,
    },
    AcceptanceConfirmed {
        group_id: GroupId,
        bid_id: GroupBidId,
        project_id: ProjectId,
        confirmed: u32,
        required: u32,
    },
    AcceptanceRevoked {
        group_id: GroupId,
        bid_id: GroupBidId,
        project_id: ProjectId,
    },
    AcceptanceFailed {
        group_id: GroupId,
        bid_id: GroupBidId,
        project_id: ProjectId,
        reason: String,
    },
    QuorumReached {
        group_id: GroupId,
        bid_id: GroupBidId,
        confirmed: u32,
    },
    PaymentReversalRequested {
        group_id: GroupId,
        acceptance_id: AcceptanceId,
    },
    SettlementAttentionRequired {
        group_id: GroupId,
        acceptance_id: AcceptanceId,
        reason: String,
    },
}

impl GroupEvent {
    /// The group the event belongs to
    pub fn group_id(&self) -> &GroupId {
        match self {
            GroupEvent::MemberJoined { group_id, .. }
            | GroupEvent::MemberLeft { group_id, .. }
            | GroupEvent::MemberRemoved { group_id, .. }
            | GroupEvent::GroupCreated { group_id }
            | GroupEvent::FormationClosed { group_id, .. }
            | GroupEvent::GroupDissolved { group_id, .. }
            | GroupEvent::GroupExpired { group_id }
            | GroupEvent::GroupSettled { group_id, .. }
            | GroupEvent::BidSubmitted { group_id, .. }
            | GroupEvent::BidSuperseded { group_id, .. }
            | GroupEvent::BidInvalidated { group_id, .. }
            | GroupEvent::BidExpired { group_id, .. }
            | GroupEvent::DeadlineExtended { group_id, .. }
            | GroupEvent::AcceptancePending { group_id, .. }
            | GroupEvent::AcceptanceConfirmed { group_id, .. }
            | GroupEvent::AcceptanceRevoked { group_id, .. }
            | GroupEvent::AcceptanceFailed { group_id, .. }
            | GroupEvent::QuorumReached { group_id, .. }
            | GroupEvent::PaymentReversalRequested { group_id, .. }
            | GroupEvent::SettlementAttentionRequired { group_id, .. } => group_id,
        }
    }

    /// Default severity for the event kind
    pub fn severity(&self) -> EventSeverity {
        match self {
            GroupEvent::AcceptanceFailed { .. }
            | GroupEvent::SettlementAttentionRequired { .. } => EventSeverity::Error,
            GroupEvent::GroupDissolved { .. }
            | GroupEvent::GroupExpired { .. }
            | GroupEvent::BidExpired { .. }
            | GroupEvent::BidInvalidated { .. }
            | GroupEvent::PaymentReversalRequested { .. } => EventSeverity::Warning,
            _ => EventSeverity::Info,
        }
    }
}

/// Envelope wrapping a domain event with audit context
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event ID
    pub id: Uuid,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event severity
    pub severity: EventSeverity,
    /// The actor who triggered the event, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,
    /// The actual event
    pub event: GroupEvent,
}

impl EventEnvelope {
    pub fn new(event: GroupEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            severity: event.severity(),
            actor: None,
            event,
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }
}

/// The append-only event journal for one group
///
/// This is the group's accountability record; entries are never mutated
/// or removed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupJournal {
    /// The group this journal belongs to
    pub group_id: GroupId,
    entries: Vec<EventEnvelope>,
}

impl GroupJournal {
    /// Create a new empty journal
    pub fn new(group_id: GroupId) -> Self {
        Self {
            group_id,
            entries: Vec::new(),
        }
    }

    /// Append an event
    pub fn log(&mut self, envelope: EventEnvelope) {
        self.entries.push(envelope);
    }

    /// All entries, oldest first
    pub fn entries(&self) -> &[EventEnvelope] {
        &self.entries
    }

    /// Entries appended at or after the given index — used by the service
    /// layer to fan out only what an operation produced
    pub fn entries_since(&self, index: usize) -> &[EventEnvelope] {
        &self.entries[index.min(self.entries.len())..]
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the journal is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
