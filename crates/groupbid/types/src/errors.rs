//! Error types for the GroupBid engine
//!
//! Two synchronous families matter to callers: validation errors (the
//! request itself is bad, nothing changed) and state conflicts (the
//! request raced the aggregate's lifecycle — refresh and retry).

use crate::acceptance::AcceptanceStatus;
use crate::bid::GroupBidStatus;
use crate::group::GroupStatus;
use crate::ids::{AcceptanceId, GroupBidId, GroupId, ProjectId};
use chrono::{DateTime, Utc};

/// Errors that can occur in group, bid, and acceptance operations
#[derive(Debug, thiserror::Error)]
pub enum GroupError {
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    #[error("Invalid group spec: {0}")]
    InvalidSpec(String),

    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidTransition { from: GroupStatus, to: GroupStatus },

    #[error("Group is not open for joining (status {0:?})")]
    GroupNotOpenForJoin(GroupStatus),

    #[error("Membership cannot change while group is {0:?}")]
    MembershipFrozen(GroupStatus),

    #[error("Group is not biddable (status {0:?})")]
    GroupNotBiddable(GroupStatus),

    #[error("Group is full: max {max} members")]
    GroupFull { max: u32 },

    #[error("Insufficient members: have {current}, need {min}")]
    InsufficientMembers { current: u32, min: u32 },

    #[error("Required joining criterion failed: {0}")]
    CriterionFailed(String),

    #[error("Joining criteria are frozen once bidding starts")]
    CriteriaFrozen,

    #[error("Member not found: {0}")]
    MemberNotFound(ProjectId),

    #[error("Member not active: {0}")]
    MemberNotActive(ProjectId),

    #[error("Invalid bid offer: {0}")]
    InvalidOffer(String),

    #[error("Bid not found: {0}")]
    BidNotFound(GroupBidId),

    #[error("No bid is currently open for acceptance")]
    NoOpenBid,

    #[error("Bid is not open for acceptance (status {0:?})")]
    BidNotOpen(GroupBidStatus),

    #[error("Bid already accepted: {0}")]
    BidAlreadyAccepted(GroupBidId),

    #[error("Another bid is open for acceptance: {0}")]
    ActiveBidExists(GroupBidId),

    #[error("Bid does not cover all members; missing specifics for {missing:?}")]
    IncompleteCoverage { missing: Vec<ProjectId> },

    #[error("Deadline passed at {0}")]
    DeadlinePassed(DateTime<Utc>),

    #[error("Invalid deadline extension: {0}")]
    InvalidExtension(String),

    #[error("Member {0} already has a live acceptance for this bid")]
    DuplicateAcceptance(ProjectId),

    #[error("Acceptance not found: {0}")]
    AcceptanceNotFound(AcceptanceId),

    #[error("No acceptance exists for member {0} on this bid")]
    NoAcceptanceForMember(ProjectId),

    #[error("Acceptance cannot be revoked in status {0:?}")]
    AcceptanceNotRevocable(AcceptanceStatus),
}

impl GroupError {
    /// Whether this error reflects a lifecycle race rather than a bad
    /// request. State conflicts carry the authoritative state back to the
    /// caller so it can refresh; validation errors never changed anything.
    pub fn is_state_conflict(&self) -> bool {
        matches!(
            self,
            GroupError::InvalidTransition { .. }
                | GroupError::GroupNotOpenForJoin(_)
                | GroupError::MembershipFrozen(_)
                | GroupError::GroupNotBiddable(_)
                | GroupError::GroupFull { .. }
                | GroupError::BidNotOpen(_)
                | GroupError::BidAlreadyAccepted(_)
                | GroupError::ActiveBidExists(_)
                | GroupError::DeadlinePassed(_)
                | GroupError::DuplicateAcceptance(_)
                | GroupError::CriteriaFrozen
                | GroupError::NoOpenBid
        )
    }

    /// Whether this error means the target does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            GroupError::GroupNotFound(_)
                | GroupError::MemberNotFound(_)
                | GroupError::BidNotFound(_)
                | GroupError::AcceptanceNotFound(_)
        )
    }
}

/// Result type alias for group operations
pub type GroupResult<T> = Result<T, GroupError>;
