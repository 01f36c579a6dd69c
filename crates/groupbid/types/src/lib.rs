//! GroupBid domain types
//!
//! Foundation types for the group formation and threshold commitment
//! engine: identifiers, group/membership/bid/acceptance records, joining
//! criteria, domain events, and the error taxonomy. These are data
//! structures with local invariant checks — coordination logic lives in
//! `groupbid-engine`.

mod acceptance;
mod bid;
mod criteria;
mod errors;
mod events;
mod group;
mod ids;
mod membership;

pub use acceptance::{Acceptance, AcceptanceStatus};
pub use bid::{
    BidItem, BidOffer, DeadlineExtension, GroupBid, GroupBidStatus, ProjectSpecific,
};
pub use criteria::{
    AttributeValue, CandidateProject, CriterionPredicate, JoinAssessment, JoiningCriterion,
};
pub use errors::{GroupError, GroupResult};
pub use events::{EventEnvelope, EventSeverity, GroupEvent, GroupJournal};
pub use group::{FormationPolicy, GeoScope, Group, GroupSpec, GroupStatus};
pub use ids::{
    AcceptanceId, ContractorId, GroupBidId, GroupId, PendingPaymentRef, ProjectId, UserId,
};
pub use membership::{JoinOutcome, MemberRecord, MemberRoster, MemberStatus};
