//! Core group identity types
//!
//! A Group is a cohort of independently-owned candidate projects eligible
//! for one bundled contractor offer. The group record holds identity,
//! bounds, deadlines, and status — membership and bids live in their own
//! structures.

use crate::errors::{GroupError, GroupResult};
use crate::ids::{GroupBidId, GroupId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Geographic scope of a group
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeoScope {
    /// A zip code plus a radius in kilometers
    ZipRadius { zip: String, radius_km: f64 },
    /// A named region
    Region(String),
}

/// What the sweeper does with a group still `forming` past its
/// formation deadline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FormationPolicy {
    /// Close formation if the minimum is met, otherwise dissolve
    #[default]
    AutoClose,
    /// Dissolve regardless of member count
    AutoDissolve,
}

/// Specification for creating a new Group
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Human-readable name
    pub name: String,
    /// Project category classifier (e.g. "roofing", "solar")
    pub category: String,
    /// Geographic scope of eligible projects
    pub geo: GeoScope,
    /// Minimum members required to close formation
    pub min_members: u32,
    /// Maximum members the group will accept
    pub max_members: u32,
    /// Target collective savings, percent of individual pricing
    pub target_savings_pct: f64,
    /// Deadline for formation to complete
    pub formation_deadline: DateTime<Utc>,
    /// Deadline for the group to end up with an accepted bid
    pub bid_deadline: DateTime<Utc>,
    /// Outer bound for any bid's acceptance deadline, if set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acceptance_deadline: Option<DateTime<Utc>>,
    /// Formation-timeout policy
    #[serde(default)]
    pub formation_policy: FormationPolicy,
    /// The user that created this group
    pub created_by: UserId,
    /// Group administrator (defaults to the creator)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<UserId>,
}

impl GroupSpec {
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        geo: GeoScope,
        min_members: u32,
        max_members: u32,
        formation_deadline: DateTime<Utc>,
        bid_deadline: DateTime<Utc>,
        created_by: UserId,
    ) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            geo,
            min_members,
            max_members,
            target_savings_pct: 0.0,
            formation_deadline,
            bid_deadline,
            acceptance_deadline: None,
            formation_policy: FormationPolicy::default(),
            created_by,
            admin: None,
        }
    }

    pub fn with_target_savings(mut self, pct: f64) -> Self {
        self.target_savings_pct = pct;
        self
    }

    pub fn with_acceptance_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.acceptance_deadline = Some(deadline);
        self
    }

    pub fn with_formation_policy(mut self, policy: FormationPolicy) -> Self {
        self.formation_policy = policy;
        self
    }

    pub fn with_admin(mut self, admin: UserId) -> Self {
        self.admin = Some(admin);
        self
    }

    /// Validate internal consistency of the spec
    pub fn validate(&self) -> GroupResult<()> {
        if self.min_members == 0 {
            return Err(GroupError::InvalidSpec("min_members must be at least 1".into()));
        }
        if self.min_members > self.max_members {
            return Err(GroupError::InvalidSpec(format!(
                "min_members {} exceeds max_members {}",
                self.min_members, self.max_members
            )));
        }
        if self.bid_deadline <= self.formation_deadline {
            return Err(GroupError::InvalidSpec(
                "bid_deadline must be after formation_deadline".into(),
            ));
        }
        Ok(())
    }

    /// The effective admin: explicit admin or the creator
    pub fn effective_admin(&self) -> &UserId {
        self.admin.as_ref().unwrap_or(&self.created_by)
    }
}

/// Status of a Group
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// Accepting members
    #[default]
    Forming,
    /// Formation closed, no bids yet
    Formed,
    /// At least one bid has been submitted
    Bidding,
    /// A bid reached quorum and was accepted
    Settled,
    /// Explicitly dissolved
    Dissolved,
    /// Bid deadline passed with no accepted bid
    Expired,
}

impl GroupStatus {
    /// Whether new members may still join
    pub fn is_open_for_join(&self) -> bool {
        matches!(self, GroupStatus::Forming)
    }

    /// Whether contractors may submit bids
    pub fn is_biddable(&self) -> bool {
        matches!(self, GroupStatus::Formed | GroupStatus::Bidding)
    }

    /// Whether the group has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            GroupStatus::Settled | GroupStatus::Dissolved | GroupStatus::Expired
        )
    }

    /// Ordinal position in the forward lifecycle. Terminal states share
    /// the final position; only dissolution may cut the order short.
    fn rank(&self) -> u8 {
        match self {
            GroupStatus::Forming => 0,
            GroupStatus::Formed => 1,
            GroupStatus::Bidding => 2,
            GroupStatus::Settled | GroupStatus::Dissolved | GroupStatus::Expired => 3,
        }
    }
}

/// Full record for a Group
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Group {
    /// Unique group identity
    pub id: GroupId,
    /// Creation specification
    pub spec: GroupSpec,
    /// Current lifecycle status
    pub status: GroupStatus,
    /// The single accepted bid, once quorum is reached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_bid: Option<GroupBidId>,
    /// When the group was created
    pub created_at: DateTime<Utc>,
    /// Last modification timestamp
    pub updated_at: DateTime<Utc>,
}

impl Group {
    /// Create a new group record from a validated spec
    pub fn new(spec: GroupSpec) -> Self {
        let now = Utc::now();
        Self {
            id: GroupId::generate(),
            spec,
            status: GroupStatus::Forming,
            accepted_bid: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create with a specific ID (for testing or restoration)
    pub fn with_id(mut self, id: GroupId) -> Self {
        self.id = id;
        self
    }

    /// Advance the status. Statuses only move forward; any backward move
    /// is rejected so a settled or dissolved group can never reopen.
    pub fn transition(&mut self, to: GroupStatus) -> GroupResult<()> {
        if self.status == to {
            return Ok(());
        }
        if self.status.is_terminal() || to.rank() < self.status.rank() {
            return Err(GroupError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}
