//! GroupBid service — async runtime for the commitment engine
//!
//! Wires the per-group coordinators into a running system: the group
//! store (one async mutex per aggregate), the settlement coupler (all
//! payment-gateway traffic, outside group locks), the background
//! deadline sweeper, the command/query service with client idempotency
//! tokens, and a thin REST surface.

pub mod api;
pub mod config;
pub mod error;
pub mod payment;
pub mod service;
pub mod settlement;
pub mod store;
pub mod sweeper;

pub use config::{ServiceConfig, SettlementConfig, SweeperConfig};
pub use error::{ServiceError, ServiceResult};
pub use payment::{InstantGateway, MockGateway, PaymentError, PaymentGateway, PaymentUpdate};
pub use service::{CommandOutcome, GroupService};
pub use settlement::{PaymentTarget, SettlementCoupler};
pub use store::{GroupHandle, GroupStore, InMemoryGroupStore, StoreError};
pub use sweeper::Sweeper;
