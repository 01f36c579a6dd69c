//! REST surface for the GroupBid service

mod handlers;
mod router;
mod state;

pub use router::create_router;
pub use state::AppState;
