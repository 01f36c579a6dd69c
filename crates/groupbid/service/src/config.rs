//! Configuration for the GroupBid service

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Sweeper configuration
    #[serde(default)]
    pub sweeper: SweeperConfig,

    /// Settlement configuration
    #[serde(default)]
    pub settlement: SettlementConfig,

    /// Event broadcast channel capacity
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            sweeper: SweeperConfig::default(),
            settlement: SettlementConfig::default(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    pub listen_addr: SocketAddr,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".parse().unwrap(),
            enable_cors: true,
        }
    }
}

/// Background sweeper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    /// Sweep interval in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Clock-skew grace window in seconds. A deadline is only enforced
    /// by the sweeper once it is this far in the past, so a sweep never
    /// races a concurrently-written extension.
    #[serde(default = "default_grace")]
    pub grace_secs: u64,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            grace_secs: default_grace(),
        }
    }
}

/// Settlement / payment coupling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// How long a pending acceptance may wait for payment confirmation
    /// before it is auto-failed, in seconds
    #[serde(default = "default_payment_window")]
    pub payment_window_secs: u64,

    /// Maximum payment attempts per acceptance before it is surfaced for
    /// manual intervention
    #[serde(default = "default_max_attempts")]
    pub max_payment_attempts: u32,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            payment_window_secs: default_payment_window(),
            max_payment_attempts: default_max_attempts(),
        }
    }
}

// Default value helpers

fn default_true() -> bool {
    true
}

fn default_event_capacity() -> usize {
    1024
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_grace() -> u64 {
    30
}

fn default_payment_window() -> u64 {
    15 * 60
}

fn default_max_attempts() -> u32 {
    3
}
