//! Companion-device sync library
//!
//! This crate provides the core functionality for:
//! - A session abstraction over the intermittently reachable peer channel
//! - Single-flight refresh requests and reply decoding
//! - One authoritative store of the nearby points of interest
//! - Minimal row diffs and complication refreshes
//! - Health checks and observability

pub mod health;
pub mod models;
pub mod observability;
pub mod peer;
pub mod sync;
pub mod transport;

pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{SyncLogger, SyncMetrics};
