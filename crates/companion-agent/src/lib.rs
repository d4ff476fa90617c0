//! Companion agent
//!
//! HTTP surface and configuration for the long-running companion process.

pub mod api;
pub mod config;
