//! Session channel to the peer device
//!
//! This module provides:
//! - The `Session` abstraction over an activatable, possibly unreachable channel
//! - Events emitted by a session (activation, reachability, inbound payloads)
//! - An in-memory linked pair of sessions for simulation and tests

mod memory;

pub use memory::{MemoryEndpoint, MemoryLink, MemorySession};

use crate::models::Payload;
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;

/// Activation state reported by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    NotActivated,
    Inactive,
    Activated,
}

impl ActivationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivationState::NotActivated => "not_activated",
            ActivationState::Inactive => "inactive",
            ActivationState::Activated => "activated",
        }
    }
}

/// Errors returned by session send operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Session is not activated")]
    NotActivated,

    #[error("Peer device is not reachable")]
    NotReachable,

    #[error("Peer dropped the request without replying")]
    NoReply,

    #[error("Peer session is gone")]
    Disconnected,

    #[error("No reply within {0:?}")]
    Timeout(Duration),
}

/// Answers a request received from the peer
pub struct Responder {
    tx: oneshot::Sender<Payload>,
}

impl Responder {
    pub fn new(tx: oneshot::Sender<Payload>) -> Self {
        Self { tx }
    }

    /// Send the reply. Returns false if the requester stopped waiting.
    pub fn reply(self, payload: Payload) -> bool {
        self.tx.send(payload).is_ok()
    }
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

/// Events delivered by a session, in order, on one receiver
#[derive(Debug)]
pub enum SessionEvent {
    /// Result of an `activate()` call or a later deactivation
    ActivationCompleted {
        state: ActivationState,
        error: Option<String>,
    },
    /// The peer became reachable or unreachable
    ReachabilityChanged(bool),
    /// Live request or push from the peer; answer through the responder
    RequestReceived {
        payload: Payload,
        responder: Responder,
    },
    /// Latest-snapshot context pushed by the peer
    ContextReceived(Payload),
    /// Payload queued by the peer for guaranteed delivery
    GuaranteedReceived(Payload),
}

/// Bidirectional session with the peer device
#[async_trait]
pub trait Session: Send + Sync {
    /// Start activation. Completion arrives as `SessionEvent::ActivationCompleted`.
    fn activate(&self);

    fn activation_state(&self) -> ActivationState;

    fn is_reachable(&self) -> bool;

    /// Send a request and wait for the reply.
    ///
    /// Fails without any transport attempt when the session is not activated
    /// or the peer is not reachable.
    async fn send_request(&self, payload: Payload) -> Result<Payload, TransportError>;

    /// Replace the latest snapshot seen by the peer. Older undelivered
    /// snapshots are dropped.
    fn push_latest(&self, payload: Payload) -> Result<(), TransportError>;

    /// Queue a payload that is delivered in order once the peer is active,
    /// even across unreachability and peer relaunch.
    fn push_guaranteed(&self, payload: Payload) -> Result<(), TransportError>;
}
