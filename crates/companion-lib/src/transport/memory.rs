//! In-memory linked pair of sessions
//!
//! Both ends share one `LinkState`. Reachability for an end is
//! `self activated && peer activated && connected`, recomputed after every
//! state change; changes are reported as events on each end's receiver.
//! An end may instead deliver into a caller-owned channel (`pair_into`),
//! so its events share one ordered queue with other producers.

use super::{ActivationState, Responder, Session, SessionEvent, TransportError};
use crate::models::Payload;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};

/// Where an end delivers its events. Returns false once the receiver is gone.
type EventSink = Box<dyn Fn(SessionEvent) -> bool + Send>;

fn sink<E>(events: mpsc::UnboundedSender<E>) -> EventSink
where
    E: From<SessionEvent> + Send + 'static,
{
    Box::new(move |event| events.send(E::from(event)).is_ok())
}

struct EndState {
    activation: ActivationState,
    reachable: bool,
    events: EventSink,
    pending_context: Option<Payload>,
    pending_guaranteed: VecDeque<Payload>,
}

impl EndState {
    fn new(events: EventSink) -> Self {
        Self {
            activation: ActivationState::NotActivated,
            reachable: false,
            events,
            pending_context: None,
            pending_guaranteed: VecDeque::new(),
        }
    }

    fn is_activated(&self) -> bool {
        self.activation == ActivationState::Activated
    }

    fn emit(&self, event: SessionEvent) -> bool {
        (self.events)(event)
    }
}

struct LinkState {
    ends: [EndState; 2],
    connected: bool,
}

impl LinkState {
    fn reachable(&self, end: usize) -> bool {
        self.connected && self.ends[end].is_activated() && self.ends[1 - end].is_activated()
    }

    fn deliverable(&self, end: usize) -> bool {
        self.connected && self.ends[end].is_activated()
    }

    /// Recompute reachability of both ends and deliver anything held back
    fn settle(&mut self) {
        for end in 0..2 {
            let reachable = self.reachable(end);
            if self.ends[end].reachable != reachable {
                self.ends[end].reachable = reachable;
                debug!(end, reachable, "Reachability changed");
                self.ends[end].emit(SessionEvent::ReachabilityChanged(reachable));
            }
        }
        for end in 0..2 {
            self.flush(end);
        }
    }

    fn flush(&mut self, end: usize) {
        if !self.deliverable(end) {
            return;
        }
        let state = &mut self.ends[end];
        if let Some(context) = state.pending_context.take() {
            state.emit(SessionEvent::ContextReceived(context));
        }
        while let Some(payload) = state.pending_guaranteed.pop_front() {
            state.emit(SessionEvent::GuaranteedReceived(payload));
        }
    }
}

/// Controls connectivity of a linked session pair
#[derive(Clone)]
pub struct MemoryLink {
    state: Arc<Mutex<LinkState>>,
}

/// One end of a linked pair: the session plus its event receiver
pub struct MemoryEndpoint {
    pub session: MemorySession,
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl MemoryLink {
    /// Create two connected, not yet activated sessions
    pub fn pair() -> (MemoryLink, MemoryEndpoint, MemoryEndpoint) {
        let (tx_a, rx_a) = mpsc::unbounded_channel::<SessionEvent>();
        let (link, session_a, b) = Self::pair_into(tx_a);
        let a = MemoryEndpoint {
            session: session_a,
            events: rx_a,
        };
        (link, a, b)
    }

    /// Like `pair`, but the first end delivers its events into `events`
    pub fn pair_into<E>(
        events: mpsc::UnboundedSender<E>,
    ) -> (MemoryLink, MemorySession, MemoryEndpoint)
    where
        E: From<SessionEvent> + Send + 'static,
    {
        let (tx_b, rx_b) = mpsc::unbounded_channel::<SessionEvent>();
        let state = Arc::new(Mutex::new(LinkState {
            ends: [EndState::new(sink(events)), EndState::new(sink(tx_b))],
            connected: true,
        }));

        let link = MemoryLink {
            state: Arc::clone(&state),
        };
        let a = MemorySession {
            end: 0,
            state: Arc::clone(&state),
        };
        let b = MemoryEndpoint {
            session: MemorySession { end: 1, state },
            events: rx_b,
        };
        (link, a, b)
    }

    /// Bring the devices in or out of range
    pub fn set_connected(&self, connected: bool) {
        let mut state = lock(&self.state);
        if state.connected == connected {
            return;
        }
        info!(connected, "Link connectivity changed");
        state.connected = connected;
        state.settle();
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }
}

/// Session backed by a shared in-memory link
#[derive(Clone)]
pub struct MemorySession {
    end: usize,
    state: Arc<Mutex<LinkState>>,
}

impl MemorySession {
    fn peer(&self) -> usize {
        1 - self.end
    }

    /// Simulate the process going away; inbound pushes are held until the
    /// next activation.
    pub fn deactivate(&self) {
        let mut state = lock(&self.state);
        if state.ends[self.end].activation != ActivationState::Activated {
            return;
        }
        state.ends[self.end].activation = ActivationState::Inactive;
        state.ends[self.end].emit(SessionEvent::ActivationCompleted {
            state: ActivationState::Inactive,
            error: None,
        });
        state.settle();
    }

    /// Number of guaranteed payloads waiting for this end
    pub fn pending_guaranteed(&self) -> usize {
        lock(&self.state).ends[self.end].pending_guaranteed.len()
    }
}

#[async_trait]
impl Session for MemorySession {
    fn activate(&self) {
        let mut state = lock(&self.state);
        if state.ends[self.end].is_activated() {
            return;
        }
        state.ends[self.end].activation = ActivationState::Activated;
        state.ends[self.end].emit(SessionEvent::ActivationCompleted {
            state: ActivationState::Activated,
            error: None,
        });
        state.settle();
    }

    fn activation_state(&self) -> ActivationState {
        lock(&self.state).ends[self.end].activation
    }

    fn is_reachable(&self) -> bool {
        lock(&self.state).reachable(self.end)
    }

    async fn send_request(&self, payload: Payload) -> Result<Payload, TransportError> {
        let rx = {
            let state = lock(&self.state);
            if !state.ends[self.end].is_activated() {
                return Err(TransportError::NotActivated);
            }
            if !state.reachable(self.end) {
                return Err(TransportError::NotReachable);
            }

            let (tx, rx) = oneshot::channel();
            let event = SessionEvent::RequestReceived {
                payload,
                responder: Responder::new(tx),
            };
            if !state.ends[self.peer()].emit(event) {
                return Err(TransportError::Disconnected);
            }
            rx
        };

        rx.await.map_err(|_| TransportError::NoReply)
    }

    fn push_latest(&self, payload: Payload) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if !state.ends[self.end].is_activated() {
            return Err(TransportError::NotActivated);
        }
        let peer = self.peer();
        state.ends[peer].pending_context = Some(payload);
        state.flush(peer);
        Ok(())
    }

    fn push_guaranteed(&self, payload: Payload) -> Result<(), TransportError> {
        let mut state = lock(&self.state);
        if !state.ends[self.end].is_activated() {
            return Err(TransportError::NotActivated);
        }
        let peer = self.peer();
        state.ends[peer].pending_guaranteed.push_back(payload);
        state.flush(peer);
        Ok(())
    }
}

fn lock(state: &Mutex<LinkState>) -> MutexGuard<'_, LinkState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
