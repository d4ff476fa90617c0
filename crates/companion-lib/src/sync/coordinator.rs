//! Decides when to ask the peer for fresh data
//!
//! `request_refresh` may be called from any task or thread. Preconditions are
//! checked in a fixed order: activation, reachability, then the in-flight
//! guard. The reply (or transport error) is posted back to the sync worker
//! together with the guard token, so the guard stays held until the worker
//! has seen it.
//! Results go into the worker's single inbox, behind any session event that
//! arrived first.

use super::decoder::NearbyRequest;
use super::guard::{InFlightGuard, InFlightToken};
use super::worker::WorkerEvent;
use crate::models::{Payload, SyncStatus};
use crate::observability::SyncMetrics;
use crate::transport::{ActivationState, Session, TransportError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for refresh requests
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Search radius sent to the peer, in kilometers
    pub max_radius_km: f64,
    /// Maximum number of points of interest requested
    pub max_results: u32,
    /// Upper bound on waiting for a reply. `None` waits for the transport.
    pub reply_timeout: Option<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_radius_km: 10.0,
            max_results: 10,
            reply_timeout: None,
        }
    }
}

impl SyncConfig {
    pub fn new(max_radius_km: f64, max_results: u32) -> Self {
        Self {
            max_radius_km,
            max_results,
            ..Default::default()
        }
    }

    pub fn with_reply_timeout(mut self, timeout: Duration) -> Self {
        self.reply_timeout = Some(timeout);
        self
    }

    pub fn request(&self) -> NearbyRequest {
        NearbyRequest {
            max_radius: self.max_radius_km,
            max_results: self.max_results,
        }
    }
}

/// What `request_refresh` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshAttempt {
    /// Session not activated; nothing reported
    NotActivated,
    /// Peer unreachable; a transport failure was reported
    Unreachable,
    /// Another request is still awaiting its reply
    AlreadyInFlight,
    /// Request dispatched
    Sent,
}

/// Results posted from the coordinator to the sync worker
#[derive(Debug)]
pub enum CoordinatorEvent {
    Reply {
        token: InFlightToken,
        sent_at: Instant,
        result: Result<Payload, TransportError>,
    },
    Failure {
        status: SyncStatus,
        detail: String,
    },
}

pub struct SyncCoordinator {
    session: Arc<dyn Session>,
    guard: InFlightGuard,
    config: SyncConfig,
    events: mpsc::UnboundedSender<WorkerEvent>,
    runtime: Handle,
    metrics: SyncMetrics,
}

impl SyncCoordinator {
    /// Must be called from within a Tokio runtime. Sends are spawned on that
    /// runtime, so `request_refresh` also works from threads outside it.
    pub fn new(
        session: Arc<dyn Session>,
        config: SyncConfig,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        Self {
            session,
            guard: InFlightGuard::new(),
            config,
            events,
            runtime: Handle::current(),
            metrics: SyncMetrics::new(),
        }
    }

    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn is_in_flight(&self) -> bool {
        self.guard.is_held()
    }

    /// Ask the peer for fresh data if nothing is already in flight
    pub fn request_refresh(&self) -> RefreshAttempt {
        if self.session.activation_state() != ActivationState::Activated {
            warn!("Refresh skipped, session is not activated");
            return RefreshAttempt::NotActivated;
        }

        if !self.session.is_reachable() {
            debug!("Refresh failed, peer is not reachable");
            self.post(CoordinatorEvent::Failure {
                status: SyncStatus::LocalTransportSendFailed,
                detail: TransportError::NotReachable.to_string(),
            });
            return RefreshAttempt::Unreachable;
        }

        let Some(token) = self.guard.try_acquire() else {
            debug!("Refresh skipped, request already in flight");
            return RefreshAttempt::AlreadyInFlight;
        };

        let request = self.config.request();
        info!(
            max_radius_km = request.max_radius,
            max_results = request.max_results,
            "Sending refresh request"
        );
        self.metrics.inc_requests_sent();
        self.metrics.set_in_flight(true);

        let session = Arc::clone(&self.session);
        let events = self.events.clone();
        let reply_timeout = self.config.reply_timeout;
        self.runtime.spawn(async move {
            let sent_at = Instant::now();
            let send = session.send_request(request.to_payload());
            let result = match reply_timeout {
                Some(limit) => tokio::time::timeout(limit, send)
                    .await
                    .unwrap_or(Err(TransportError::Timeout(limit))),
                None => send.await,
            };

            // If the worker is gone the token is dropped here, which is fine
            let reply = CoordinatorEvent::Reply {
                token,
                sent_at,
                result,
            };
            if events.send(WorkerEvent::Coordinator(reply)).is_err()
            {
                debug!("Sync worker stopped before reply was handled");
            }
        });

        RefreshAttempt::Sent
    }

    fn post(&self, event: CoordinatorEvent) {
        if self.events.send(WorkerEvent::Coordinator(event)).is_err() {
            debug!("Sync worker stopped, dropping coordinator event");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Session double with scripted replies and a send counter
    pub(crate) struct ScriptedSession {
        activation: Mutex<ActivationState>,
        reachable: AtomicBool,
        sends: AtomicUsize,
        sent: Mutex<Vec<Payload>>,
        replies: tokio::sync::Mutex<mpsc::UnboundedReceiver<Result<Payload, TransportError>>>,
    }

    impl ScriptedSession {
        pub(crate) fn new() -> (Arc<Self>, mpsc::UnboundedSender<Result<Payload, TransportError>>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let session = Arc::new(Self {
                activation: Mutex::new(ActivationState::Activated),
                reachable: AtomicBool::new(true),
                sends: AtomicUsize::new(0),
                sent: Mutex::new(Vec::new()),
                replies: tokio::sync::Mutex::new(rx),
            });
            (session, tx)
        }

        pub(crate) fn set_activation(&self, state: ActivationState) {
            *self.activation.lock().unwrap() = state;
        }

        pub(crate) fn set_reachable(&self, reachable: bool) {
            self.reachable.store(reachable, Ordering::SeqCst);
        }

        pub(crate) fn sends(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }

        pub(crate) fn sent(&self) -> Vec<Payload> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        fn activate(&self) {
            self.set_activation(ActivationState::Activated);
        }

        fn activation_state(&self) -> ActivationState {
            *self.activation.lock().unwrap()
        }

        fn is_reachable(&self) -> bool {
            self.reachable.load(Ordering::SeqCst)
        }

        async fn send_request(&self, payload: Payload) -> Result<Payload, TransportError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            self.sent.lock().unwrap().push(payload);
            let mut replies = self.replies.lock().await;
            replies.recv().await.unwrap_or(Err(TransportError::Disconnected))
        }

        fn push_latest(&self, _payload: Payload) -> Result<(), TransportError> {
            Ok(())
        }

        fn push_guaranteed(&self, _payload: Payload) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn coordinator(
        session: Arc<ScriptedSession>,
        config: SyncConfig,
    ) -> (SyncCoordinator, mpsc::UnboundedReceiver<WorkerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SyncCoordinator::new(session, config, tx), rx)
    }

    fn unwrap_coordinator(event: WorkerEvent) -> CoordinatorEvent {
        match event {
            WorkerEvent::Coordinator(event) => event,
            other => panic!("unexpected event: {:?}", other),
        }
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<WorkerEvent>) -> CoordinatorEvent {
        unwrap_coordinator(events.recv().await.unwrap())
    }

    #[tokio::test]
    async fn test_not_activated_is_silent_noop() {
        let (session, _replies) = ScriptedSession::new();
        session.set_activation(ActivationState::NotActivated);
        let (coordinator, mut events) = coordinator(session.clone(), SyncConfig::default());

        assert_eq!(coordinator.request_refresh(), RefreshAttempt::NotActivated);
        assert!(events.try_recv().is_err());
        assert_eq!(session.sends(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_reports_failure_without_sending() {
        let (session, _replies) = ScriptedSession::new();
        session.set_reachable(false);
        let (coordinator, mut events) = coordinator(session.clone(), SyncConfig::default());

        assert_eq!(coordinator.request_refresh(), RefreshAttempt::Unreachable);
        tokio::task::yield_now().await;

        match events.try_recv().map(unwrap_coordinator) {
            Ok(CoordinatorEvent::Failure { status, .. }) => {
                assert_eq!(status, SyncStatus::LocalTransportSendFailed)
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(session.sends(), 0);
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn test_single_flight() {
        let (session, replies) = ScriptedSession::new();
        let (coordinator, mut events) = coordinator(session.clone(), SyncConfig::default());

        assert_eq!(coordinator.request_refresh(), RefreshAttempt::Sent);
        assert_eq!(coordinator.request_refresh(), RefreshAttempt::AlreadyInFlight);
        assert!(coordinator.is_in_flight());

        replies.send(Ok(Payload::new())).unwrap();
        let event = next(&mut events).await;
        assert_eq!(session.sends(), 1);

        // Guard is released only once the reply has been handled
        assert!(coordinator.is_in_flight());
        drop(event);
        assert!(!coordinator.is_in_flight());

        assert_eq!(coordinator.request_refresh(), RefreshAttempt::Sent);
    }

    #[tokio::test]
    async fn test_request_payload_shape() {
        let (session, replies) = ScriptedSession::new();
        let (coordinator, mut events) = coordinator(session.clone(), SyncConfig::default());

        coordinator.request_refresh();
        replies.send(Ok(Payload::new())).unwrap();
        next(&mut events).await;

        let sent = session.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(
            NearbyRequest::from_payload(&sent[0]),
            Some(NearbyRequest {
                max_radius: 10.0,
                max_results: 10
            })
        );
    }

    #[tokio::test]
    async fn test_transport_error_is_forwarded() {
        let (session, replies) = ScriptedSession::new();
        let (coordinator, mut events) = coordinator(session.clone(), SyncConfig::default());

        coordinator.request_refresh();
        replies.send(Err(TransportError::NoReply)).unwrap();

        match next(&mut events).await {
            CoordinatorEvent::Reply { result, .. } => {
                assert_eq!(result, Err(TransportError::NoReply))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_timeout_releases_guard() {
        let (session, _replies) = ScriptedSession::new();
        let config = SyncConfig::default().with_reply_timeout(Duration::from_secs(5));
        let (coordinator, mut events) = coordinator(session.clone(), config);

        coordinator.request_refresh();
        match next(&mut events).await {
            CoordinatorEvent::Reply { result, .. } => {
                assert_eq!(result, Err(TransportError::Timeout(Duration::from_secs(5))))
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(!coordinator.is_in_flight());
    }

    #[tokio::test]
    async fn test_refresh_from_thread_outside_runtime() {
        let (session, replies) = ScriptedSession::new();
        let (coordinator, mut events) = coordinator(session.clone(), SyncConfig::default());
        let coordinator = Arc::new(coordinator);

        let remote = Arc::clone(&coordinator);
        let attempt = std::thread::spawn(move || remote.request_refresh())
            .join()
            .unwrap();
        assert_eq!(attempt, RefreshAttempt::Sent);

        replies.send(Ok(Payload::new())).unwrap();
        match next(&mut events).await {
            CoordinatorEvent::Reply { result, .. } => assert_eq!(result, Ok(Payload::new())),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(session.sends(), 1);
        assert!(!coordinator.is_in_flight());
    }
}
