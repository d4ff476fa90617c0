//! Serial sync worker
//!
//! Every session event and every coordinator result is handled here, one at
//! a time, in arrival order. Both kinds travel through one `SyncInbox`, so a
//! result posted after a push is applied after it. The worker is the only
//! owner of the data source; the rest of the process sees snapshots through a
//! watch channel.

use super::coordinator::{CoordinatorEvent, RefreshAttempt, SyncConfig, SyncCoordinator};
use super::decoder::{
    decode_push, decode_reply, CategoryLookup, InboundPush, NoCategoryStyles, SyncOutcome,
};
use super::source::{Applied, DataSource, DataSourceListener};
use crate::health::{components, HealthRegistry};
use crate::models::{DataSourceState, Payload, SyncStatus};
use crate::observability::{SyncLogger, SyncMetrics};
use crate::transport::{ActivationState, Session, SessionEvent};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

/// One entry in the worker's inbox
#[derive(Debug)]
pub enum WorkerEvent {
    Session(SessionEvent),
    Coordinator(CoordinatorEvent),
}

impl From<SessionEvent> for WorkerEvent {
    fn from(event: SessionEvent) -> Self {
        WorkerEvent::Session(event)
    }
}

impl From<CoordinatorEvent> for WorkerEvent {
    fn from(event: CoordinatorEvent) -> Self {
        WorkerEvent::Coordinator(event)
    }
}

/// Ordered queue feeding a `SyncWorker`. Hand `sender()` to the session
/// transport so its events land in the same queue as coordinator results.
pub struct SyncInbox {
    tx: mpsc::UnboundedSender<WorkerEvent>,
    rx: mpsc::UnboundedReceiver<WorkerEvent>,
}

impl SyncInbox {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<WorkerEvent> {
        self.tx.clone()
    }
}

impl Default for SyncInbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle for the rest of the process
#[derive(Clone)]
pub struct SyncHandle {
    coordinator: Arc<SyncCoordinator>,
    state: watch::Receiver<DataSourceState>,
}

impl SyncHandle {
    /// Explicit, caller-initiated refresh
    pub fn request_refresh(&self) -> RefreshAttempt {
        self.coordinator.request_refresh()
    }

    pub fn is_in_flight(&self) -> bool {
        self.coordinator.is_in_flight()
    }

    pub fn snapshot(&self) -> DataSourceState {
        self.state.borrow().clone()
    }

    /// Receiver that is notified after every data source update
    pub fn subscribe(&self) -> watch::Receiver<DataSourceState> {
        self.state.clone()
    }
}

pub struct SyncWorker {
    coordinator: Arc<SyncCoordinator>,
    source: DataSource,
    lookup: Arc<dyn CategoryLookup>,
    inbox: mpsc::UnboundedReceiver<WorkerEvent>,
    state_tx: watch::Sender<DataSourceState>,
    health: Option<HealthRegistry>,
    metrics: SyncMetrics,
    logger: SyncLogger,
}

impl SyncWorker {
    /// `session` must deliver its events into `inbox`. Must be called from
    /// within a Tokio runtime.
    pub fn new(
        session: Arc<dyn Session>,
        inbox: SyncInbox,
        listener: Box<dyn DataSourceListener>,
        config: SyncConfig,
    ) -> (Self, SyncHandle) {
        let SyncInbox { tx, rx } = inbox;
        let coordinator = Arc::new(SyncCoordinator::new(session, config, tx));
        let source = DataSource::new(listener);
        let (state_tx, state_rx) = watch::channel(source.snapshot());

        let worker = Self {
            coordinator: Arc::clone(&coordinator),
            source,
            lookup: Arc::new(NoCategoryStyles),
            inbox: rx,
            state_tx,
            health: None,
            metrics: SyncMetrics::new(),
            logger: SyncLogger::new("companion"),
        };
        let handle = SyncHandle {
            coordinator,
            state: state_rx,
        };
        (worker, handle)
    }

    pub fn with_category_lookup(mut self, lookup: Arc<dyn CategoryLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: SyncLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn state(&self) -> &DataSourceState {
        self.source.state()
    }

    /// Process events until shutdown or until the inbox closes
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!("Starting sync worker");

        loop {
            tokio::select! {
                more = self.step() => {
                    if !more {
                        info!("Inbox closed, stopping sync worker");
                        break;
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down sync worker");
                    break;
                }
            }
        }

        if let Some(health) = &self.health {
            health
                .set_unhealthy(components::COORDINATOR, "Sync worker stopped")
                .await;
        }
    }

    /// Wait for and handle the next event in the inbox. Returns false once
    /// every sender is gone.
    pub async fn step(&mut self) -> bool {
        match self.inbox.recv().await {
            Some(WorkerEvent::Session(event)) => {
                self.handle_session_event(event).await;
            }
            Some(WorkerEvent::Coordinator(event)) => {
                self.handle_coordinator_event(event).await;
            }
            None => return false,
        }
        true
    }

    pub async fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ActivationCompleted { state, error } => {
                if let Some(error) = &error {
                    warn!(error = %error, "Session activation reported an error");
                }
                let reachable = self.coordinator.session().is_reachable();
                self.logger.log_session_state(state, reachable);
                if state == ActivationState::Activated {
                    self.refresh();
                }
            }
            SessionEvent::ReachabilityChanged(reachable) => {
                let state = self.coordinator.session().activation_state();
                self.logger.log_session_state(state, reachable);
                if let Some(health) = &self.health {
                    health.record_reachability(reachable).await;
                }
                if reachable {
                    self.refresh();
                }
            }
            SessionEvent::RequestReceived { payload, responder } => {
                self.metrics.inc_pushes_received("message");
                self.apply_push(&payload).await;
                if !responder.reply(Payload::new()) {
                    debug!("Peer stopped waiting for push acknowledgement");
                }
            }
            SessionEvent::ContextReceived(payload) => {
                self.metrics.inc_pushes_received("context");
                self.apply_push(&payload).await;
            }
            SessionEvent::GuaranteedReceived(payload) => {
                self.metrics.inc_pushes_received("guaranteed");
                self.apply_push(&payload).await;
            }
        }
    }

    pub async fn handle_coordinator_event(&mut self, event: CoordinatorEvent) {
        match event {
            CoordinatorEvent::Reply {
                token,
                sent_at,
                result,
            } => {
                drop(token);
                self.metrics.set_in_flight(false);
                self.metrics
                    .observe_reply_latency(sent_at.elapsed().as_secs_f64());
                if let Some(health) = &self.health {
                    health.record_reply(result.as_ref().err()).await;
                }

                match result {
                    Ok(payload) => {
                        let outcome = decode_reply(&payload, self.lookup.as_ref());
                        let detail = failure_detail(&outcome);
                        self.apply_outcome(outcome, detail).await;
                    }
                    Err(error) => {
                        self.apply_outcome(
                            SyncOutcome::Failure(SyncStatus::LocalTransportSendFailed),
                            error.to_string(),
                        )
                        .await;
                    }
                }
            }
            CoordinatorEvent::Failure { status, detail } => {
                self.apply_outcome(SyncOutcome::Failure(status), detail)
                    .await;
            }
        }
    }

    fn refresh(&self) {
        if self.coordinator.request_refresh() == RefreshAttempt::Sent {
            let config = self.coordinator.config();
            self.logger
                .log_sync_started(config.max_radius_km, config.max_results);
        }
    }

    async fn apply_push(&mut self, payload: &Payload) {
        match decode_push(payload, self.lookup.as_ref()) {
            InboundPush::Result(outcome) => {
                let detail = failure_detail(&outcome);
                self.apply_outcome(outcome, detail).await;
            }
            InboundPush::Nearest(nearest) => {
                let applied = self.source.apply_nearest_push(nearest);
                self.log_nearest(applied);
                self.publish();
            }
        }
    }

    async fn apply_outcome(&mut self, outcome: SyncOutcome, detail: String) {
        let status = outcome.status();
        let applied = match outcome {
            SyncOutcome::Success(records) => self.source.apply_successful_sync(records),
            SyncOutcome::Failure(status) => {
                self.metrics.inc_failures(status);
                self.source.apply_failure(status, detail.as_str())
            }
        };

        if applied.list_changed {
            self.logger
                .log_sync_outcome(status, self.source.state().current_list.len(), &detail);
        }
        self.log_nearest(applied);

        if let Some(health) = &self.health {
            health.record_sync_status(status).await;
        }
        self.publish();
    }

    fn log_nearest(&self, applied: Applied) {
        if applied.nearest_changed {
            let nearest = self.source.state().nearest.as_ref();
            self.logger
                .log_nearest_changed(nearest.map(|r| r.title.as_str()));
        }
    }

    fn publish(&self) {
        let snapshot = self.source.snapshot();
        self.metrics.set_pois_current(snapshot.current_list.len());
        self.state_tx.send_replace(snapshot);
    }
}

fn failure_detail(outcome: &SyncOutcome) -> String {
    match outcome {
        SyncOutcome::Success(_) => String::new(),
        SyncOutcome::Failure(status) => status.message().to_string(),
    }
}
