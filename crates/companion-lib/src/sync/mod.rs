//! Synchronization with the primary device
//!
//! This module provides:
//! - Single-flight guard for outbound refresh requests
//! - Coordinator deciding when to request fresh data
//! - Decoder from wire payloads to typed outcomes
//! - Authoritative data source for the nearby points of interest
//! - Tail-only row reconciler driving the list view and complication
//! - Serial worker tying them to the session events

mod coordinator;
mod decoder;
mod guard;
mod reconciler;
mod source;
mod worker;


pub use coordinator::{CoordinatorEvent, RefreshAttempt, SyncConfig, SyncCoordinator};
pub use decoder::{
    decode_push, decode_record, decode_reply, decode_status, encode_nearest, encode_reply,
    CategoryLookup, InboundPush, NearbyRequest, NoCategoryStyles, PeerPoi, SyncOutcome,
};
pub use guard::{InFlightGuard, InFlightToken};
pub use reconciler::{
    ComplicationRefresher, Presenter, ReconcileReport, Reconciler, Row, RowBuffer, RowOp,
    RowRenderer,
};
pub use source::{Applied, DataSource, DataSourceListener};
pub use worker::{SyncHandle, SyncInbox, SyncWorker, WorkerEvent};
