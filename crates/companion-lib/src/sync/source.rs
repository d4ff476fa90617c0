//! Authoritative store of the nearby points of interest
//!
//! All three inbound paths funnel into one of the `apply_*` entry points.
//! Listeners are told about list changes and nearest changes separately so
//! the list view and the complication can refresh independently.

use crate::models::{DataSourceState, PointOfInterestRecord, SyncStatus};
use tracing::debug;

/// Receives change notifications from the data source
pub trait DataSourceListener: Send {
    /// The displayed list (or its status) changed
    fn list_did_change(&mut self, state: &DataSourceState);

    /// The nearest point of interest changed
    fn nearest_did_change(&mut self, nearest: Option<&PointOfInterestRecord>);
}

/// What an update actually changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Applied {
    pub list_changed: bool,
    pub nearest_changed: bool,
}

pub struct DataSource {
    state: DataSourceState,
    listener: Box<dyn DataSourceListener>,
}

impl DataSource {
    pub fn new(listener: Box<dyn DataSourceListener>) -> Self {
        Self {
            state: DataSourceState::default(),
            listener,
        }
    }

    pub fn state(&self) -> &DataSourceState {
        &self.state
    }

    pub fn snapshot(&self) -> DataSourceState {
        self.state.clone()
    }

    /// Accept a successfully decoded result list
    pub fn apply_successful_sync(&mut self, records: Vec<PointOfInterestRecord>) -> Applied {
        let was_ok = self.state.status.is_ok();
        self.state.status = SyncStatus::Ok;
        self.state.error_detail.clear();

        if was_ok && records == self.state.current_list {
            debug!(count = records.len(), "Result list unchanged");
            return Applied::default();
        }

        let nearest = records.first().cloned();
        let nearest_changed = nearest != self.state.nearest;
        self.state.current_list = records;
        self.state.nearest = nearest;

        if nearest_changed {
            self.listener.nearest_did_change(self.state.nearest.as_ref());
        }
        self.listener.list_did_change(&self.state);

        Applied {
            list_changed: true,
            nearest_changed,
        }
    }

    /// Replace the content with an error state. Nearest listeners hear about
    /// it only if a nearest point was showing.
    pub fn apply_failure(&mut self, status: SyncStatus, detail: impl Into<String>) -> Applied {
        self.state.status = status;
        self.state.error_detail = detail.into();
        self.state.current_list.clear();
        let nearest_changed = self.state.nearest.take().is_some();

        if nearest_changed {
            self.listener.nearest_did_change(None);
        }
        self.listener.list_did_change(&self.state);

        Applied {
            list_changed: true,
            nearest_changed,
        }
    }

    /// Out-of-band "nearest changed" notification. Leaves the list alone.
    pub fn apply_nearest_push(&mut self, nearest: Option<PointOfInterestRecord>) -> Applied {
        if nearest == self.state.nearest {
            return Applied::default();
        }

        self.state.nearest = nearest;
        self.listener.nearest_did_change(self.state.nearest.as_ref());

        Applied {
            list_changed: false,
            nearest_changed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rgba;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Counts {
        list: usize,
        nearest: usize,
        last_nearest: Option<String>,
    }

    struct CountingListener(Arc<Mutex<Counts>>);

    impl DataSourceListener for CountingListener {
        fn list_did_change(&mut self, _state: &DataSourceState) {
            self.0.lock().unwrap().list += 1;
        }

        fn nearest_did_change(&mut self, nearest: Option<&PointOfInterestRecord>) {
            let mut counts = self.0.lock().unwrap();
            counts.nearest += 1;
            counts.last_nearest = nearest.map(|r| r.title.clone());
        }
    }

    fn source() -> (DataSource, Arc<Mutex<Counts>>) {
        let counts = Arc::new(Mutex::new(Counts::default()));
        let source = DataSource::new(Box::new(CountingListener(Arc::clone(&counts))));
        (source, counts)
    }

    fn record(title: &str, distance: &str) -> PointOfInterestRecord {
        PointOfInterestRecord {
            title: title.to_string(),
            distance: distance.to_string(),
            address: String::new(),
            phone_numbers: Vec::new(),
            category: None,
            color: Rgba::WHITE,
            coordinate: None,
        }
    }

    #[test]
    fn test_apply_same_list_twice_refreshes_once() {
        let (mut source, counts) = source();
        let list = vec![record("A", "100"), record("B", "200")];

        assert!(source.apply_successful_sync(list.clone()).list_changed);
        assert!(!source.apply_successful_sync(list).list_changed);

        assert_eq!(counts.lock().unwrap().list, 1);
    }

    #[test]
    fn test_nearest_change_detection() {
        let (mut source, counts) = source();
        let a = record("A", "100");
        let b = record("B", "200");
        let c = record("C", "50");

        source.apply_successful_sync(vec![a.clone(), b.clone()]);
        assert_eq!(counts.lock().unwrap().nearest, 1);

        source.apply_successful_sync(vec![a.clone(), b.clone()]);
        assert_eq!(counts.lock().unwrap().nearest, 1);

        let applied = source.apply_successful_sync(vec![c, b]);
        assert!(applied.nearest_changed);
        let counts = counts.lock().unwrap();
        assert_eq!(counts.nearest, 2);
        assert_eq!(counts.last_nearest.as_deref(), Some("C"));
        assert_eq!(source.state().nearest.as_ref().unwrap().title, "C");
    }

    #[test]
    fn test_tail_change_keeps_nearest() {
        let (mut source, counts) = source();
        source.apply_successful_sync(vec![record("A", "100"), record("B", "200")]);
        source.apply_successful_sync(vec![record("A", "100"), record("D", "300")]);

        let counts = counts.lock().unwrap();
        assert_eq!(counts.list, 2);
        assert_eq!(counts.nearest, 1);
    }

    #[test]
    fn test_failure_clears_list_and_always_notifies() {
        let (mut source, counts) = source();
        source.apply_successful_sync(vec![record("A", "100")]);

        let first = source.apply_failure(SyncStatus::LocalTransportSendFailed, "peer gone");
        let second = source.apply_failure(SyncStatus::LocalTransportSendFailed, "peer gone");

        let state = source.state();
        assert!(state.current_list.is_empty());
        assert!(state.nearest.is_none());
        assert_eq!(state.status, SyncStatus::LocalTransportSendFailed);
        assert_eq!(state.error_detail, "peer gone");

        // Nearest cleared once, list refreshed every time
        assert!(first.nearest_changed);
        assert!(!second.nearest_changed);
        let counts = counts.lock().unwrap();
        assert_eq!(counts.list, 3);
        assert_eq!(counts.nearest, 2);
        assert_eq!(counts.last_nearest, None);
    }

    #[test]
    fn test_empty_success_after_failure_refreshes() {
        let (mut source, counts) = source();
        source.apply_failure(SyncStatus::PeerLocationUnavailable, "");

        let applied = source.apply_successful_sync(Vec::new());
        assert!(applied.list_changed);
        assert_eq!(source.state().status, SyncStatus::Ok);
        assert_eq!(counts.lock().unwrap().list, 2);
    }

    #[test]
    fn test_nearest_push_does_not_touch_list() {
        let (mut source, counts) = source();
        source.apply_successful_sync(vec![record("A", "100"), record("B", "200")]);

        let applied = source.apply_nearest_push(Some(record("Z", "10")));
        assert_eq!(
            applied,
            Applied {
                list_changed: false,
                nearest_changed: true
            }
        );
        assert!(!source.apply_nearest_push(Some(record("Z", "10"))).nearest_changed);

        let state = source.state();
        assert_eq!(state.current_list.len(), 2);
        assert_eq!(state.nearest.as_ref().unwrap().title, "Z");

        let counts = counts.lock().unwrap();
        assert_eq!(counts.list, 1);
        assert_eq!(counts.nearest, 2);
    }
}
