//! Minimal row diff between the displayed list and a newly accepted list
//!
//! The peer returns lists sorted by increasing distance, so growth and
//! shrinkage are applied at the tail only. Rows are never moved; a row whose
//! content is unchanged is not touched.

use super::source::DataSourceListener;
use crate::models::{DataSourceState, PointOfInterestRecord, SyncStatus};
use crate::observability::SyncMetrics;
use std::ops::Range;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Row-level view operations
pub trait RowRenderer: Send {
    /// Replace everything with one message row
    fn show_placeholder(&mut self, message: &str);

    /// Replace everything with `count` blank rows
    fn reset_rows(&mut self, count: usize);

    fn insert_rows(&mut self, rows: Range<usize>);

    fn remove_rows(&mut self, rows: Range<usize>);

    fn update_row(&mut self, index: usize, record: &PointOfInterestRecord);
}

/// Reloads the at-a-glance complication timelines
pub trait ComplicationRefresher: Send {
    fn refresh_all(&mut self);
}

impl<F: FnMut() + Send> ComplicationRefresher for F {
    fn refresh_all(&mut self) {
        self()
    }
}

/// Operations issued during one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub placeholder: bool,
    pub reset: Option<usize>,
    pub inserted: Range<usize>,
    pub removed: Range<usize>,
    pub updated: Vec<usize>,
}

impl ReconcileReport {
    /// Whether any row was created, removed or rewritten
    pub fn touched(&self) -> bool {
        self.placeholder
            || self.reset.is_some()
            || !self.inserted.is_empty()
            || !self.removed.is_empty()
            || !self.updated.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Reconciler {
    displayed: Vec<PointOfInterestRecord>,
    showing_placeholder: bool,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn displayed(&self) -> &[PointOfInterestRecord] {
        &self.displayed
    }

    pub fn is_showing_placeholder(&self) -> bool {
        self.showing_placeholder
    }

    pub fn reconcile(
        &mut self,
        next: &[PointOfInterestRecord],
        status: SyncStatus,
        renderer: &mut dyn RowRenderer,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        if next.is_empty() {
            renderer.show_placeholder(status.message());
            self.displayed.clear();
            self.showing_placeholder = true;
            report.placeholder = true;
            return report;
        }

        if self.showing_placeholder {
            renderer.reset_rows(next.len());
            self.displayed.clear();
            self.showing_placeholder = false;
            report.reset = Some(next.len());
        } else {
            let previous = self.displayed.len();
            if next.len() > previous {
                report.inserted = previous..next.len();
                renderer.insert_rows(report.inserted.clone());
            } else if next.len() < previous {
                report.removed = next.len()..previous;
                renderer.remove_rows(report.removed.clone());
            }
        }

        for (index, record) in next.iter().enumerate() {
            if self.displayed.get(index) != Some(record) {
                renderer.update_row(index, record);
                report.updated.push(index);
            }
        }

        self.displayed = next.to_vec();
        report
    }
}

/// One rendered row
#[derive(Debug, Clone, PartialEq)]
pub enum Row {
    Blank,
    Placeholder(String),
    Poi(PointOfInterestRecord),
}

/// Operation log entry kept by `RowBuffer`
#[derive(Debug, Clone, PartialEq)]
pub enum RowOp {
    Placeholder(String),
    Reset(usize),
    Insert(Range<usize>),
    Remove(Range<usize>),
    Update(usize),
}

#[derive(Debug, Default)]
struct RowBufferInner {
    rows: Vec<Row>,
    ops: Vec<RowOp>,
}

/// In-memory row model. Clones share the same rows, so a clone kept outside
/// the presenter can inspect what was rendered.
#[derive(Debug, Clone, Default)]
pub struct RowBuffer {
    inner: Arc<Mutex<RowBufferInner>>,
}

impl RowBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<Row> {
        self.lock().rows.clone()
    }

    pub fn ops(&self) -> Vec<RowOp> {
        self.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RowBufferInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RowRenderer for RowBuffer {
    fn show_placeholder(&mut self, message: &str) {
        let mut inner = self.lock();
        inner.rows = vec![Row::Placeholder(message.to_string())];
        inner.ops.push(RowOp::Placeholder(message.to_string()));
    }

    fn reset_rows(&mut self, count: usize) {
        let mut inner = self.lock();
        inner.rows = vec![Row::Blank; count];
        inner.ops.push(RowOp::Reset(count));
    }

    fn insert_rows(&mut self, rows: Range<usize>) {
        let mut inner = self.lock();
        let at = rows.start.min(inner.rows.len());
        let blanks = std::iter::repeat(Row::Blank).take(rows.len());
        inner.rows.splice(at..at, blanks);
        inner.ops.push(RowOp::Insert(rows));
    }

    fn remove_rows(&mut self, rows: Range<usize>) {
        let mut inner = self.lock();
        let end = rows.end.min(inner.rows.len());
        let start = rows.start.min(end);
        inner.rows.drain(start..end);
        inner.ops.push(RowOp::Remove(rows));
    }

    fn update_row(&mut self, index: usize, record: &PointOfInterestRecord) {
        let mut inner = self.lock();
        if let Some(row) = inner.rows.get_mut(index) {
            *row = Row::Poi(record.clone());
        }
        inner.ops.push(RowOp::Update(index));
    }
}

/// Connects the data source to the list view and the complication
pub struct Presenter {
    reconciler: Reconciler,
    renderer: Box<dyn RowRenderer>,
    complication: Box<dyn ComplicationRefresher>,
    metrics: Option<SyncMetrics>,
}

impl Presenter {
    pub fn new(
        renderer: Box<dyn RowRenderer>,
        complication: Box<dyn ComplicationRefresher>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(),
            renderer,
            complication,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SyncMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

impl DataSourceListener for Presenter {
    fn list_did_change(&mut self, state: &DataSourceState) {
        let report =
            self.reconciler
                .reconcile(&state.current_list, state.status, self.renderer.as_mut());

        debug!(
            placeholder = report.placeholder,
            inserted = report.inserted.len(),
            removed = report.removed.len(),
            updated = report.updated.len(),
            touched = report.touched(),
            "Reconciled POI list"
        );

        if let Some(metrics) = &self.metrics {
            metrics.add_rows_touched(report.updated.len() as u64);
        }
    }

    fn nearest_did_change(&mut self, nearest: Option<&PointOfInterestRecord>) {
        debug!(
            nearest = nearest.map(|r| r.title.as_str()).unwrap_or("none"),
            "Refreshing complications"
        );
        self.complication.refresh_all();

        if let Some(metrics) = &self.metrics {
            metrics.inc_complication_refreshes();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rgba;

    fn record(title: &str) -> PointOfInterestRecord {
        PointOfInterestRecord {
            title: title.to_string(),
            distance: "100".to_string(),
            address: String::new(),
            phone_numbers: Vec::new(),
            category: None,
            color: Rgba::WHITE,
            coordinate: None,
        }
    }

    fn list(titles: &[&str]) -> Vec<PointOfInterestRecord> {
        titles.iter().map(|t| record(t)).collect()
    }

    #[test]
    fn test_growth_inserts_at_tail() {
        let mut reconciler = Reconciler::new();
        let mut rows = RowBuffer::new();
        reconciler.reconcile(&list(&["A", "B"]), SyncStatus::Ok, &mut rows);
        rows.clear_ops();

        let report = reconciler.reconcile(
            &list(&["A", "B", "C", "D", "E"]),
            SyncStatus::Ok,
            &mut rows,
        );

        assert_eq!(report.inserted, 2..5);
        assert!(report.removed.is_empty());
        assert_eq!(report.updated, vec![2, 3, 4]);
        assert_eq!(
            rows.ops(),
            vec![
                RowOp::Insert(2..5),
                RowOp::Update(2),
                RowOp::Update(3),
                RowOp::Update(4)
            ]
        );
        assert_eq!(rows.rows().len(), 5);
    }

    #[test]
    fn test_shrink_removes_tail_and_updates_changed() {
        let mut reconciler = Reconciler::new();
        let mut rows = RowBuffer::new();
        reconciler.reconcile(&list(&["A", "B", "C", "D"]), SyncStatus::Ok, &mut rows);
        rows.clear_ops();

        let report = reconciler.reconcile(&list(&["A", "X"]), SyncStatus::Ok, &mut rows);

        assert_eq!(report.removed, 2..4);
        assert_eq!(report.updated, vec![1]);
        assert_eq!(rows.ops(), vec![RowOp::Remove(2..4), RowOp::Update(1)]);
        assert_eq!(rows.rows(), vec![Row::Poi(record("A")), Row::Poi(record("X"))]);
    }

    #[test]
    fn test_shrink_to_empty_shows_placeholder() {
        let mut reconciler = Reconciler::new();
        let mut rows = RowBuffer::new();
        reconciler.reconcile(&list(&["A", "B", "C"]), SyncStatus::Ok, &mut rows);

        let report = reconciler.reconcile(&[], SyncStatus::LocalTransportSendFailed, &mut rows);

        assert!(report.placeholder);
        assert!(reconciler.displayed().is_empty());
        assert!(reconciler.is_showing_placeholder());
        assert_eq!(
            rows.rows(),
            vec![Row::Placeholder(
                SyncStatus::LocalTransportSendFailed.message().to_string()
            )]
        );
    }

    #[test]
    fn test_placeholder_replaced_by_fresh_list() {
        let mut reconciler = Reconciler::new();
        let mut rows = RowBuffer::new();
        reconciler.reconcile(&[], SyncStatus::Ok, &mut rows);
        rows.clear_ops();

        let report = reconciler.reconcile(&list(&["A", "B"]), SyncStatus::Ok, &mut rows);

        assert_eq!(report.reset, Some(2));
        assert!(report.inserted.is_empty());
        assert_eq!(report.updated, vec![0, 1]);
        assert_eq!(
            rows.ops(),
            vec![RowOp::Reset(2), RowOp::Update(0), RowOp::Update(1)]
        );
        assert!(!reconciler.is_showing_placeholder());
    }

    #[test]
    fn test_unchanged_list_touches_nothing() {
        let mut reconciler = Reconciler::new();
        let mut rows = RowBuffer::new();
        reconciler.reconcile(&list(&["A", "B"]), SyncStatus::Ok, &mut rows);
        rows.clear_ops();

        let report = reconciler.reconcile(&list(&["A", "B"]), SyncStatus::Ok, &mut rows);
        assert!(!report.touched());
        assert!(rows.ops().is_empty());
    }

    #[test]
    fn test_reorder_with_same_length_updates_in_place() {
        let mut reconciler = Reconciler::new();
        let mut rows = RowBuffer::new();
        reconciler.reconcile(&list(&["A", "B", "C"]), SyncStatus::Ok, &mut rows);
        rows.clear_ops();

        let report = reconciler.reconcile(&list(&["B", "A", "C"]), SyncStatus::Ok, &mut rows);
        assert_eq!(report.updated, vec![0, 1]);
        assert_eq!(rows.ops(), vec![RowOp::Update(0), RowOp::Update(1)]);
    }

    #[test]
    fn test_presenter_routes_notifications() {
        let rows = RowBuffer::new();
        let refreshes = Arc::new(Mutex::new(0usize));
        let counter = Arc::clone(&refreshes);
        let mut presenter = Presenter::new(
            Box::new(rows.clone()),
            Box::new(move || *counter.lock().unwrap() += 1),
        );

        let state = DataSourceState {
            current_list: list(&["A"]),
            nearest: Some(record("A")),
            ..Default::default()
        };
        presenter.list_did_change(&state);
        presenter.nearest_did_change(state.nearest.as_ref());

        assert_eq!(rows.rows(), vec![Row::Poi(record("A"))]);
        assert_eq!(*refreshes.lock().unwrap(), 1);
    }
}
