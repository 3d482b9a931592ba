//! Scripted in-memory store shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{mpsc, oneshot, watch};

use crate::models::{normalize_report_order, Coordinate, NewReport, Report, ReportId};
use crate::store::{
    ChangeEvent, ChangeFeed, ChangeFilter, ChangeKind, ChannelHandle, RemoteStore, StoreError,
    StoreResult,
};

pub fn report(id: i64, zone: &str, seconds: i64) -> Report {
    Report {
        id: ReportId::new(id),
        zone: zone.to_string(),
        message: format!("mensaje {id}"),
        timestamp: Utc.timestamp_opt(seconds, 0).unwrap(),
        location: Some(Coordinate::new(-34.6, -58.4).unwrap()),
    }
}

/// A `list_reports` call held open until the test answers it.
pub type ListGate = oneshot::Sender<StoreResult<Vec<Report>>>;

#[derive(Default)]
pub struct FakeStore {
    reports: Mutex<Vec<Report>>,
    next_id: AtomicI64,
    pending_gates: Mutex<VecDeque<oneshot::Receiver<StoreResult<Vec<Report>>>>>,
    list_failures: Mutex<VecDeque<String>>,
    insert_failures: Mutex<VecDeque<String>>,
    subscribe_failures: Mutex<VecDeque<String>>,
    inserted: Mutex<Vec<NewReport>>,
    insert_hold: Mutex<Option<oneshot::Receiver<()>>>,
    feeds: Mutex<Vec<mpsc::Sender<ChangeEvent>>>,
    handles: Mutex<Vec<ChannelHandle>>,
    subscribe_calls: AtomicUsize,
    unsubscribe_calls: AtomicUsize,
    list_calls: ListCalls,
}

pub struct ListCalls(watch::Sender<usize>);

impl Default for ListCalls {
    fn default() -> Self {
        Self(watch::channel(0).0)
    }
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        })
    }

    pub fn with_reports(reports: Vec<Report>) -> Arc<Self> {
        let store = Self::new();
        let max_id = reports.iter().map(|r| r.id.get()).max().unwrap_or(0);
        store.next_id.store(max_id + 1, Ordering::SeqCst);
        *store.reports.lock().unwrap() = reports;
        store
    }

    /// Hold the next `count` listings open; answer them through the returned gates.
    pub fn gate_lists(&self, count: usize) -> Vec<ListGate> {
        let mut gates = Vec::with_capacity(count);
        let mut pending = self.pending_gates.lock().unwrap();
        for _ in 0..count {
            let (sender, receiver) = oneshot::channel();
            gates.push(sender);
            pending.push_back(receiver);
        }
        gates
    }

    pub fn fail_next_list(&self, message: &str) {
        self.list_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn fail_next_insert(&self, message: &str) {
        self.insert_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    pub fn fail_next_subscribe(&self, message: &str) {
        self.subscribe_failures
            .lock()
            .unwrap()
            .push_back(message.to_string());
    }

    /// Add a report as if another client had inserted it.
    pub fn push_remote(&self, report: Report) {
        self.reports.lock().unwrap().push(report);
    }

    pub fn inserted(&self) -> Vec<NewReport> {
        self.inserted.lock().unwrap().clone()
    }

    /// Keep the next insert pending, after it is recorded, until the sender fires.
    pub fn hold_next_insert(&self) -> oneshot::Sender<()> {
        let (sender, receiver) = oneshot::channel();
        *self.insert_hold.lock().unwrap() = Some(receiver);
        sender
    }

    /// Wait until at least `count` inserts have been recorded.
    pub async fn wait_for_inserts(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.inserted.lock().unwrap().len() < count {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("timed out waiting for inserts");
    }

    pub fn list_call_count(&self) -> usize {
        *self.list_calls.0.borrow()
    }

    /// Wait until at least `count` listings have been requested.
    pub async fn wait_for_list_calls(&self, count: usize) {
        let mut calls = self.list_calls.0.subscribe();
        tokio::time::timeout(Duration::from_secs(5), calls.wait_for(|seen| *seen >= count))
            .await
            .expect("timed out waiting for list calls")
            .expect("list call counter closed");
    }

    pub fn subscribe_calls(&self) -> usize {
        self.subscribe_calls.load(Ordering::SeqCst)
    }

    pub fn unsubscribe_calls(&self) -> usize {
        self.unsubscribe_calls.load(Ordering::SeqCst)
    }

    pub fn handles(&self) -> Vec<ChannelHandle> {
        self.handles.lock().unwrap().clone()
    }

    /// Push a notification into the most recently opened feed.
    pub async fn notify(&self, kind: ChangeKind) {
        let latest = self.feeds.lock().unwrap().len().checked_sub(1);
        if let Some(index) = latest {
            self.notify_feed(index, kind).await;
        }
    }

    /// Push a notification into the `index`-th feed opened so far.
    pub async fn notify_feed(&self, index: usize, kind: ChangeKind) {
        let feed = self.feeds.lock().unwrap().get(index).cloned();
        if let Some(feed) = feed {
            let _ = feed
                .send(ChangeEvent {
                    kind,
                    table: "reportes".to_string(),
                })
                .await;
        }
    }

    /// Simulate the store dropping every open channel.
    pub fn drop_feeds(&self) {
        self.feeds.lock().unwrap().clear();
    }
}

#[async_trait]
impl RemoteStore for FakeStore {
    async fn list_reports(&self) -> StoreResult<Vec<Report>> {
        self.list_calls.0.send_modify(|calls| *calls += 1);

        let gate = self.pending_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            return gate
                .await
                .unwrap_or_else(|_| Err(StoreError::Api("gate dropped".to_string())));
        }
        if let Some(message) = self.list_failures.lock().unwrap().pop_front() {
            return Err(StoreError::Api(message));
        }

        let mut reports = self.reports.lock().unwrap().clone();
        normalize_report_order(&mut reports);
        Ok(reports)
    }

    async fn insert_report(&self, report: &NewReport) -> StoreResult<Report> {
        if let Some(message) = self.insert_failures.lock().unwrap().pop_front() {
            return Err(StoreError::Api(message));
        }
        self.inserted.lock().unwrap().push(report.clone());
        let hold = self.insert_hold.lock().unwrap().take();
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        let id = ReportId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let created = report.clone().into_report(id);
        self.reports.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn subscribe(&self, filter: &ChangeFilter) -> StoreResult<ChangeFeed> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.subscribe_failures.lock().unwrap().pop_front() {
            return Err(StoreError::Realtime(message));
        }
        let (sender, events) = mpsc::channel(16);
        let (handle, _release) = ChannelHandle::new(filter.realtime_topic());
        self.feeds.lock().unwrap().push(sender);
        self.handles.lock().unwrap().push(handle.clone());
        Ok(ChangeFeed { events, handle })
    }

    async fn unsubscribe(&self, handle: &ChannelHandle) {
        self.unsubscribe_calls.fetch_add(1, Ordering::SeqCst);
        handle.release();
    }
}
