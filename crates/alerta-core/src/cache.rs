//! Local, ordered view of the remote report collection.
//!
//! The cache is only ever replaced wholesale by a reload. Each reload takes a
//! ticket when it is triggered and may only publish if no later-triggered
//! reload has published first, so a slow stale fetch can never overwrite a
//! newer listing.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::models::{normalize_report_order, Report};
use crate::state::SyncStatus;
use crate::store::RemoteStore;

/// Immutable, shareable view of the cache at one point in time.
pub type ReportSnapshot = Arc<[Report]>;

/// What happened to a reload's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// The fetched listing replaced the cache
    Applied { count: usize },
    /// A later-triggered reload had already published; this result was dropped
    Superseded,
    /// The reload's owner went away before it finished; this result was dropped
    Cancelled,
}

pub struct ReportCache {
    store: Arc<dyn RemoteStore>,
    reports: watch::Sender<ReportSnapshot>,
    status: watch::Sender<SyncStatus>,
    issued: AtomicU64,
    /// Ticket of the reload whose result is currently published
    published: Mutex<u64>,
    /// Reloads started and not yet finished, cancelled or dropped
    running: AtomicUsize,
}

/// Marks the cache as syncing while at least one reload is running.
struct Running<'a> {
    cache: &'a ReportCache,
}

impl<'a> Running<'a> {
    fn start(cache: &'a ReportCache) -> Self {
        cache.running.fetch_add(1, Ordering::SeqCst);
        cache.status.send_modify(SyncStatus::syncing);
        Self { cache }
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        if self.cache.running.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.cache.status.send_if_modified(SyncStatus::settle);
        }
    }
}

impl ReportCache {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        let empty: ReportSnapshot = Arc::from(Vec::new());
        Self {
            store,
            reports: watch::channel(empty).0,
            status: watch::channel(SyncStatus::default()).0,
            issued: AtomicU64::new(0),
            published: Mutex::new(0),
            running: AtomicUsize::new(0),
        }
    }

    /// Current reports, newest first.
    pub fn snapshot(&self) -> ReportSnapshot {
        self.reports.borrow().clone()
    }

    /// Receiver that observes every published snapshot.
    pub fn watch(&self) -> watch::Receiver<ReportSnapshot> {
        self.reports.subscribe()
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Fetch the full collection and replace the cache with it.
    ///
    /// The reload's position in the ordering is fixed when this is called, not
    /// when the returned future is first polled.
    pub fn reload(&self) -> impl Future<Output = Result<ReloadOutcome>> + Send + '_ {
        self.reload_while(|| true)
    }

    /// Like [`ReportCache::reload`], but drops the result if `still_wanted`
    /// returns `false` once the fetch completes.
    ///
    /// A dropped result leaves the status as the last finished reload set it.
    pub(crate) fn reload_while<F>(
        &self,
        still_wanted: F,
    ) -> impl Future<Output = Result<ReloadOutcome>> + Send + '_
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            let _running = Running::start(self);
            let fetched = self.store.list_reports().await;

            if !still_wanted() {
                tracing::debug!("Discarding reload #{} after its owner closed", ticket);
                return Ok(ReloadOutcome::Cancelled);
            }

            match fetched {
                Ok(reports) => Ok(self.publish(ticket, reports)),
                Err(error) => {
                    if self.published_ticket() > ticket {
                        tracing::debug!("Ignoring failure of superseded reload #{}", ticket);
                        return Ok(ReloadOutcome::Superseded);
                    }
                    tracing::warn!("Failed to reload reports: {}", error);
                    self.status
                        .send_modify(|status| status.failed(error.to_string()));
                    Err(Error::Fetch(error))
                }
            }
        }
    }

    fn publish(&self, ticket: u64, mut reports: Vec<Report>) -> ReloadOutcome {
        let mut published = self.published.lock().unwrap_or_else(PoisonError::into_inner);
        if *published > ticket {
            tracing::debug!(
                "Dropping reload #{} superseded by #{}",
                ticket,
                *published
            );
            return ReloadOutcome::Superseded;
        }

        normalize_report_order(&mut reports);
        let count = reports.len();
        self.reports.send_replace(Arc::from(reports));
        *published = ticket;
        drop(published);

        self.status.send_modify(|status| status.synced(Utc::now()));
        tracing::debug!("Reload #{} published {} reports", ticket, count);
        ReloadOutcome::Applied { count }
    }

    fn published_ticket(&self) -> u64 {
        *self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
