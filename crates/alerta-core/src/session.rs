//! One client's view of the shared report map.

use std::sync::Arc;
use std::time::Duration;

use crate::cache::ReportCache;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::location::{DeviceLocator, LocationSelector};
use crate::store::{ChangeFilter, RemoteStore, SupabaseStore};
use crate::submission::SubmissionCoordinator;
use crate::subscription::SubscriptionManager;

/// Wires the cache, the change subscription, the location selector and the
/// submission coordinator to one store.
///
/// Dropping the session releases the change channel.
pub struct ReportSession {
    cache: Arc<ReportCache>,
    subscription: SubscriptionManager,
    location: Arc<LocationSelector>,
    submission: SubmissionCoordinator,
}

impl ReportSession {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        locator: Arc<dyn DeviceLocator>,
        filter: ChangeFilter,
        reopen_delay: Duration,
    ) -> Self {
        let cache = Arc::new(ReportCache::new(store.clone()));
        let location = Arc::new(LocationSelector::new(locator));
        Self {
            subscription: SubscriptionManager::new(store.clone(), cache.clone(), filter, reopen_delay),
            submission: SubmissionCoordinator::new(store, location.clone()),
            cache,
            location,
        }
    }

    /// Session backed by the Supabase project in `config`.
    pub fn connect(config: StoreConfig, locator: Arc<dyn DeviceLocator>) -> Result<Self> {
        let filter = ChangeFilter::all_events(config.schema.clone(), config.reports_table.clone());
        let reopen_delay = config.reopen_delay;
        let store = SupabaseStore::new(config).map_err(|error| Error::Config(error.to_string()))?;
        Ok(Self::new(Arc::new(store), locator, filter, reopen_delay))
    }

    /// Load the reports, then start listening for changes.
    ///
    /// The subscription is attempted even when the first load fails, so the
    /// next notification can still fill the cache. The load error wins if
    /// both fail.
    pub async fn start(&self) -> Result<()> {
        let loaded = self.cache.reload().await;
        let opened = self.subscription.open().await;
        loaded?;
        opened
    }

    /// Stop listening for changes. The cache keeps its last contents.
    pub async fn shutdown(&self) {
        self.subscription.close().await;
    }

    pub fn cache(&self) -> &Arc<ReportCache> {
        &self.cache
    }

    pub const fn subscription(&self) -> &SubscriptionManager {
        &self.subscription
    }

    pub fn location(&self) -> &Arc<LocationSelector> {
        &self.location
    }

    pub const fn submission(&self) -> &SubmissionCoordinator {
        &self.submission
    }
}
