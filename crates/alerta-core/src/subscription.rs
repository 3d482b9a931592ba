//! Live change subscription that keeps the report cache fresh.
//!
//! While open, every change notification turns into a full cache reload. The
//! notification payload is never applied directly. Reloads run on a single
//! worker fed by a one-slot queue, so a burst of notifications costs at most
//! one reload in flight plus one pending.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::cache::{ReloadOutcome, ReportCache};
use crate::error::{Error, Result};
use crate::store::{ChangeEvent, ChangeFilter, ChannelHandle, RemoteStore};

/// Lifecycle of the change channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SubscriptionState {
    #[default]
    Closed,
    /// Waiting for the store to confirm the channel, either on first open or
    /// after the store dropped it
    Opening,
    Open,
}

pub struct SubscriptionManager {
    shared: Arc<Shared>,
}

struct Shared {
    store: Arc<dyn RemoteStore>,
    cache: Arc<ReportCache>,
    filter: ChangeFilter,
    reopen_delay: Duration,
    state: watch::Sender<SubscriptionState>,
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    handle: Option<ChannelHandle>,
    /// Present while a subscription is wanted; flipped to `true` on close
    cancel: Option<watch::Sender<bool>>,
    /// Bumped on every `open()` so tasks from an earlier subscription stand down
    epoch: u64,
}

impl SubscriptionManager {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        cache: Arc<ReportCache>,
        filter: ChangeFilter,
        reopen_delay: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                cache,
                filter,
                reopen_delay,
                state: watch::channel(SubscriptionState::Closed).0,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn state(&self) -> SubscriptionState {
        *self.shared.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.shared.state.subscribe()
    }

    /// Open the change channel. A no-op unless the manager is closed.
    ///
    /// If `close()` runs while the store is still confirming the channel, the
    /// channel is released as soon as it arrives and this returns `Ok`.
    pub async fn open(&self) -> Result<()> {
        let (epoch, cancel) = {
            let mut inner = self.shared.lock();
            if *self.shared.state.borrow() != SubscriptionState::Closed {
                return Ok(());
            }
            inner.epoch += 1;
            let (sender, receiver) = watch::channel(false);
            inner.cancel = Some(sender);
            self.shared.state.send_replace(SubscriptionState::Opening);
            (inner.epoch, receiver)
        };

        match self.shared.store.subscribe(&self.shared.filter).await {
            Ok(feed) => {
                if !self.shared.install(epoch, &feed.handle) {
                    self.shared.store.unsubscribe(&feed.handle).await;
                    return Ok(());
                }
                tracing::info!("Listening for changes on {}", feed.handle.topic());
                tokio::spawn(pump(self.shared.clone(), feed.events, cancel, epoch));
                Ok(())
            }
            Err(error) => {
                tracing::warn!("Failed to open change channel: {}", error);
                self.shared.abandon(epoch);
                Err(Error::Subscription(error))
            }
        }
    }

    /// Release the channel and stop reacting to notifications. Idempotent.
    ///
    /// A reload already in flight finishes but its result is discarded.
    pub async fn close(&self) {
        if let Some(handle) = self.shared.teardown() {
            self.shared.store.unsubscribe(&handle).await;
            tracing::info!("Stopped listening for changes on {}", handle.topic());
        }
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.shared.teardown() {
            handle.release();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a freshly opened channel. Returns `false` if the subscription
    /// it was opened for has since been closed or replaced.
    fn install(&self, epoch: u64, handle: &ChannelHandle) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch || inner.cancel.is_none() {
            return false;
        }
        inner.handle = Some(handle.clone());
        self.state.send_replace(SubscriptionState::Open);
        true
    }

    fn abandon(&self, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        if let Some(cancel) = inner.cancel.take() {
            cancel.send_replace(true);
        }
        self.state.send_replace(SubscriptionState::Closed);
    }

    fn teardown(&self) -> Option<ChannelHandle> {
        let mut inner = self.lock();
        if let Some(cancel) = inner.cancel.take() {
            cancel.send_replace(true);
        }
        self.state.send_if_modified(|state| {
            let changed = *state != SubscriptionState::Closed;
            *state = SubscriptionState::Closed;
            changed
        });
        inner.handle.take()
    }

    /// Move to `Opening` after the store dropped the channel and keep asking
    /// for a new one, `reopen_delay` apart, until it opens or we are closed.
    async fn reopen(
        &self,
        epoch: u64,
        cancel: &mut watch::Receiver<bool>,
    ) -> Option<mpsc::Receiver<ChangeEvent>> {
        {
            let mut inner = self.lock();
            if inner.epoch != epoch || inner.cancel.is_none() {
                return None;
            }
            if let Some(stale) = inner.handle.take() {
                stale.release();
            }
            self.state.send_replace(SubscriptionState::Opening);
        }
        tracing::warn!(
            "Change channel dropped by the store; re-opening every {:?}",
            self.reopen_delay
        );

        loop {
            tokio::select! {
                _ = cancel.changed() => return None,
                () = tokio::time::sleep(self.reopen_delay) => {}
            }

            match self.store.subscribe(&self.filter).await {
                Ok(feed) => {
                    if !self.install(epoch, &feed.handle) {
                        self.store.unsubscribe(&feed.handle).await;
                        return None;
                    }
                    tracing::info!("Change channel {} re-opened", feed.handle.topic());
                    return Some(feed.events);
                }
                Err(error) => tracing::warn!("Re-opening change channel failed: {}", error),
            }
        }
    }
}

/// Forward notifications to the reload worker until closed.
async fn pump(
    shared: Arc<Shared>,
    mut events: mpsc::Receiver<ChangeEvent>,
    mut cancel: watch::Receiver<bool>,
    epoch: u64,
) {
    let (trigger, triggers) = mpsc::channel(1);
    tokio::spawn(reload_worker(shared.cache.clone(), triggers, cancel.clone()));

    loop {
        tokio::select! {
            _ = cancel.changed() => return,
            event = events.recv() => match event {
                Some(event) => {
                    tracing::debug!("{:?} on {}; scheduling reload", event.kind, event.table);
                    // Full queue means a reload is already pending.
                    let _ = trigger.try_send(());
                }
                None => {
                    let Some(reopened) = shared.reopen(epoch, &mut cancel).await else {
                        return;
                    };
                    events = reopened;
                    let _ = trigger.try_send(());
                }
            }
        }
    }
}

async fn reload_worker(
    cache: Arc<ReportCache>,
    mut triggers: mpsc::Receiver<()>,
    cancel: watch::Receiver<bool>,
) {
    while triggers.recv().await.is_some() {
        if *cancel.borrow() {
            break;
        }
        let open = cancel.clone();
        match cache.reload_while(move || !*open.borrow()).await {
            Ok(ReloadOutcome::Applied { count }) => {
                tracing::debug!("Notification reload applied {} reports", count);
            }
            Ok(ReloadOutcome::Superseded | ReloadOutcome::Cancelled) => {}
            // Already recorded in the cache status for presentation surfaces.
            Err(error) => tracing::debug!("Notification reload failed: {}", error),
        }
    }
}
