//! Remote report store contract.
//!
//! The store is the single source of truth for reports. This module defines
//! what the rest of the crate consumes from it: a newest-first listing, an
//! insert that assigns identifiers, and a change-notification channel whose
//! events only say *that* the collection changed.

mod realtime;
mod supabase;

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::models::{NewReport, Report};

pub use realtime::RealtimeClient;
pub use supabase::SupabaseStore;

/// Errors raised by a remote store implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Invalid store configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Store API error: {0}")]
    Api(String),
    #[error("Realtime channel error: {0}")]
    Realtime(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Kind of mutation a change notification reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    /// Anything the store sends that is not one of the above
    Other,
}

impl ChangeKind {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "INSERT" => Self::Insert,
            "UPDATE" => Self::Update,
            "DELETE" => Self::Delete,
            _ => Self::Other,
        }
    }
}

/// A push notification that the watched collection changed.
///
/// The payload is informational only; consumers reload instead of trusting it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub table: String,
}

pub(crate) const REALTIME_TOPIC_PREFIX: &str = "realtime:";

/// Which collection and which mutations a subscription covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    pub schema: String,
    pub table: String,
    /// `None` means every event kind
    pub kinds: Option<Vec<ChangeKind>>,
}

impl ChangeFilter {
    /// Insert, update and delete events on `schema.table`.
    pub fn all_events(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            kinds: None,
        }
    }

    /// Event name in the form the Realtime join payload expects.
    pub(crate) fn realtime_event(&self) -> &'static str {
        match self.kinds.as_deref() {
            Some([ChangeKind::Insert]) => "INSERT",
            Some([ChangeKind::Update]) => "UPDATE",
            Some([ChangeKind::Delete]) => "DELETE",
            _ => "*",
        }
    }

    /// Realtime topic the table's changes are joined on.
    pub(crate) fn realtime_topic(&self) -> String {
        format!("{REALTIME_TOPIC_PREFIX}{}", self.table)
    }
}

/// Release handle for an open change channel.
///
/// Clones share the same underlying release signal; releasing more than once
/// is a no-op.
#[derive(Clone)]
pub struct ChannelHandle {
    topic: Arc<str>,
    release: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ChannelHandle {
    /// Create a handle and the receiver the channel owner waits on.
    pub fn new(topic: impl Into<String>) -> (Self, oneshot::Receiver<()>) {
        let (sender, receiver) = oneshot::channel();
        let handle = Self {
            topic: Arc::from(topic.into()),
            release: Arc::new(Mutex::new(Some(sender))),
        };
        (handle, receiver)
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Signal the channel owner to shut down. Returns `true` the first time.
    pub fn release(&self) -> bool {
        let sender = self
            .release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        sender.is_some_and(|sender| {
            // The owner may already be gone; the channel is released either way.
            let _ = sender.send(());
            true
        })
    }

    pub fn is_released(&self) -> bool {
        self.release
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ChannelHandle")
            .field("topic", &self.topic)
            .field("released", &self.is_released())
            .finish()
    }
}

/// An open change channel: the notifications plus the handle that closes it.
///
/// `events` ends (yields `None`) when the store drops the channel.
#[derive(Debug)]
pub struct ChangeFeed {
    pub events: mpsc::Receiver<ChangeEvent>,
    pub handle: ChannelHandle,
}

/// Authoritative report store shared by every client.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Every report, newest first.
    async fn list_reports(&self) -> StoreResult<Vec<Report>>;

    /// Insert a report and return it with its assigned id.
    async fn insert_report(&self, report: &NewReport) -> StoreResult<Report>;

    /// Open a change-notification channel for the filtered collection.
    async fn subscribe(&self, filter: &ChangeFilter) -> StoreResult<ChangeFeed>;

    /// Release a channel opened by [`RemoteStore::subscribe`]. Idempotent.
    async fn unsubscribe(&self, handle: &ChannelHandle) {
        if handle.release() {
            tracing::debug!("Released change channel {}", handle.topic());
        }
    }
}
