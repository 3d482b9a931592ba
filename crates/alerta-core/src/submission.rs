//! Validation and submission of new reports.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;

use crate::error::{Error, Result, ValidationError};
use crate::location::LocationSelector;
use crate::models::{Coordinate, NewReport, Report};
use crate::store::RemoteStore;

/// Text of the report being composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub zone: String,
    pub message: String,
}

impl Draft {
    /// Check the draft and the selected location, in the order a user fixes them.
    fn validate(
        &self,
        location: Option<Coordinate>,
    ) -> std::result::Result<NewReport, ValidationError> {
        let zone = self.zone.trim();
        if zone.is_empty() {
            return Err(ValidationError::MissingZone);
        }
        let message = self.message.trim();
        if message.is_empty() {
            return Err(ValidationError::MissingMessage);
        }
        let location = location.ok_or(ValidationError::MissingLocation)?;

        Ok(NewReport {
            zone: zone.to_string(),
            message: message.to_string(),
            timestamp: Utc::now(),
            location,
        })
    }
}

/// Turns the draft plus the selected location into an inserted report.
///
/// The cache is not touched here; the inserted row reaches it through the
/// change subscription like any other client's insert.
pub struct SubmissionCoordinator {
    store: Arc<dyn RemoteStore>,
    location: Arc<LocationSelector>,
    draft: Mutex<Draft>,
    /// Held for the whole of a submission so two submits never interleave
    in_flight: tokio::sync::Mutex<()>,
}

impl SubmissionCoordinator {
    pub fn new(store: Arc<dyn RemoteStore>, location: Arc<LocationSelector>) -> Self {
        Self {
            store,
            location,
            draft: Mutex::new(Draft::default()),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn draft(&self) -> Draft {
        self.lock_draft().clone()
    }

    pub fn set_zone(&self, zone: impl Into<String>) {
        self.lock_draft().zone = zone.into();
    }

    pub fn set_message(&self, message: impl Into<String>) {
        self.lock_draft().message = message.into();
    }

    /// Record `zone` and `message` as the draft and submit it.
    pub async fn submit(&self, zone: impl Into<String>, message: impl Into<String>) -> Result<Report> {
        let _turn = self.in_flight.lock().await;
        let draft = {
            let mut draft = self.lock_draft();
            draft.zone = zone.into();
            draft.message = message.into();
            draft.clone()
        };
        self.send(&draft).await
    }

    /// Submit whatever the draft currently holds.
    pub async fn submit_draft(&self) -> Result<Report> {
        let _turn = self.in_flight.lock().await;
        let draft = self.draft();
        self.send(&draft).await
    }

    async fn send(&self, draft: &Draft) -> Result<Report> {
        let new_report = draft.validate(self.location.current())?;

        match self.store.insert_report(&new_report).await {
            Ok(created) => {
                tracing::info!("Report {} submitted for {}", created.id, created.zone);
                *self.lock_draft() = Draft::default();
                // A point picked while the insert was in flight stays selected.
                self.location.clear_if_current(new_report.location);
                Ok(created)
            }
            Err(error) => {
                tracing::warn!("Failed to submit report: {}", error);
                Err(Error::Submission(error))
            }
        }
    }

    fn lock_draft(&self) -> MutexGuard<'_, Draft> {
        self.draft.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
