//! Location picked for the next report.
//!
//! A coordinate comes either from the device (asynchronously, may fail) or
//! from a point the user picked on the map. Whichever arrives last wins.

mod http;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::error::{LocationError, Result};
use crate::models::Coordinate;

pub use http::{HttpGeolocator, DEFAULT_GEOLOCATION_URL};

/// Source of the device's current position.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    async fn locate(&self) -> std::result::Result<Coordinate, LocationError>;
}

/// Locator for platforms without any location capability.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableLocator;

#[async_trait]
impl DeviceLocator for UnavailableLocator {
    async fn locate(&self) -> std::result::Result<Coordinate, LocationError> {
        Err(LocationError::Unavailable)
    }
}

pub struct LocationSelector {
    locator: Arc<dyn DeviceLocator>,
    selected: watch::Sender<Option<Coordinate>>,
}

impl LocationSelector {
    pub fn new(locator: Arc<dyn DeviceLocator>) -> Self {
        Self {
            locator,
            selected: watch::channel(None).0,
        }
    }

    /// Ask the device for its position and select it.
    ///
    /// On failure the current selection is left untouched. The result is
    /// applied when it arrives, even if a map point was picked meanwhile.
    pub async fn set_from_device(&self) -> Result<Coordinate> {
        match self.locator.locate().await {
            Ok(coordinate) => {
                tracing::debug!("Device location resolved to {}", coordinate);
                self.selected.send_replace(Some(coordinate));
                Ok(coordinate)
            }
            Err(error) => {
                tracing::warn!("Device location failed: {}", error);
                Err(error.into())
            }
        }
    }

    pub fn set_from_point(&self, coordinate: Coordinate) {
        self.selected.send_replace(Some(coordinate));
    }

    pub fn clear(&self) {
        self.selected.send_if_modified(|selected| selected.take().is_some());
    }

    /// Clear the selection only if it is still `expected`.
    pub(crate) fn clear_if_current(&self, expected: Coordinate) -> bool {
        self.selected.send_if_modified(|selected| {
            if *selected == Some(expected) {
                *selected = None;
                true
            } else {
                false
            }
        })
    }

    /// Coordinate for the preview marker, if one is selected.
    pub fn current(&self) -> Option<Coordinate> {
        *self.selected.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<Option<Coordinate>> {
        self.selected.subscribe()
    }
}
