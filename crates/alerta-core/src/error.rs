//! Error types for alerta-core

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias using alerta-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to presentation surfaces.
///
/// None of these are fatal; every one of them is recoverable by retrying the
/// operation that produced it.
#[derive(Error, Debug)]
pub enum Error {
    /// Reloading the report list failed; the cache keeps its previous contents
    #[error("Failed to load reports: {0}")]
    Fetch(#[source] StoreError),

    /// The change channel could not be opened; only explicit reloads refresh the cache
    #[error("Live updates unavailable: {0}")]
    Subscription(#[source] StoreError),

    /// Device location unavailable or denied; the selected coordinate is unchanged
    #[error(transparent)]
    Location(#[from] LocationError),

    /// Draft is incomplete; nothing was sent
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The store rejected the insert; the draft is kept for a retry
    #[error("Failed to submit report: {0}")]
    Submission(#[source] StoreError),

    /// Invalid store configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Draft fields checked before a report is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Zone,
    Message,
    Location,
}

/// First missing piece of a draft, in the order a user should fix them.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Zone is required")]
    MissingZone,
    #[error("Message is required")]
    MissingMessage,
    #[error("Pick a location on the map or use the device location first")]
    MissingLocation,
}

impl ValidationError {
    /// The draft field this error refers to.
    pub const fn field(self) -> DraftField {
        match self {
            Self::MissingZone => DraftField::Zone,
            Self::MissingMessage => DraftField::Message,
            Self::MissingLocation => DraftField::Location,
        }
    }
}

/// Failures while resolving the device position.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocationError {
    #[error("Geolocation is not available on this device")]
    Unavailable,
    #[error("Location permission denied: {0}")]
    Denied(String),
    #[error("Failed to get location: {0}")]
    Failed(String),
    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(String),
}
