//! alerta-core - Core library for Alerta Vecinal
//!
//! This crate keeps a local, ordered view of community incident reports in
//! sync with the remote report store, tracks the location picked for the next
//! report, and submits new reports. Presentation surfaces (the CLI, a map UI)
//! only consume what this crate exposes.

pub mod cache;
pub mod config;
pub mod error;
pub mod location;
pub mod models;
pub mod session;
pub mod state;
pub mod store;
pub mod submission;
pub mod subscription;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{ReloadOutcome, ReportCache, ReportSnapshot};
pub use config::StoreConfig;
pub use error::{DraftField, Error, LocationError, Result, ValidationError};
pub use location::{DeviceLocator, HttpGeolocator, LocationSelector, UnavailableLocator};
pub use models::{Coordinate, NewReport, Report, ReportId};
pub use session::ReportSession;
pub use state::{SyncState, SyncStatus};
pub use store::{ChangeFilter, RemoteStore, StoreError, SupabaseStore};
pub use submission::{Draft, SubmissionCoordinator};
pub use subscription::{SubscriptionManager, SubscriptionState};
