//! Data models for Alerta Vecinal

mod coordinate;
mod report;

pub use coordinate::Coordinate;
pub use report::{normalize_report_order, NewReport, Report, ReportId};
