//! Report model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Coordinate;

/// Identifier assigned by the remote store when a report is inserted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(i64);

impl ReportId {
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ReportId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.trim().parse()?))
    }
}

/// An incident report as known to the remote store
///
/// Reports are immutable: they are created by a submission and only ever
/// become visible afterwards, never edited or removed by this system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Store-assigned identifier
    pub id: ReportId,
    /// Neighbourhood or area the report refers to
    pub zone: String,
    /// What is happening
    pub message: String,
    /// Submission instant; display and sort key
    pub timestamp: DateTime<Utc>,
    /// Where it is happening, when the report is geotagged
    pub location: Option<Coordinate>,
}

impl Report {
    #[must_use]
    pub const fn is_geotagged(&self) -> bool {
        self.location.is_some()
    }
}

/// A validated report that has not been inserted yet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewReport {
    pub zone: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub location: Coordinate,
}

impl NewReport {
    /// The report as the store will hold it once `id` is assigned.
    #[must_use]
    pub fn into_report(self, id: ReportId) -> Report {
        Report {
            id,
            zone: self.zone,
            message: self.message,
            timestamp: self.timestamp,
            location: Some(self.location),
        }
    }
}

/// Order reports newest first and drop repeated identifiers.
///
/// The sort is stable, so reports sharing a timestamp keep the order the
/// store returned them in. The first occurrence of an id wins.
pub fn normalize_report_order(reports: &mut Vec<Report>) {
    reports.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let mut seen = std::collections::HashSet::with_capacity(reports.len());
    reports.retain(|report| seen.insert(report.id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn report(id: i64, seconds: i64) -> Report {
        Report {
            id: ReportId::new(id),
            zone: format!("Zona {id}"),
            message: "Calle cortada".to_string(),
            timestamp: Utc.timestamp_opt(seconds, 0).unwrap(),
            location: None,
        }
    }

    #[test]
    fn test_report_id_parse() {
        let id: ReportId = " 42 ".parse().unwrap();
        assert_eq!(id, ReportId::new(42));
        assert!("abc".parse::<ReportId>().is_err());
    }

    #[test]
    fn test_normalize_orders_newest_first() {
        let mut reports = vec![report(1, 100), report(2, 300), report(3, 200)];
        normalize_report_order(&mut reports);
        let ids: Vec<i64> = reports.iter().map(|r| r.id.get()).collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn test_normalize_drops_duplicate_ids() {
        let mut reports = vec![report(1, 300), report(1, 100), report(2, 200)];
        normalize_report_order(&mut reports);
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].timestamp.timestamp(), 300);
    }

    #[test]
    fn test_into_report_is_geotagged() {
        let draft = NewReport {
            zone: "Norte".to_string(),
            message: "Agua en la calle".to_string(),
            timestamp: Utc::now(),
            location: Coordinate::new(-34.6, -58.4).unwrap(),
        };
        let created = draft.into_report(ReportId::new(5));
        assert!(created.is_geotagged());
        assert_eq!(created.id.get(), 5);
    }
}
