use alerta_core::Coordinate;
use chrono::Utc;

use crate::commands::common::{format_report_line, open_session, report_to_list_item};
use crate::error::CliError;

/// Where the new report's coordinate comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocationSource {
    Point { lat: f64, lng: f64 },
    Device,
    /// Nothing picked; submission fails validation
    Missing,
}

impl LocationSource {
    pub const fn from_args(lat: Option<f64>, lng: Option<f64>, device: bool) -> Self {
        match (lat, lng) {
            (Some(lat), Some(lng)) => Self::Point { lat, lng },
            _ if device => Self::Device,
            _ => Self::Missing,
        }
    }
}

pub async fn run_report(
    zone: &str,
    message: &str,
    location: LocationSource,
    as_json: bool,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(profile)?;

    match location {
        LocationSource::Point { lat, lng } => {
            let coordinate = Coordinate::new(lat, lng).map_err(alerta_core::Error::from)?;
            session.location().set_from_point(coordinate);
        }
        LocationSource::Device => {
            let coordinate = session.location().set_from_device().await?;
            eprintln!("Using device location {coordinate}");
        }
        LocationSource::Missing => {}
    }

    let created = session.submission().submit(zone, message).await?;

    if as_json {
        let item = report_to_list_item(&created, Utc::now());
        println!("{}", serde_json::to_string_pretty(&item)?);
    } else {
        println!("{}", format_report_line(&created, Utc::now()));
    }

    Ok(())
}
