use std::env;
use std::sync::Arc;

use alerta_core::location::DEFAULT_GEOLOCATION_URL;
use alerta_core::{DeviceLocator, HttpGeolocator, Report, ReportSession, StoreConfig, UnavailableLocator};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Store settings coming from the environment; they override the profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreOverrides {
    pub supabase_url: Option<String>,
    pub anon_key: Option<String>,
    pub reports_table: Option<String>,
}

impl StoreOverrides {
    pub fn from_env() -> Self {
        Self {
            supabase_url: normalize_text_option(env::var("SUPABASE_URL").ok()),
            anon_key: normalize_text_option(env::var("SUPABASE_ANON_KEY").ok()),
            reports_table: normalize_text_option(env::var("ALERTA_REPORTS_TABLE").ok()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReportListItem {
    pub id: i64,
    pub zone: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub relative_time: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

pub fn build_store_config(
    overrides: StoreOverrides,
    profile: &CliProfile,
) -> Result<StoreConfig, CliError> {
    let supabase_url = overrides.supabase_url.or_else(|| profile.supabase_url());
    let anon_key = overrides.anon_key.or_else(|| profile.supabase_anon_key());
    let reports_table = overrides.reports_table.or_else(|| profile.reports_table());

    StoreConfig::resolve_optional(supabase_url, anon_key)?
        .map(|config| config.with_reports_table(reports_table))
        .ok_or(CliError::StoreNotConfigured)
}

pub fn load_profile(profile_name: Option<&str>) -> Result<CliProfile, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    Ok(config.profile(&profile_name).cloned().unwrap_or_default())
}

pub fn device_locator(profile: &CliProfile, config: &StoreConfig) -> Arc<dyn DeviceLocator> {
    let endpoint = profile
        .geolocation_url()
        .unwrap_or_else(|| DEFAULT_GEOLOCATION_URL.to_string());
    match HttpGeolocator::new(endpoint, config.request_timeout) {
        Ok(locator) => Arc::new(locator),
        Err(error) => {
            tracing::warn!("Device location disabled: {}", error);
            Arc::new(UnavailableLocator)
        }
    }
}

pub fn open_session(profile_name: Option<&str>) -> Result<ReportSession, CliError> {
    let profile = load_profile(profile_name)?;
    let config = build_store_config(StoreOverrides::from_env(), &profile)?;
    let locator = device_locator(&profile, &config);
    Ok(ReportSession::connect(config, locator)?)
}

pub fn format_report_lines(reports: &[Report], now: DateTime<Utc>) -> Vec<String> {
    reports
        .iter()
        .map(|report| format_report_line(report, now))
        .collect()
}

pub fn format_report_line(report: &Report, now: DateTime<Utc>) -> String {
    let id = report.id.to_string();
    let zone = truncate(&report.zone, 16);
    let message = truncate(
        &report.message.split_whitespace().collect::<Vec<_>>().join(" "),
        48,
    );
    let relative_time = format_relative_time(report.timestamp, now);
    match report.location {
        Some(location) => {
            format!("{id:>6}  {zone:<16}  {message:<48}  {relative_time:<10}  {location}")
        }
        None => format!("{id:>6}  {zone:<16}  {message:<48}  {relative_time}"),
    }
}

pub fn report_to_list_item(report: &Report, now: DateTime<Utc>) -> ReportListItem {
    ReportListItem {
        id: report.id.get(),
        zone: report.zone.clone(),
        message: report.message.clone(),
        timestamp: report.timestamp,
        relative_time: format_relative_time(report.timestamp, now),
        lat: report.location.map(|location| location.latitude()),
        lng: report.location.map(|location| location.longitude()),
    }
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = now.signed_duration_since(timestamp).num_milliseconds().max(0);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let value = value.trim();
    if value.chars().count() <= max_chars {
        value.to_string()
    } else {
        let mut truncated = value
            .chars()
            .take(max_chars.saturating_sub(3))
            .collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

/// Show the first and last few characters of a key.
pub fn mask_secret(value: &str) -> String {
    let chars = value.chars().collect::<Vec<_>>();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head = chars[..4].iter().collect::<String>();
    let tail = chars[chars.len() - 4..].iter().collect::<String>();
    format!("{head}...{tail}")
}
