//! Supabase-backed report store: PostgREST for rows, Realtime for changes.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::{
    ChangeFeed, ChangeFilter, RealtimeClient, RemoteStore, StoreError, StoreResult,
};
use crate::config::StoreConfig;
use crate::models::{Coordinate, NewReport, Report, ReportId};
use crate::util::compact_text;

/// Column the listing is ordered by.
const TIMESTAMP_COLUMN: &str = "fecha";

#[derive(Clone)]
pub struct SupabaseStore {
    config: StoreConfig,
    client: Client,
    realtime: RealtimeClient,
}

impl SupabaseStore {
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let realtime = RealtimeClient::new(&config)?;
        Ok(Self {
            config,
            client,
            realtime,
        })
    }

    pub const fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.config.anon_key)
            .bearer_auth(&self.config.anon_key)
            .header("Accept", "application/json")
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> StoreResult<T> {
        let response = self.authorized(request).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Api(parse_api_error(status, &body)));
        }
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RemoteStore for SupabaseStore {
    async fn list_reports(&self) -> StoreResult<Vec<Report>> {
        let request = self
            .client
            .get(self.config.rest_endpoint())
            .query(&[
                ("select", "*".to_string()),
                ("order", format!("{TIMESTAMP_COLUMN}.desc")),
            ]);
        let rows = self.send_json::<Vec<ReportRow>>(request).await?;
        Ok(rows.into_iter().map(Report::from).collect())
    }

    async fn insert_report(&self, report: &NewReport) -> StoreResult<Report> {
        let request = self
            .client
            .post(self.config.rest_endpoint())
            .header("Prefer", "return=representation")
            .json(&[NewReportRow::from(report)]);
        let rows = self.send_json::<Vec<ReportRow>>(request).await?;
        rows.into_iter().next().map(Report::from).ok_or_else(|| {
            StoreError::Api("Insert response did not include the created row".to_string())
        })
    }

    async fn subscribe(&self, filter: &ChangeFilter) -> StoreResult<ChangeFeed> {
        self.realtime.subscribe(filter).await
    }
}

/// Row shape of the reports table.
#[derive(Debug, Deserialize)]
struct ReportRow {
    id: i64,
    #[serde(rename = "zona")]
    zone: String,
    #[serde(rename = "mensaje")]
    message: String,
    #[serde(rename = "fecha", deserialize_with = "deserialize_timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    lat: Option<f64>,
    #[serde(default)]
    lng: Option<f64>,
}

impl From<ReportRow> for Report {
    fn from(row: ReportRow) -> Self {
        let location = Coordinate::from_parts(row.lat, row.lng);
        if location.is_none() && (row.lat.is_some() || row.lng.is_some()) {
            tracing::warn!(
                "Report {} has an incomplete or invalid coordinate; showing it without location",
                row.id
            );
        }
        Self {
            id: ReportId::new(row.id),
            zone: row.zone,
            message: row.message,
            timestamp: row.timestamp,
            location,
        }
    }
}

/// Accept RFC 3339 instants, and zone-less timestamps as UTC.
fn deserialize_timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|error| serde::de::Error::custom(format!("invalid fecha '{raw}': {error}")))
}

#[derive(Debug, Serialize)]
struct NewReportRow<'a> {
    zona: &'a str,
    mensaje: &'a str,
    fecha: DateTime<Utc>,
    lat: f64,
    lng: f64,
}

impl<'a> From<&'a NewReport> for NewReportRow<'a> {
    fn from(report: &'a NewReport) -> Self {
        Self {
            zona: &report.zone,
            mensaje: &report.message,
            fecha: report.timestamp,
            lat: report.location.latitude(),
            lng: report.location.longitude(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorResponse {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
    hint: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<PostgrestErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.msg)
            .or(payload.error_description)
            .or(payload.error)
        {
            return match payload.hint {
                Some(hint) if !hint.trim().is_empty() => {
                    format!("{} ({}; hint: {})", message.trim(), status.as_u16(), hint.trim())
                }
                _ => format!("{} ({})", message.trim(), status.as_u16()),
            };
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}
