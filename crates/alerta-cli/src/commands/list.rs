use chrono::Utc;

use crate::commands::common::{format_report_lines, open_session, report_to_list_item, ReportListItem};
use crate::error::CliError;

pub async fn run_list(
    limit: Option<usize>,
    as_json: bool,
    profile: Option<&str>,
) -> Result<(), CliError> {
    let session = open_session(profile)?;
    session.cache().reload().await?;

    let snapshot = session.cache().snapshot();
    let reports = &snapshot[..limit.map_or(snapshot.len(), |limit| limit.min(snapshot.len()))];
    let now = Utc::now();

    if as_json {
        let json_items = reports
            .iter()
            .map(|report| report_to_list_item(report, now))
            .collect::<Vec<ReportListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if reports.is_empty() {
        println!("No reports yet");
    } else {
        for line in format_report_lines(reports, now) {
            println!("{line}");
        }
    }

    Ok(())
}
