use std::collections::HashSet;

use alerta_core::{Report, ReportId, SubscriptionState, SyncState};
use chrono::Utc;

use crate::commands::common::{format_report_line, format_report_lines, open_session, report_to_list_item};
use crate::error::CliError;

pub async fn run_watch(as_json: bool, profile: Option<&str>) -> Result<(), CliError> {
    let session = open_session(profile)?;
    let mut snapshots = session.cache().watch();
    let mut status = session.cache().watch_status();
    let mut subscription = session.subscription().watch_state();

    if let Err(error) = session.start().await {
        if session.subscription().state() != SubscriptionState::Open {
            return Err(error.into());
        }
        eprintln!("Warning: {error}");
    }
    status.borrow_and_update();
    subscription.borrow_and_update();

    let mut seen = HashSet::new();
    let initial = snapshots.borrow_and_update().clone();
    let arrivals = new_arrivals(&initial, &mut seen);
    if as_json {
        print_json_snapshot(&initial)?;
    } else if arrivals.is_empty() {
        println!("No reports yet");
    } else {
        for line in format_report_lines(&initial, Utc::now()) {
            println!("{line}");
        }
    }
    eprintln!("Watching for new reports (Ctrl+C to stop)");

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                let arrivals = new_arrivals(&snapshot, &mut seen);
                if as_json {
                    print_json_snapshot(&snapshot)?;
                } else {
                    let now = Utc::now();
                    for report in arrivals {
                        println!("+ {}", format_report_line(report, now));
                    }
                }
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.state == SyncState::Error {
                    if let Some(message) = current.last_error {
                        eprintln!("Warning: reload failed: {message}");
                    }
                }
            }
            changed = subscription.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *subscription.borrow_and_update();
                match state {
                    SubscriptionState::Opening => eprintln!("Live updates interrupted; reconnecting"),
                    SubscriptionState::Open => eprintln!("Live updates restored"),
                    SubscriptionState::Closed => break,
                }
            }
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Reports in `snapshot` not printed before, oldest first.
pub fn new_arrivals<'a>(snapshot: &'a [Report], seen: &mut HashSet<ReportId>) -> Vec<&'a Report> {
    let mut arrivals = snapshot
        .iter()
        .filter(|report| seen.insert(report.id))
        .collect::<Vec<_>>();
    arrivals.reverse();
    arrivals
}

fn print_json_snapshot(snapshot: &[Report]) -> Result<(), CliError> {
    let now = Utc::now();
    let items = snapshot
        .iter()
        .map(|report| report_to_list_item(report, now))
        .collect::<Vec<_>>();
    println!("{}", serde_json::to_string(&items)?);
    Ok(())
}
