use std::collections::HashSet;

use alerta_core::{Coordinate, Report, ReportId};
use chrono::{Duration, TimeZone, Utc};
use clap::Parser;
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands, CompletionShell, ConfigCommands};
use crate::commands::common::{
    build_store_config, format_relative_time, format_report_line, mask_secret,
    report_to_list_item, StoreOverrides,
};
use crate::commands::completions::render_completions;
use crate::commands::config::{merge_profile, missing_fields, ProfileInput};
use crate::commands::report::LocationSource;
use crate::commands::watch::new_arrivals;
use crate::config_profiles::CliProfile;
use crate::error::CliError;

fn report(id: i64, zone: &str, message: &str, minutes_ago: i64) -> Report {
    Report {
        id: ReportId::new(id),
        zone: zone.to_string(),
        message: message.to_string(),
        timestamp: now() - Duration::minutes(minutes_ago),
        location: Some(Coordinate::new(-34.60372, -58.38159).unwrap()),
    }
}

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 2, 12, 0, 0).unwrap()
}

fn configured_profile() -> CliProfile {
    CliProfile {
        supabase_url: Some("https://project.supabase.co".to_string()),
        supabase_anon_key: Some("profile-key".to_string()),
        reports_table: None,
        geolocation_url: None,
    }
}

#[test]
fn report_accepts_negative_coordinates() {
    let cli = Cli::try_parse_from([
        "alerta", "report", "--zone", "Centro", "--message", "Bache", "--lat", "-34.6", "--lng",
        "-58.4",
    ])
    .unwrap();

    match cli.command {
        Commands::Report {
            lat, lng, device, ..
        } => {
            assert_eq!(
                LocationSource::from_args(lat, lng, device),
                LocationSource::Point {
                    lat: -34.6,
                    lng: -58.4
                }
            );
        }
        _ => panic!("expected report command"),
    }
}

#[test]
fn report_requires_both_coordinate_halves() {
    assert!(Cli::try_parse_from([
        "alerta", "report", "--zone", "Centro", "--message", "Bache", "--lat", "-34.6",
    ])
    .is_err());
}

#[test]
fn report_device_conflicts_with_point() {
    assert!(Cli::try_parse_from([
        "alerta", "report", "--zone", "Centro", "--message", "Bache", "--device", "--lat", "1",
        "--lng", "2",
    ])
    .is_err());

    let cli = Cli::try_parse_from([
        "alerta", "report", "-z", "Centro", "-m", "Bache", "--device",
    ])
    .unwrap();
    match cli.command {
        Commands::Report {
            lat, lng, device, ..
        } => assert_eq!(
            LocationSource::from_args(lat, lng, device),
            LocationSource::Device
        ),
        _ => panic!("expected report command"),
    }
}

#[test]
fn report_without_location_parses_and_is_left_to_validation() {
    assert_eq!(
        LocationSource::from_args(None, None, false),
        LocationSource::Missing
    );
}

#[test]
fn profile_flag_is_global() {
    let cli = Cli::try_parse_from(["alerta", "list", "--limit", "5", "--profile", "barrio"]).unwrap();
    assert_eq!(cli.profile.as_deref(), Some("barrio"));
    assert!(matches!(
        cli.command,
        Commands::List {
            limit: Some(5),
            json: false
        }
    ));
}

#[test]
fn config_show_parses_json_flag() {
    let cli = Cli::try_parse_from(["alerta", "config", "show", "--json"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Config {
            command: ConfigCommands::Show {
                profile: None,
                json: true
            }
        }
    ));
}

#[test]
fn store_config_prefers_environment_over_profile() {
    let overrides = StoreOverrides {
        supabase_url: Some("https://override.supabase.co/rest/v1/".to_string()),
        anon_key: None,
        reports_table: Some("reportes_staging".to_string()),
    };

    let config = build_store_config(overrides, &configured_profile()).unwrap();

    assert_eq!(config.supabase_url, "https://override.supabase.co");
    assert_eq!(config.anon_key, "profile-key");
    assert_eq!(config.reports_table, "reportes_staging");
}

#[test]
fn store_config_uses_profile_table_and_default() {
    let mut profile = configured_profile();
    let config = build_store_config(StoreOverrides::default(), &profile).unwrap();
    assert_eq!(config.reports_table, "reportes");

    profile.reports_table = Some("incidentes".to_string());
    let config = build_store_config(StoreOverrides::default(), &profile).unwrap();
    assert_eq!(config.reports_table, "incidentes");
}

#[test]
fn store_config_missing_everything_is_not_configured() {
    let error = build_store_config(StoreOverrides::default(), &CliProfile::default()).unwrap_err();
    assert!(matches!(error, CliError::StoreNotConfigured));
}

#[test]
fn store_config_with_only_a_url_is_an_error() {
    let profile = CliProfile {
        supabase_url: Some("https://project.supabase.co".to_string()),
        ..CliProfile::default()
    };
    let error = build_store_config(StoreOverrides::default(), &profile).unwrap_err();
    assert!(matches!(
        error,
        CliError::Core(alerta_core::Error::Config(_))
    ));
}

#[test]
fn merge_profile_keeps_existing_values_for_blank_input() {
    let merged = merge_profile(
        &configured_profile(),
        ProfileInput {
            supabase_url: Some("  ".to_string()),
            supabase_anon_key: Some("new-key".to_string()),
            reports_table: None,
            geolocation_url: Some("https://geo.example.com/json".to_string()),
        },
    )
    .unwrap();

    assert_eq!(
        merged,
        CliProfile {
            supabase_url: Some("https://project.supabase.co".to_string()),
            supabase_anon_key: Some("new-key".to_string()),
            reports_table: None,
            geolocation_url: Some("https://geo.example.com/json".to_string()),
        }
    );
    assert!(missing_fields(&merged).is_empty());
}

#[test]
fn merge_profile_rejects_urls_without_scheme() {
    let error = merge_profile(
        &CliProfile::default(),
        ProfileInput {
            supabase_url: Some("project.supabase.co".to_string()),
            ..ProfileInput::default()
        },
    )
    .unwrap_err();
    assert!(matches!(error, CliError::Config(_)));
    assert_eq!(
        missing_fields(&CliProfile::default()),
        vec!["supabase_url", "supabase_anon_key"]
    );
}

#[test]
fn format_relative_time_units() {
    let now = now();
    assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
    assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
    assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
    assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
    assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
}

#[test]
fn report_line_shows_zone_message_age_and_location() {
    let line = format_report_line(
        &report(42, "Centro", "Semaforo\n  roto en la esquina", 5),
        now(),
    );
    assert!(line.starts_with("    42  Centro"));
    assert!(line.contains("Semaforo roto en la esquina"));
    assert!(line.contains("5m ago"));
    assert!(line.ends_with("-34.60372, -58.38159"));
}

#[test]
fn report_line_truncates_long_messages() {
    let long_message = "a".repeat(80);
    let line = format_report_line(&report(1, "Centro", &long_message, 0), now());
    assert!(line.contains(&format!("{}...", "a".repeat(45))));
    assert!(!line.contains(&"a".repeat(46)));
}

#[test]
fn list_item_flattens_coordinate() {
    let mut unlocated = report(7, "Sur", "Agua", 90);
    unlocated.location = None;

    let located = serde_json::to_value(report_to_list_item(&report(6, "Norte", "Luz", 1), now())).unwrap();
    let unlocated = serde_json::to_value(report_to_list_item(&unlocated, now())).unwrap();

    assert_eq!(located["id"], 6);
    assert_eq!(located["lat"], -34.60372);
    assert_eq!(located["relative_time"], "1m ago");
    assert_eq!(unlocated["lat"], serde_json::Value::Null);
    assert_eq!(unlocated["timestamp"], "2024-04-02T10:30:00Z");
}

#[test]
fn new_arrivals_are_reported_once_oldest_first() {
    let mut seen = HashSet::new();
    let first = vec![report(2, "B", "dos", 1), report(1, "A", "uno", 2)];
    let ids = new_arrivals(&first, &mut seen)
        .into_iter()
        .map(|report| report.id.get())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![1, 2]);

    let second = vec![
        report(4, "D", "cuatro", 0),
        report(3, "C", "tres", 0),
        report(2, "B", "dos", 1),
        report(1, "A", "uno", 2),
    ];
    let ids = new_arrivals(&second, &mut seen)
        .into_iter()
        .map(|report| report.id.get())
        .collect::<Vec<_>>();
    assert_eq!(ids, vec![3, 4]);
}

#[test]
fn mask_secret_hides_the_middle() {
    assert_eq!(mask_secret("eyJhbGciOiJIUzI1NiJ9.payload"), "eyJh...load");
    assert_eq!(mask_secret("short"), "*****");
}

#[test]
fn completions_use_binary_name() {
    let script = String::from_utf8(render_completions(CompletionShell::Bash)).unwrap();
    assert!(script.contains("alerta"));
    assert!(script.contains("report"));
}
