use std::env;

use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::commands::common::mask_secret;
use crate::config_profiles::{is_http_url, normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

pub fn run_config(command: ConfigCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            profile,
            supabase_url,
            supabase_anon_key,
            reports_table,
            geolocation_url,
            no_activate,
        } => run_config_init(
            profile.as_deref().or(global_profile),
            ProfileInput {
                supabase_url,
                supabase_anon_key,
                reports_table,
                geolocation_url,
            },
            no_activate,
        ),
        ConfigCommands::Show { profile, json } => {
            run_config_show(profile.as_deref().or(global_profile), json)
        }
    }
}

/// Values given on the command line for `config init`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileInput {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub reports_table: Option<String>,
    pub geolocation_url: Option<String>,
}

impl ProfileInput {
    /// Fill gaps from the environment.
    fn with_env_fallback(self) -> Self {
        Self {
            supabase_url: normalize_text_option(self.supabase_url)
                .or_else(|| normalize_text_option(env::var("SUPABASE_URL").ok())),
            supabase_anon_key: normalize_text_option(self.supabase_anon_key)
                .or_else(|| normalize_text_option(env::var("SUPABASE_ANON_KEY").ok())),
            reports_table: normalize_text_option(self.reports_table)
                .or_else(|| normalize_text_option(env::var("ALERTA_REPORTS_TABLE").ok())),
            geolocation_url: normalize_text_option(self.geolocation_url),
        }
    }
}

/// Overlay `input` on `existing`; blank inputs keep the existing value.
pub fn merge_profile(existing: &CliProfile, input: ProfileInput) -> Result<CliProfile, CliError> {
    let merged = CliProfile {
        supabase_url: normalize_text_option(input.supabase_url)
            .map(|url| url.trim_end_matches('/').to_string())
            .or_else(|| existing.supabase_url()),
        supabase_anon_key: normalize_text_option(input.supabase_anon_key)
            .or_else(|| existing.supabase_anon_key()),
        reports_table: normalize_text_option(input.reports_table)
            .or_else(|| existing.reports_table()),
        geolocation_url: normalize_text_option(input.geolocation_url)
            .or_else(|| existing.geolocation_url()),
    };
    validate_profile_urls(&merged)?;
    Ok(merged)
}

pub fn run_config_init(
    profile_name: Option<&str>,
    input: ProfileInput,
    no_activate: bool,
) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let existing_profile = config.profile(&profile_name).cloned().unwrap_or_default();

    let merged = merge_profile(&existing_profile, input.with_env_fallback())?;
    let missing_fields = missing_fields(&merged);
    *config.profile_mut_or_default(&profile_name) = merged;

    if !no_activate {
        config.active_profile = Some(profile_name.clone());
    }

    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    if missing_fields.is_empty() {
        println!("Profile '{profile_name}' is ready. Run `alerta list` to see current reports.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }

    Ok(())
}

#[derive(Debug, Serialize)]
struct ProfileView {
    profile: String,
    active: bool,
    supabase_url: Option<String>,
    supabase_anon_key: Option<String>,
    reports_table: String,
    geolocation_url: Option<String>,
}

pub fn run_config_show(profile_name: Option<&str>, as_json: bool) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(profile_name);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();

    let view = ProfileView {
        active: config.active_profile.as_deref() == Some(profile_name.as_str()),
        supabase_url: profile.supabase_url(),
        supabase_anon_key: profile.supabase_anon_key().map(|key| mask_secret(&key)),
        reports_table: profile
            .reports_table()
            .unwrap_or_else(|| alerta_core::config::DEFAULT_REPORTS_TABLE.to_string()),
        geolocation_url: profile.geolocation_url(),
        profile: profile_name,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    let unset = || "(not set)".to_string();
    let active = if view.active { " (active)" } else { "" };
    println!("{:<19}{}{active}", "profile:", view.profile);
    println!("{:<19}{}", "supabase_url:", view.supabase_url.unwrap_or_else(unset));
    println!("{:<19}{}", "supabase_anon_key:", view.supabase_anon_key.unwrap_or_else(unset));
    println!("{:<19}{}", "reports_table:", view.reports_table);
    println!("{:<19}{}", "geolocation_url:", view.geolocation_url.unwrap_or_else(unset));
    Ok(())
}

pub fn missing_fields(profile: &CliProfile) -> Vec<&'static str> {
    let mut missing = Vec::new();
    if profile.supabase_url().is_none() {
        missing.push("supabase_url");
    }
    if profile.supabase_anon_key().is_none() {
        missing.push("supabase_anon_key");
    }
    missing
}

fn validate_profile_urls(profile: &CliProfile) -> Result<(), CliError> {
    if let Some(url) = profile.supabase_url() {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "supabase_url must include http:// or https://".to_string(),
            ));
        }
    }
    if let Some(url) = profile.geolocation_url() {
        if !is_http_url(&url) {
            return Err(CliError::Config(
                "geolocation_url must include http:// or https://".to_string(),
            ));
        }
    }
    Ok(())
}
