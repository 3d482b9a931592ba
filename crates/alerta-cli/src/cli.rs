use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "alerta")]
#[command(about = "Community incident reports on a shared live map")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// CLI profile name holding the Supabase project settings
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List reports, newest first
    #[command(alias = "ls")]
    List {
        /// Number of reports to show (all when omitted)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Follow reports live until interrupted
    Watch {
        /// Print each new snapshot as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Submit a new report
    Report {
        /// Neighbourhood or area of the incident
        #[arg(short, long)]
        zone: String,
        /// What happened
        #[arg(short, long)]
        message: String,
        /// Latitude of the incident
        #[arg(long, requires = "lng", allow_negative_numbers = true)]
        lat: Option<f64>,
        /// Longitude of the incident
        #[arg(long, requires = "lat", allow_negative_numbers = true)]
        lng: Option<f64>,
        /// Use this machine's network location instead of --lat/--lng
        #[arg(long, conflicts_with_all = ["lat", "lng"])]
        device: bool,
        /// Output the created report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Configure CLI profiles
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Profile name to initialize
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Supabase project URL
        #[arg(long, value_name = "URL")]
        supabase_url: Option<String>,
        /// Supabase anon/public key
        #[arg(long, value_name = "KEY")]
        supabase_anon_key: Option<String>,
        /// Reports table name (defaults to `reportes`)
        #[arg(long, value_name = "TABLE")]
        reports_table: Option<String>,
        /// Network geolocation endpoint used by `report --device`
        #[arg(long, value_name = "URL")]
        geolocation_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Show the resolved profile
    Show {
        /// Profile name to show
        #[arg(long, value_name = "NAME")]
        profile: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
