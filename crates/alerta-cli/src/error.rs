use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] alerta_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Report store is not configured. Run `alerta config init --supabase-url <url> --supabase-anon-key <key>`, or set SUPABASE_URL and SUPABASE_ANON_KEY."
    )]
    StoreNotConfigured,
}
