pub mod common;
pub mod completions;
pub mod config;
pub mod list;
pub mod report;
pub mod watch;
