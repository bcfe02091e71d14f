//! Cadence-RS Library
//!
//! Recurring job scheduling core: recurrence rules, a prioritized admission
//! queue, lock-guarded execution with history, and the daemon that drives it.

use shadow_rs::shadow;
shadow!(build);

pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod jobs;
pub mod lock;
pub mod logger;
pub mod repositories;
pub mod services;
pub mod state;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}

pub fn clap_long_version() -> &'static str {
    build::CLAP_LONG_VERSION
}
