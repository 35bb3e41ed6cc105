//! CLI argument definitions for the chaosrun runner.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use chaosrun_core::config::GeneralConfig;

/// Runs a single chaos experiment and exits.
///
/// The process exit code reports how the run ended: `0` when the
/// experiment reached a verdict on its own, `1` on setup failure or when
/// the run was stopped by an abort request or a termination signal.
#[derive(Parser, Debug)]
#[command(name = "chaosrun")]
#[command(version, about, long_about = None)]
pub struct RunnerCli {
    /// Path to chaosrun.toml configuration file.
    ///
    /// When omitted, defaults and environment variables are used.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and exit without running the experiment.
    #[arg(long)]
    pub validate: bool,
}

impl RunnerCli {
    /// Applies CLI overrides to the `[general]` section.
    pub fn apply_overrides(&self, general: &mut GeneralConfig) {
        if let Some(level) = &self.log_level {
            general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            general.log_format.clone_from(format);
        }
    }
}
