use std::{path::PathBuf, str::FromStr};

use clap::Parser;
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Mendeley BibTeX dump.", long_about = None)]
pub struct Cli {
    /// Provide logging level. Example --loglevel debug
    #[arg(short, long, value_name = "LEVEL", default_value = "warning")]
    pub loglevel: LogLevel,

    /// YAML file holding `clientId`, `username` and `password`
    #[arg(short, long, value_name = "FILE", default_value = "config.yml")]
    pub config: PathBuf,
}

/// Verbosity accepted by `--loglevel`.
///
/// Names are matched case-insensitively; `critical` is an alias of `error`
/// since the `log` facade has nothing above it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogLevel(pub LevelFilter);

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let filter = match s.trim().to_ascii_lowercase().as_str() {
            "debug" => LevelFilter::Debug,
            "info" => LevelFilter::Info,
            "warning" | "warn" => LevelFilter::Warn,
            "error" | "critical" => LevelFilter::Error,
            "trace" => LevelFilter::Trace,
            "off" => LevelFilter::Off,
            other => {
                return Err(format!(
                    "unknown level `{other}` (expected debug, info, warning, error or critical)"
                ));
            }
        };
        Ok(LogLevel(filter))
    }
}
