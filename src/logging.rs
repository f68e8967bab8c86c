//! Logging to stderr in `LEVEL: message` form, kept clear of the download spinner.

use std::io::{IsTerminal, Write};

use indicatif::ProgressBar;
use log::{Level, LevelFilter};
use owo_colors::OwoColorize;

/// Level names as the user sees them on stderr.
fn level_label(level: Level, color: bool) -> String {
    let label = match level {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    };
    if !color {
        return label.to_string();
    }
    match level {
        Level::Error => label.red().bold().to_string(),
        Level::Warn => label.yellow().to_string(),
        Level::Info => label.green().to_string(),
        Level::Debug => label.cyan().to_string(),
        Level::Trace => label.magenta().to_string(),
    }
}

/// Logger that hides the spinner while a line is written.
struct SpinnerLogger {
    inner: env_logger::Logger,
    progress: ProgressBar,
}

impl log::Log for SpinnerLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        self.inner.enabled(metadata)
    }

    fn log(&self, record: &log::Record) {
        if self.inner.enabled(record.metadata()) {
            self.progress.suspend(|| self.inner.log(record));
        }
    }

    fn flush(&self) {
        self.inner.flush();
    }
}

/// Install the global logger. `RUST_LOG` is not consulted; `level` alone decides.
pub fn init(level: LevelFilter, progress: ProgressBar) -> anyhow::Result<()> {
    let color = std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none();
    let logger = env_logger::Builder::new()
        .filter_level(level)
        .target(env_logger::Target::Stderr)
        .format(move |buf, record| {
            writeln!(buf, "{}: {}", level_label(record.level(), color), record.args())
        })
        .build();
    let max_level = logger.filter();

    log::set_boxed_logger(Box::new(SpinnerLogger {
        inner: logger,
        progress,
    }))?;
    log::set_max_level(max_level);
    Ok(())
}
