use std::{io, time::Duration};

use anyhow::Context;
use clap::Parser;
use indicatif::{ProgressBar, ProgressFinish};
use log::{debug, info};

use crate::{cli::Cli, config::Config};

mod clean;
mod cli;
mod config;
mod logging;
mod mendeley;

fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let progress = spinner();
    logging::init(args.loglevel.0, progress.clone())?;

    let config = Config::load(&args.config)?;
    debug!("using {config:?}");
    let agent = mendeley::agent();

    info!("Performing OAuth authentication");
    let session = mendeley::auth::sign_in(&agent, &config)?;

    info!("Downloading bibtex");
    let raw = mendeley::documents::fetch_all(&agent, &config.api_url, &session, &progress)?;
    progress.finish_and_clear();
    let text = String::from_utf8(raw).context("downloaded bibliography is not valid UTF-8")?;

    info!("Cleaning bibtex");
    let bib = clean::clean(&text)?;
    info!("{} entries", bib.len());

    clean::emit(&bib, &mut io::stdout().lock())
}

/// Spinner on stderr; indicatif keeps it hidden when stderr is not a terminal.
fn spinner() -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_finish(ProgressFinish::AndClear);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}
