pub mod ai;
pub mod backend;
pub mod category;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod error;
pub mod navigator;
pub mod render;
pub mod session;
pub mod stats;
pub mod store;
pub mod task;
pub mod ticker;
pub mod timer;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting daybook");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.rc_file.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides
            .into_iter()
            .chain(cli.rc_overrides.into_iter().map(|kv| (kv.key, kv.value))),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let store = backend::LocalStore::open(&data_dir)
        .with_context(|| format!("failed to open data store at {}", data_dir.display()))?;

    let now = Utc::now();
    let today = datetime::today_in(cfg.timezone(), now);
    let scope = match cli.date.as_deref() {
        Some(raw) => datetime::parse_scope(raw, today)?,
        None => today,
    };
    debug!(%today, %scope, "resolved viewed day");

    let mut session = session::Session::open(Arc::new(store), today, scope, now)?;
    let mut renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    commands::dispatch(&mut session, &cfg, &mut renderer, inv)?;

    info!("done");
    Ok(())
}

/// Line printed for a failed run. Input mistakes are shown as-is; anything
/// else gets the `error:` prefix and its full cause chain.
pub fn error_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<error::TrackerError>() {
        Some(tracker) if tracker.is_user_facing() => tracker.to_string(),
        _ => format!("error: {err:#}"),
    }
}
