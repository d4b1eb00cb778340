use std::collections::BTreeMap;
use std::future::Future;
use std::io::{self, Write};

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::ai::{Collaborator, GeminiClient};
use crate::backend::Backend;
use crate::cli::Invocation;
use crate::config::Config;
use crate::datetime::{format_clock, format_scope, parse_scope};
use crate::render::Renderer;
use crate::session::Session;
use crate::task::TaskId;
use crate::ticker::DisplayTicker;

/// Ticks between re-reads of the watched timer from storage.
const WATCH_RECHECK_TICKS: u32 = 5;

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "list",
        "add",
        "done",
        "delete",
        "timer",
        "clear",
        "move",
        "stats",
        "categories",
        "category",
        "watch",
        "inspire",
        "summary",
        "config",
        "help",
        "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(session, cfg, renderer, inv))]
pub fn dispatch<B: Backend>(
    session: &mut Session<B>,
    cfg: &Config,
    renderer: &mut Renderer,
    inv: Invocation,
) -> anyhow::Result<()> {
    let now = Utc::now();
    let command = inv.command.as_str();
    debug!(command, args = ?inv.args, scope = %session.scope(), "dispatching command");

    let mutating = matches!(command, "add" | "done" | "delete" | "timer" | "clear" | "move");

    let result = match command {
        "list" => cmd_list(session, renderer, &inv.args, now),
        "add" => cmd_add(session, &inv.args),
        "done" => cmd_done(session, &inv.args),
        "delete" => cmd_delete(session, &inv.args),
        "timer" => cmd_timer(session, &inv.args, now),
        "clear" => cmd_clear(session),
        "move" => cmd_move(session, &inv.args, now),
        "stats" => cmd_stats(session, renderer),
        "categories" => cmd_categories(session, renderer),
        "category" => cmd_category(session, &inv.args),
        "watch" => cmd_watch(session),
        "inspire" => cmd_inspire(cfg),
        "summary" => cmd_summary(session, cfg),
        "config" => cmd_config(cfg),
        "help" => cmd_help(),
        "version" => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    };

    if mutating {
        report_unsynced(session);
    }
    result
}

/// `list [prev|next|today]`, stepping from the day picked with `--date`.
#[instrument(skip(session, renderer, args, now))]
fn cmd_list<B: Backend>(
    session: &mut Session<B>,
    renderer: &mut Renderer,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    match args.first().map(|arg| arg.to_ascii_lowercase()).as_deref() {
        None => {}
        Some("prev") => {
            session.shift_scope(-1, now)?;
        }
        Some("next") => {
            session.shift_scope(1, now)?;
        }
        Some("today") => {
            session.go_to_today(now)?;
        }
        Some(other) => return Err(anyhow!("list expects prev, next or today, got: {other}")),
    }

    let store = session.store();
    let mut out = io::stdout().lock();

    renderer.write_heading(&mut out, session.navigator())?;
    renderer.write_overdue_banner(&mut out, store.overdue())?;
    renderer.write_task_table(
        &mut out,
        store.tasks(),
        store.overdue(),
        session.registry().list_categories(),
        store.running(),
        now,
    )?;
    Ok(())
}

#[instrument(skip(session, args))]
fn cmd_add<B: Backend>(session: &mut Session<B>, args: &[String]) -> anyhow::Result<()> {
    info!("command add");

    let mut words = Vec::with_capacity(args.len());
    let mut category = None;
    for arg in args {
        match arg.strip_prefix("cat:") {
            Some(name) => category = Some(resolve_category(session, name)),
            None => words.push(arg.as_str()),
        }
    }

    let task = session.add_task(&words.join(" "), category.as_deref())?;
    println!(
        "Created task {} in {} for {}.",
        task.id,
        task.category,
        format_scope(task.date)
    );
    Ok(())
}

/// Maps `cat:` input onto a registered name regardless of case. Unknown
/// names are kept as typed.
fn resolve_category<B: Backend>(session: &Session<B>, raw: &str) -> String {
    session
        .registry()
        .lookup(raw)
        .map(|category| category.name.clone())
        .unwrap_or_else(|| raw.trim().to_string())
}

#[instrument(skip(session, args))]
fn cmd_done<B: Backend>(session: &mut Session<B>, args: &[String]) -> anyhow::Result<()> {
    let ids = parse_ids(args)?;
    for id in ids {
        match session.store_mut().toggle_complete(id) {
            Some(task) if task.completed => println!("Completed task {id} '{}'.", task.text),
            Some(task) => println!("Reopened task {id} '{}'.", task.text),
            None => println!("No task {id} in view."),
        }
    }
    Ok(())
}

#[instrument(skip(session, args))]
fn cmd_delete<B: Backend>(session: &mut Session<B>, args: &[String]) -> anyhow::Result<()> {
    let ids = parse_ids(args)?;
    let removed = match ids.as_slice() {
        [id] => usize::from(session.store_mut().delete(*id)),
        _ => session.store_mut().delete_many(&ids),
    };
    println!("Deleted {removed} {}.", plural(removed, "task"));
    Ok(())
}

#[instrument(skip(session, args, now))]
fn cmd_timer<B: Backend>(
    session: &mut Session<B>,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let ids = parse_ids(args)?;
    let &[id] = ids.as_slice() else {
        return Err(anyhow!("timer expects exactly one task id"));
    };

    let Some(transition) = session.store_mut().toggle_timer(id, now)? else {
        println!("No task {id} in view.");
        return Ok(());
    };

    if let Some(stopped) = transition.stopped {
        println!(
            "Stopped timer on task {} (+{}, total {}).",
            stopped.id,
            format_clock(stopped.elapsed),
            format_clock(stopped.time_spent)
        );
    }
    if let Some((started, _)) = transition.started {
        println!("Started timer on task {started}.");
    }
    Ok(())
}

fn cmd_clear<B: Backend>(session: &mut Session<B>) -> anyhow::Result<()> {
    let removed = session.store_mut().clear_completed();
    println!("Cleared {removed} completed {}.", plural(removed, "task"));
    Ok(())
}

/// `move [ids...] [to:<date>]`. Without ids the overdue tasks move; without
/// `to:` they land on the viewed day.
#[instrument(skip(session, args, now))]
fn cmd_move<B: Backend>(
    session: &mut Session<B>,
    args: &[String],
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    let mut target = session.scope();
    let mut id_args = Vec::new();
    for arg in args {
        match arg.strip_prefix("to:") {
            Some(raw) => target = parse_scope(raw, session.navigator().today())?,
            None => id_args.push(arg.clone()),
        }
    }

    let store = session.store_mut();
    let moved = if id_args.is_empty() {
        let overdue: Vec<TaskId> = store.overdue().iter().map(|task| task.id).collect();
        if overdue.is_empty() {
            println!("Nothing to move.");
            return Ok(());
        }
        store.move_to_scope(&overdue, target, now)
    } else {
        store.move_to_scope(&parse_ids(&id_args)?, target, now)
    };

    println!(
        "Moved {} {} to {}.",
        moved.len(),
        plural(moved.len(), "task"),
        format_scope(target)
    );
    Ok(())
}

fn cmd_stats<B: Backend>(session: &Session<B>, renderer: &mut Renderer) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    renderer.write_stats(
        &mut out,
        session.scope(),
        &session.productivity(),
        &session.category_time(),
        session.registry().list_categories(),
    )
}

fn cmd_categories<B: Backend>(session: &Session<B>, renderer: &mut Renderer) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    renderer.write_categories(&mut out, session.registry().list_categories())
}

#[instrument(skip(session, args))]
fn cmd_category<B: Backend>(session: &mut Session<B>, args: &[String]) -> anyhow::Result<()> {
    let (name, emoji) = match args {
        [] => return Err(anyhow!("usage: daybook category <name> [emoji]")),
        [name] => (name.as_str(), ""),
        [name, emoji, ..] => (name.as_str(), emoji.as_str()),
    };

    let created = session.registry_mut().add_category(name, emoji)?;
    println!("Added category {} {}.", created.emoji, created.name);
    Ok(())
}

/// Live clock for the running timer until Ctrl-C. The timer itself keeps
/// running after the watch ends.
fn cmd_watch<B: Backend>(session: &Session<B>) -> anyhow::Result<()> {
    let Some(task) = session.store().running_task().cloned() else {
        println!("No timer is running. Start one with `daybook timer <id>`.");
        return Ok(());
    };

    println!("Watching task {} '{}'. Press Ctrl-C to stop watching.", task.id, task.text);
    let store = session.store();
    block_on(async move {
        let ticker = DisplayTicker::spawn(&task);
        let mut rx = ticker.subscribe();
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        let mut out = io::stdout();
        let mut ticks = 0u32;
        loop {
            let seconds = *rx.borrow_and_update();
            write!(out, "\r{}", format_clock(seconds))?;
            out.flush()?;

            if ticks > 0 && ticks % WATCH_RECHECK_TICKS == 0 {
                let id = ticker.snapshot().id;
                match store.stored_running(id) {
                    Ok(stored) if ticker.still_current(stored.as_ref()) => {}
                    Ok(_) => {
                        writeln!(out)?;
                        println!("Timer on task {id} changed in another session; stopped watching.");
                        break;
                    }
                    Err(err) => warn!(error = %err, "could not re-check timer state"),
                }
            }
            ticks += 1;

            tokio::select! {
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                signal = &mut ctrl_c => {
                    if let Err(err) = signal {
                        warn!(error = %err, "failed listening for ctrl_c");
                    }
                    writeln!(out)?;
                    break;
                }
            }
        }

        ticker.cancel();
        Ok::<(), anyhow::Error>(())
    })?
}

fn cmd_inspire(cfg: &Config) -> anyhow::Result<()> {
    let collaborator = Collaborator::new(GeminiClient::from_config(cfg)?);
    let quote = block_on(collaborator.quote_or_placeholder())?;
    println!("{quote}");
    Ok(())
}

fn cmd_summary<B: Backend>(session: &Session<B>, cfg: &Config) -> anyhow::Result<()> {
    let collaborator = Collaborator::new(GeminiClient::from_config(cfg)?);
    let tasks = session.store().tasks();
    let summary = block_on(collaborator.summary_or_placeholder(tasks))?;
    println!("{summary}");
    Ok(())
}

fn cmd_config(cfg: &Config) -> anyhow::Result<()> {
    let sorted: BTreeMap<_, _> = cfg.iter().collect();
    for (k, v) in sorted {
        let shown = if k == "ai.key" { "********" } else { v.as_str() };
        println!("{k}={shown}");
    }
    Ok(())
}

fn cmd_help() -> anyhow::Result<()> {
    println!(
        "\
Usage: daybook [--date <day>] [--data <dir>] [rc.<key>=<value>] <command> [args]

Commands:
  list                         tasks of the viewed day plus overdue ones
  add <text...> [cat:<name>]   add a task to the viewed day
  done <id...>                 toggle completion
  delete <id...>               delete tasks
  timer <id>                   start or stop a task timer
  clear                        delete completed tasks of the day
  move [id...] [to:<day>]      move tasks (default: overdue ones to the viewed day)
  stats                        completion and time per category
  categories                   list categories
  category <name> [emoji]      add a category
  watch                        live clock of the running timer
  inspire                      a motivational quote
  summary                      AI summary of the viewed day
  config                       show effective configuration
  help | version"
    );
    Ok(())
}

fn report_unsynced<B: Backend>(session: &Session<B>) {
    for (id, reason) in session.store().unsynced() {
        warn!(id, reason, "change not persisted");
        eprintln!("warning: changes to task {id} were not saved ({reason}).");
    }
}

fn parse_ids(args: &[String]) -> anyhow::Result<Vec<TaskId>> {
    if args.is_empty() {
        return Err(anyhow!("expected at least one task id"));
    }
    args.iter()
        .map(|arg| {
            arg.trim()
                .parse::<TaskId>()
                .with_context(|| format!("invalid task id: {arg}"))
        })
        .collect()
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        noun.to_string()
    } else {
        format!("{noun}s")
    }
}

fn block_on<F: Future>(fut: F) -> anyhow::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(fut))
}
