use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "daybook",
    version,
    about = "Daybook: daily tasks, timers and productivity stats",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    /// Day to view: today, yesterday, tomorrow, YYYY-MM-DD, +N or -N.
    #[arg(long = "date", short = 'd', allow_hyphen_values = true)]
    pub date: Option<String>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

/// Log filter override checked before `RUST_LOG`.
pub const LOG_ENV_VAR: &str = "DAYBOOK_LOG";

/// Each `-v` raises and each `-q` lowers the level one step from `warn`.
pub fn default_log_level(verbose: u8, quiet: u8) -> &'static str {
    match i16::from(verbose) - i16::from(quiet) {
        ..=-1 => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = default_log_level(verbose, quiet);
    let env_filter = match std::env::var(LOG_ENV_VAR) {
        Ok(directives) => EnvFilter::try_new(&directives)
            .map_err(|e| anyhow!("invalid {LOG_ENV_VAR} filter {directives:?}: {e}"))?,
        Err(_) => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?,
    };

    // Targets only help once internals are being logged.
    let detailed = matches!(level, "debug" | "trace");
    let init_result = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(detailed)
        .without_time()
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.key=value` / `rc.key:value` overrides out of the
/// argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let s = arg.to_string_lossy();
        if let Some(rest) = s.strip_prefix("rc.") {
            let parsed = if let Some((k, v)) = rest.split_once('=') {
                Some((format!("rc.{k}"), v.to_string()))
            } else if let Some((k, v)) = rest.split_once(':') {
                Some((format!("rc.{k}"), v.to_string()))
            } else {
                None
            };

            if let Some((k, v)) = parsed {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
                continue;
            }
        }

        cleaned.push(arg);
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let mut tokens = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string());

        let Some(first) = tokens.next() else {
            let cmd = cfg
                .get("default.command")
                .unwrap_or_else(|| "list".to_string());
            debug!(command = %cmd, "no explicit command, using default");
            return Ok(Self {
                command: cmd,
                args: vec![],
            });
        };

        let known = crate::commands::known_command_names();
        let command = crate::commands::expand_command_abbrev(&first, &known)
            .ok_or_else(|| anyhow!("unknown or ambiguous command: {first}"))?;
        debug!(token = %first, expanded = %command, "resolved command token");

        Ok(Self {
            command: command.to_string(),
            args: tokens.collect(),
        })
    }
}
