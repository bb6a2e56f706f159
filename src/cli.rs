//! Command-line flags and the interactive prompts that fill in whatever was not given.

use crate::core::config::ScoutConfig;
use crate::types::RunOptions;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use thiserror::Error;

pub const USAGE: &str = "\
feed-scout: scroll a feed in a running Chromium and write an HTML report of its posts

Start the browser yourself first, logged in and on the feed:
    chromium --remote-debugging-port=9222

USAGE:
    feed-scout [OPTIONS]

OPTIONS:
    --filter <TEXT>        keep only posts whose text contains TEXT (case-insensitive)
    --scroll / --no-scroll auto-scroll the page (default: ask, or no)
    --steps <N>            scroll steps (0 = until no new posts appear)
    --patience <N>         stop after N passes without a new post
    --endpoint <URL>       remote-debugging endpoint (default http://127.0.0.1:9222)
    --tab <TEXT>           attach to the first tab whose URL contains TEXT
    --reports-dir <DIR>    where reports are written (default ./reports)
    --json                 also write the posts as JSON next to the report
    --no-prompt            never ask; use flags, config and defaults
    -h, --help             print this help
    -V, --version          print the version
";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CliError {
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("invalid number for {flag}: {value}")]
    InvalidNumber { flag: String, value: String },
    #[error("unknown argument: {0} (see --help)")]
    Unknown(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    pub filter: Option<String>,
    pub auto_scroll: Option<bool>,
    pub steps: Option<usize>,
    pub patience: Option<usize>,
    pub endpoint: Option<String>,
    pub tab: Option<String>,
    pub reports_dir: Option<PathBuf>,
    pub json: bool,
    pub no_prompt: bool,
    pub help: bool,
    pub version: bool,
}

fn parse_number(flag: &str, value: &str) -> Result<usize, CliError> {
    value.trim().parse().map_err(|_| CliError::InvalidNumber {
        flag: flag.to_string(),
        value: value.to_string(),
    })
}

/// Parse flags (without the program name). Accepts `--flag value` and `--flag=value`.
pub fn parse_args<I>(args: I) -> Result<CliArgs, CliError>
where
    I: IntoIterator<Item = String>,
{
    let mut out = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        let mut value = |name: &str| -> Result<String, CliError> {
            match inline.clone() {
                Some(v) => Ok(v),
                None => args
                    .next()
                    .ok_or_else(|| CliError::MissingValue(name.to_string())),
            }
        };

        match flag.as_str() {
            "--filter" => out.filter = Some(value("--filter")?),
            "--scroll" => out.auto_scroll = Some(true),
            "--no-scroll" => out.auto_scroll = Some(false),
            "--steps" => out.steps = Some(parse_number("--steps", &value("--steps")?)?),
            "--patience" => {
                out.patience = Some(parse_number("--patience", &value("--patience")?)?)
            }
            "--endpoint" => out.endpoint = Some(value("--endpoint")?),
            "--tab" => out.tab = Some(value("--tab")?),
            "--reports-dir" => out.reports_dir = Some(PathBuf::from(value("--reports-dir")?)),
            "--json" => out.json = true,
            "--no-prompt" => out.no_prompt = true,
            "-h" | "--help" => out.help = true,
            "-V" | "--version" => out.version = true,
            _ => return Err(CliError::Unknown(arg)),
        }
    }
    Ok(out)
}

/// Source of answers for interactive questions.
pub trait Prompter {
    /// `None` when no answer can be obtained (closed stdin, non-interactive run).
    fn ask(&mut self, question: &str) -> Option<String>;
}

/// Never asks; every question falls back to its default.
pub struct NoPrompt;

impl Prompter for NoPrompt {
    fn ask(&mut self, _question: &str) -> Option<String> {
        None
    }
}

/// Questions on stdout, answers from stdin.
pub struct StdinPrompter;

impl Prompter for StdinPrompter {
    fn ask(&mut self, question: &str) -> Option<String> {
        print!("{}", question);
        std::io::stdout().flush().ok()?;
        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

/// Flags first, then prompts, then config/defaults.
pub fn resolve_run_options(
    args: &CliArgs,
    cfg: &ScoutConfig,
    prompter: &mut dyn Prompter,
) -> RunOptions {
    let text_filter = match &args.filter {
        Some(f) => Some(f.clone()),
        None => prompter.ask("Filter by text (blank = any): "),
    }
    .map(|f| f.trim().to_string())
    .filter(|f| !f.is_empty());

    let auto_scroll = args.auto_scroll.unwrap_or_else(|| {
        prompter
            .ask("Auto-scroll? (y/N): ")
            .is_some_and(|a| matches!(a.trim().to_lowercase().as_str(), "y" | "yes"))
    });

    let default_steps = cfg.resolve_max_steps();
    let steps = match args.steps {
        Some(n) => n,
        None if auto_scroll => prompter
            .ask(&format!("Scroll steps (default {}): ", default_steps))
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(default_steps),
        None => default_steps,
    };

    RunOptions {
        text_filter,
        auto_scroll,
        max_steps: (steps > 0).then_some(steps),
        patience: args.patience.unwrap_or_else(|| cfg.resolve_patience()).max(1),
    }
}
