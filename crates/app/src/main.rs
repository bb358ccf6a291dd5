use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use proctor_core::model::{DEFAULT_TIME_LIMIT_SECS, ProctorSettings, TestId};
use proctor_core::time::format_countdown;
use services::{Clock, ProctorLoopService, ResultSummaryService};
use storage::repository::Storage;
use tracing_subscriber::EnvFilter;

mod script;

use script::EffectLine;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingScript,
    UnknownArg(String),
    InvalidTestId { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNumber { flag: &'static str, raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingScript => write!(f, "replay requires --script"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTestId { raw } => write!(f, "invalid --test-id value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNumber { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn require_number(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<u32, ArgsError> {
    let value = require_value(args, flag)?;
    value
        .parse()
        .map_err(|_| ArgsError::InvalidNumber { flag, raw: value })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Replay,
    Results,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "replay" => Some(Self::Replay),
            "results" => Some(Self::Results),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    test_id: TestId,
    script: Option<PathBuf>,
    grace_secs: Option<u32>,
    max_warnings: Option<u32>,
    strict: bool,
    require_ack: bool,
    limit: u32,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let db_url = std::env::var("PROCTOR_DB_URL")
            .unwrap_or_else(|_| "sqlite:proctor.sqlite3?mode=rwc".into());
        let test_id = std::env::var("PROCTOR_TEST_ID")
            .ok()
            .and_then(|value| value.parse::<TestId>().ok())
            .unwrap_or_else(|| TestId::new(1));
        let mut parsed = Self {
            db_url,
            test_id,
            script: None,
            grace_secs: None,
            max_warnings: None,
            strict: false,
            require_ack: false,
            limit: 20,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = value;
                }
                "--test-id" => {
                    let value = require_value(args, "--test-id")?;
                    parsed.test_id = value
                        .parse::<TestId>()
                        .map_err(|_| ArgsError::InvalidTestId { raw: value.clone() })?;
                }
                "--script" => {
                    parsed.script = Some(PathBuf::from(require_value(args, "--script")?));
                }
                "--grace-secs" => parsed.grace_secs = Some(require_number(args, "--grace-secs")?),
                "--max-warnings" => {
                    parsed.max_warnings = Some(require_number(args, "--max-warnings")?);
                }
                "--limit" => parsed.limit = require_number(args, "--limit")?,
                "--strict" => parsed.strict = true,
                "--require-ack" => parsed.require_ack = true,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn settings(&self) -> Result<ProctorSettings, proctor_core::model::SettingsError> {
        let base = ProctorSettings::standard();
        ProctorSettings::new(
            DEFAULT_TIME_LIMIT_SECS,
            self.grace_secs.unwrap_or(base.face_grace_secs()),
            self.max_warnings.unwrap_or(base.max_warnings()),
            base.notice_secs(),
            base.auto_submit_delay_secs(),
            self.require_ack,
            self.strict,
            base.repeat_face_violations(),
            base.penalize_fullscreen_refusal(),
        )
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- replay --script <events.json> [options]");
    eprintln!("  cargo run -p app -- results [--test-id <id>] [--limit <n>]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:proctor.sqlite3?mode=rwc)");
    eprintln!("  --test-id <id>            Test to attempt or list (default: 1)");
    eprintln!("  --script <path>           Recorded signal script (JSON array)");
    eprintln!("  --grace-secs <n>          Face-loss grace period (default: 5)");
    eprintln!("  --max-warnings <n>        Violations before auto-submit (default: 3)");
    eprintln!("  --strict                  Reject operations outside a running attempt");
    eprintln!("  --require-ack             Warnings stay until acknowledged");
    eprintln!("  --limit <n>               Results to list (default: 20)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PROCTOR_DB_URL, PROCTOR_TEST_ID, RUST_LOG");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn replay(args: &Args, storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let path = args.script.as_ref().ok_or(ArgsError::MissingScript)?;
    let events = script::parse_script(&std::fs::read_to_string(path)?)?;

    let clock = Clock::default_clock();
    let svc = ProctorLoopService::new(
        clock,
        Arc::clone(&storage.tests),
        Arc::clone(&storage.results),
    )
    .with_settings(args.settings()?);

    let mut session = svc.open_attempt(args.test_id).await?;
    let base = clock.now();
    tracing::info!(
        test_id = %args.test_id,
        attempt_id = %session.attempt_id(),
        events = events.len(),
        "replaying script"
    );

    for event in &events {
        script::apply(&mut session, event, base)?;
        for effect in session.take_effects() {
            let line = EffectLine {
                at: event.at,
                effect: &effect,
            };
            println!("{}", serde_json::to_string(&line)?);
        }
    }

    if !session.is_complete() {
        let progress = session.progress();
        eprintln!(
            "attempt still running: {} left, {}/{} answered, {} violation(s)",
            format_countdown(progress.remaining_secs),
            progress.answered,
            progress.total,
            progress.violations
        );
        return Ok(());
    }

    let id = svc.finalize_result(&mut session).await?;
    if let Some(result) = session.result() {
        println!("{}", serde_json::to_string_pretty(result)?);
    }
    eprintln!("stored result {id}");
    Ok(())
}

async fn results(args: &Args, storage: &Storage) -> Result<(), Box<dyn std::error::Error>> {
    let summaries =
        ResultSummaryService::new(Clock::default_clock(), Arc::clone(&storage.results));
    let items = summaries.list_results(args.test_id, args.limit).await?;
    if items.is_empty() {
        println!("no results for test {}", args.test_id);
        return Ok(());
    }

    for item in items {
        let duration = u32::try_from(item.duration_secs.max(0)).unwrap_or(u32::MAX);
        println!(
            "#{} {} {} {} score={}% ({}/{}) marks={}/{} violations={} took={}",
            item.id,
            item.completed_at.to_rfc3339(),
            item.attempt_id,
            item.reason,
            item.score,
            item.correct,
            item.total,
            item.marks_awarded,
            item.total_marks,
            item.violations,
            format_countdown(duration)
        );
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(());
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(());
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            eprintln!("unknown subcommand: {first}");
            print_usage();
            ArgsError::UnknownArg(first.clone())
        })?,
    };

    let parsed = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    init_tracing();
    let storage = Storage::sqlite(&parsed.db_url).await?;

    match cmd {
        Command::Replay => replay(&parsed, &storage).await,
        Command::Results => results(&parsed, &storage).await,
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
