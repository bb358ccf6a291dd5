use std::fmt;
use std::path::PathBuf;

use proctor_core::model::{TestId, TestStatus};
use storage::document::TestDocument;
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    file: PathBuf,
    test_id: Option<TestId>,
    status: Option<TestStatus>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFile,
    UnknownArg(String),
    InvalidTestId { raw: String },
    InvalidStatus { raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFile => write!(f, "--file is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidTestId { raw } => write!(f, "invalid --test-id value: {raw}"),
            ArgsError::InvalidStatus { raw } => {
                write!(f, "invalid --status value (draft|published|live|closed): {raw}")
            }
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
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

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("PROCTOR_DB_URL")
            .unwrap_or_else(|_| "sqlite:proctor.sqlite3?mode=rwc".into());
        let mut test_id = std::env::var("PROCTOR_TEST_ID")
            .ok()
            .and_then(|value| value.parse::<TestId>().ok());
        let mut file: Option<PathBuf> = None;
        let mut status: Option<TestStatus> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--file" => {
                    let value = require_value(&mut args, "--file")?;
                    file = Some(PathBuf::from(value));
                }
                "--test-id" => {
                    let value = require_value(&mut args, "--test-id")?;
                    let parsed = value
                        .parse::<TestId>()
                        .map_err(|_| ArgsError::InvalidTestId { raw: value.clone() })?;
                    test_id = Some(parsed);
                }
                "--status" => {
                    let value = require_value(&mut args, "--status")?;
                    let parsed = value
                        .parse::<TestStatus>()
                        .map_err(|_| ArgsError::InvalidStatus { raw: value.clone() })?;
                    status = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            file: file.ok_or(ArgsError::MissingFile)?,
            test_id,
            status,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- --file <test.json> [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:proctor.sqlite3?mode=rwc)");
    eprintln!("  --file <path>             Test document to import (JSON)");
    eprintln!("  --test-id <id>            Id to store the test under (default: document id, else 1)");
    eprintln!("  --status <status>         Override the document status");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  PROCTOR_DB_URL, PROCTOR_TEST_ID");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let raw = std::fs::read_to_string(&args.file)?;
    let mut document = TestDocument::from_json(&raw)?;
    if let Some(status) = args.status {
        document.status = Some(status.as_str().to_owned());
    }
    let id = args
        .test_id
        .or(document.id.map(TestId::new))
        .unwrap_or_else(|| TestId::new(1));
    let test = document.into_definition(id)?;

    let storage = Storage::sqlite(&args.db_url).await?;
    storage.tests.upsert_test(&test).await?;

    println!(
        "Imported test {} ({:?}, {} questions, {}) into {}",
        test.id(),
        test.title(),
        test.question_count(),
        test.status(),
        args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
