use std::fmt;
use std::str::FromStr;

use assess_core::model::{
    AssessmentResult, DifficultyFilter, ItemId, OwnerId, Scope, SessionId, TopicId, TopicQuizStats,
};
use serde::Serialize;
use services::{AppServices, Clock, StartOptions};

mod logging;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    InvalidValue { flag: &'static str, raw: String },
    ConflictingScope,
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidValue { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::ConflictingScope => write!(f, "use either --topic or --global, not both"),
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

fn parse_value<T: FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<T, ArgsError> {
    let raw = require_value(args, flag)?;
    raw.trim()
        .parse()
        .map_err(|_| ArgsError::InvalidValue { flag, raw })
}

fn required<T>(value: Option<T>, flag: &'static str) -> Result<T, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app start   (--topic <id> | --global) [--difficulty <level>] [--count <n>]");
    eprintln!("  app answer  --session <id> --item <id> --value <answer> [--last-index <n>]");
    eprintln!("  app submit  --session <id> [--force]");
    eprintln!("  app resume  (--topic <id> | --global)");
    eprintln!("  app discard --session <id>");
    eprintln!("  app history [--page <n>] [--limit <n>]");
    eprintln!("  app detail  --session <id>");
    eprintln!();
    eprintln!("Common flags:");
    eprintln!("  --db <sqlite_url>   default sqlite://assess.sqlite3");
    eprintln!("  --owner <id>        default 1");
    eprintln!();
    eprintln!("Levels: mixed, beginner, intermediate, advanced");
    eprintln!("Multi-select answers are comma-separated option ids, e.g. --value A,C");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  ASSESS_DB_URL, ASSESS_OWNER_ID, ASSESS_AI_API_KEY, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Answer,
    Submit,
    Resume,
    Discard,
    History,
    Detail,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "start" => Some(Self::Start),
            "answer" => Some(Self::Answer),
            "submit" => Some(Self::Submit),
            "resume" => Some(Self::Resume),
            "discard" => Some(Self::Discard),
            "history" => Some(Self::History),
            "detail" => Some(Self::Detail),
            _ => None,
        }
    }
}

struct Args {
    db_url: String,
    owner_id: OwnerId,
    scope: Option<Scope>,
    session_id: Option<SessionId>,
    item_id: Option<ItemId>,
    value: Option<String>,
    last_index: Option<u32>,
    difficulty: Option<DifficultyFilter>,
    count: Option<u32>,
    force: bool,
    page: u32,
    limit: u32,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("ASSESS_DB_URL")
                .ok()
                .map_or_else(|| "sqlite://assess.sqlite3".into(), normalize_sqlite_url),
            owner_id: std::env::var("ASSESS_OWNER_ID")
                .ok()
                .and_then(|value| value.parse::<OwnerId>().ok())
                .unwrap_or(OwnerId::new(1)),
            scope: None,
            session_id: None,
            item_id: None,
            value: None,
            last_index: None,
            difficulty: None,
            count: None,
            force: false,
            page: 1,
            limit: 10,
        };

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                }
                "--owner" => parsed.owner_id = parse_value(args, "--owner")?,
                "--topic" => {
                    let topic: TopicId = parse_value(args, "--topic")?;
                    parsed.set_scope(Scope::Topic(topic))?;
                }
                "--global" => parsed.set_scope(Scope::Global)?,
                "--session" => parsed.session_id = Some(parse_value(args, "--session")?),
                "--item" => parsed.item_id = Some(parse_value(args, "--item")?),
                "--value" => parsed.value = Some(require_value(args, "--value")?),
                "--last-index" => parsed.last_index = Some(parse_value(args, "--last-index")?),
                "--difficulty" => parsed.difficulty = Some(parse_value(args, "--difficulty")?),
                "--count" => parsed.count = Some(parse_value(args, "--count")?),
                "--force" => parsed.force = true,
                "--page" => parsed.page = parse_value(args, "--page")?,
                "--limit" => parsed.limit = parse_value(args, "--limit")?,
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    fn set_scope(&mut self, scope: Scope) -> Result<(), ArgsError> {
        if self.scope.is_some_and(|current| current != scope) {
            return Err(ArgsError::ConflictingScope);
        }
        self.scope = Some(scope);
        Ok(())
    }
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Reply of `submit`: the result, plus the quiz standing for topic sessions.
#[derive(Serialize)]
struct SubmitReply<'a> {
    #[serde(flatten)]
    result: &'a AssessmentResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    topic_quiz: Option<TopicQuizReply>,
}

#[derive(Serialize)]
struct TopicQuizReply {
    #[serde(flatten)]
    stats: TopicQuizStats,
    can_mark_complete: bool,
}

impl<'a> SubmitReply<'a> {
    fn new(result: &'a AssessmentResult, topic_quiz: Option<TopicQuizStats>) -> Self {
        Self {
            result,
            topic_quiz: topic_quiz.map(|stats| TopicQuizReply {
                can_mark_complete: stats.can_mark_complete(),
                stats,
            }),
        }
    }
}

fn print_json(value: &impl Serialize) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
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
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "unknown subcommand")
        })?,
    };

    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&args.db_url)?;
    let app = AppServices::new_sqlite(&args.db_url, Clock::system()).await?;
    let sessions = app.sessions();
    let owner_id = args.owner_id;

    match cmd {
        Command::Start => {
            let scope = required(args.scope, "--topic or --global")?;
            let options = StartOptions {
                difficulty: args.difficulty,
                count: args.count,
            };
            print_json(&sessions.start(owner_id, scope, options).await?)
        }
        Command::Answer => {
            let session_id = required(args.session_id, "--session")?;
            let item_id = required(args.item_id, "--item")?;
            let value = required(args.value, "--value")?;
            let saved = app
                .answers()
                .save(session_id, owner_id, item_id, &value, args.last_index)
                .await?;
            print_json(&saved)
        }
        Command::Submit => {
            let session_id = required(args.session_id, "--session")?;
            let outcome = sessions.submit(session_id, owner_id, args.force).await?;
            print_json(&SubmitReply::new(&outcome.result, outcome.topic_quiz))?;
            // The process exits right after; give enrichment its bounded chance to land.
            if let Some(handle) = outcome.enrichment {
                if let Err(err) = handle.await {
                    tracing::warn!(error = %err, "enrichment task failed");
                }
            }
            Ok(())
        }
        Command::Resume => {
            let scope = required(args.scope, "--topic or --global")?;
            print_json(&sessions.resume(owner_id, scope).await?)
        }
        Command::Discard => {
            let session_id = required(args.session_id, "--session")?;
            print_json(&sessions.discard(session_id, owner_id).await?)
        }
        Command::History => print_json(&sessions.history(owner_id, args.page, args.limit).await?),
        Command::Detail => {
            let session_id = required(args.session_id, "--session")?;
            print_json(&sessions.detail(session_id, owner_id).await?)
        }
    }
}

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
