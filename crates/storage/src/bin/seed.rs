use std::fmt;

use assess_core::model::{AnswerKey, Choice, Difficulty, Question, QuestionId, TopicId};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    topics: u32,
    per_topic: u32,
    first_id: u64,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidDbUrl { raw: String },
    InvalidTopics { raw: String },
    InvalidPerTopic { raw: String },
    InvalidFirstId { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidTopics { raw } => write!(f, "invalid --topics value: {raw}"),
            ArgsError::InvalidPerTopic { raw } => write!(f, "invalid --per-topic value: {raw}"),
            ArgsError::InvalidFirstId { raw } => write!(f, "invalid --first-id value: {raw}"),
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

fn env_u32(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
        .unwrap_or(default)
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url = std::env::var("ASSESS_DB_URL")
            .unwrap_or_else(|_| "sqlite://assess.sqlite3?mode=rwc".into());
        let mut topics = env_u32("ASSESS_SEED_TOPICS", 3);
        let mut per_topic = env_u32("ASSESS_SEED_PER_TOPIC", 9);
        let mut first_id = 1;

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
                "--topics" => {
                    let value = require_value(&mut args, "--topics")?;
                    topics = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidTopics { raw: value.clone() })?;
                }
                "--per-topic" => {
                    let value = require_value(&mut args, "--per-topic")?;
                    per_topic = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidPerTopic { raw: value.clone() })?;
                }
                "--first-id" => {
                    let value = require_value(&mut args, "--first-id")?;
                    first_id = value
                        .parse::<u64>()
                        .map_err(|_| ArgsError::InvalidFirstId { raw: value.clone() })?;
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
            topics,
            per_topic,
            first_id,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite://assess.sqlite3?mode=rwc)");
    eprintln!("  --topics <n>              Number of topics to fill (default: 3)");
    eprintln!("  --per-topic <n>           Questions per topic (default: 9)");
    eprintln!("  --first-id <id>           First question id to upsert (default: 1)");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  ASSESS_DB_URL, ASSESS_SEED_TOPICS, ASSESS_SEED_PER_TOPIC");
}

const DIFFICULTIES: [Difficulty; 3] = [
    Difficulty::Beginner,
    Difficulty::Intermediate,
    Difficulty::Advanced,
];

/// Builds the `n`-th sample question of a topic, cycling kinds and difficulties.
fn sample_question(
    id: QuestionId,
    topic: TopicId,
    n: u32,
) -> Result<Question, assess_core::model::QuestionError> {
    let difficulty = DIFFICULTIES[(n as usize / 3) % DIFFICULTIES.len()];
    let choices = vec![
        Choice::new("A", "The board of directors"),
        Choice::new("B", "The audit committee"),
        Choice::new("C", "Shareholders at the general meeting"),
        Choice::new("D", "Executive management"),
    ];

    let (stem, choices, key, explanation) = match n % 3 {
        0 => (
            format!("Topic {topic}, question {}: who appoints the chief executive?", n + 1),
            choices,
            AnswerKey::Single {
                correct: "A".into(),
            },
            "Appointing and removing the CEO is a core board duty.",
        ),
        1 => (
            format!("Topic {topic}, question {}: who may approve the annual accounts?", n + 1),
            choices,
            AnswerKey::Multi {
                correct: ["A".into(), "C".into()].into_iter().collect(),
            },
            "The board adopts the accounts; shareholders approve them.",
        ),
        _ => (
            format!("Topic {topic}, question {}: describe how a board divides its work.", n + 1),
            Vec::new(),
            AnswerKey::Short {
                key_points: vec!["roles".into(), "responsibility".into(), "impact".into()],
            },
            "Good answers name clear roles, assigned responsibility, and measured impact.",
        ),
    };

    Question::new(
        id,
        vec![topic],
        n + 1,
        stem,
        choices,
        key,
        Some(explanation.to_owned()),
        difficulty,
    )
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;

    let mut next_id = args.first_id;
    for topic in 1..=args.topics {
        let topic = TopicId::new(u64::from(topic));
        for n in 0..args.per_topic {
            let question = sample_question(QuestionId::new(next_id), topic, n)?;
            storage.questions.upsert_question(&question).await?;
            next_id += 1;
        }
    }

    println!(
        "Seeded {} questions across {} topics into {}",
        next_id - args.first_id,
        args.topics,
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
