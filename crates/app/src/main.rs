use std::env;
use std::fmt;

use practice_core::ProgressConfig;
use practice_core::model::Identity;
use services::{AnswerSubmission, AppServices, Clock, Dashboard};
use storage::sqlite::SqliteRepository;
use tracing_subscriber::{EnvFilter, fmt as log_fmt, prelude::*};

const DEFAULT_DB_URL: &str = "sqlite://practice.sqlite3";

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    MissingIdentity,
    UnknownArg(String),
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required"),
            ArgsError::MissingIdentity => write!(f, "either --email or --name with --pin is required"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
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

fn required(value: Option<String>, flag: &'static str) -> Result<String, ArgsError> {
    value.ok_or(ArgsError::MissingFlag { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  app init      [--db <sqlite_url>]");
    eprintln!("  app signin    <who> [--display-name <name>]");
    eprintln!("  app record    <who> --card <id> --topic <id> --correct|--incorrect [--next <id>]");
    eprintln!("  app dashboard <who>");
    eprintln!("  app admin     --email <admin e>");
    eprintln!();
    eprintln!("<who> is --email <e>, or --name <name> --pin <4 digits> for legacy accounts.");
    eprintln!();
    eprintln!("Defaults:");
    eprintln!("  --db {DEFAULT_DB_URL}");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  PRACTICE_DB_URL, PRACTICE_LOG, PRACTICE_LOG_FORMAT=json");
    eprintln!("  PRACTICE_MASTERY_THRESHOLD, PRACTICE_DAILY_GOAL, PRACTICE_RECENT_LIMIT,");
    eprintln!("  PRACTICE_DATES_LIMIT, PRACTICE_ADMIN_EMAILS");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Init,
    SignIn,
    Record,
    Dashboard,
    Admin,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "init" => Some(Self::Init),
            "signin" => Some(Self::SignIn),
            "record" => Some(Self::Record),
            "dashboard" => Some(Self::Dashboard),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    db_url: String,
    email: Option<String>,
    name: Option<String>,
    pin: Option<String>,
    display_name: Option<String>,
    card: Option<String>,
    topic: Option<String>,
    correct: Option<bool>,
    next: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: env::var("PRACTICE_DB_URL")
                .ok()
                .map_or_else(|| DEFAULT_DB_URL.into(), normalize_sqlite_url),
            ..Self::default()
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
                "--email" => parsed.email = Some(require_value(args, "--email")?),
                "--name" => parsed.name = Some(require_value(args, "--name")?),
                "--pin" => parsed.pin = Some(require_value(args, "--pin")?),
                "--display-name" => {
                    parsed.display_name = Some(require_value(args, "--display-name")?);
                }
                "--card" => parsed.card = Some(require_value(args, "--card")?),
                "--topic" => parsed.topic = Some(require_value(args, "--topic")?),
                "--next" => parsed.next = Some(require_value(args, "--next")?),
                "--correct" => parsed.correct = Some(true),
                "--incorrect" => parsed.correct = Some(false),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(parsed)
    }

    /// Email identities win when both forms are given.
    fn identity(&self) -> Result<Identity, ArgsError> {
        match (&self.email, &self.name, &self.pin) {
            (Some(email), _, _) => Ok(Identity::email(email.as_str())),
            (None, Some(name), Some(pin)) => Ok(Identity::legacy(name.as_str(), pin.as_str())),
            (None, Some(_), None) => Err(ArgsError::MissingFlag { flag: "--pin" }),
            (None, None, _) => Err(ArgsError::MissingIdentity),
        }
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
        env::current_dir()
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

fn init_tracing() {
    let filter = EnvFilter::try_from_env("PRACTICE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "app=debug,services=debug,storage=debug,info"
        } else {
            "app=info,services=info,storage=info,warn"
        })
    });

    let format = env::var("PRACTICE_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(log_fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(log_fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn print_dashboard(who: &str, dash: &Dashboard) {
    println!("dashboard for {who}");
    println!(
        "  attempts: {} ({} correct, {}%)",
        dash.totals.attempts, dash.totals.correct, dash.accuracy_percent
    );
    println!(
        "  today: {} / {} ({}%){}",
        dash.daily_goal.progress,
        dash.daily_goal.target,
        dash.daily_goal.percent,
        if dash.daily_goal.is_met() { ", goal met" } else { "" }
    );
    println!("  streak: {} day(s)", dash.streak_days);
    println!(
        "  cards: {} attempted, {} mastered",
        dash.attempted_cards, dash.mastered_cards
    );
    for stats in &dash.topic_stats {
        println!(
            "  topic {}: {} attempts, {} correct, {} cards",
            stats.topic_id, stats.attempts, stats.correct, stats.unique_cards
        );
    }
    for event in &dash.recent {
        println!(
            "  {} {} / {} {}",
            event.attempted_at.format("%Y-%m-%d %H:%M"),
            event.topic_id,
            event.card_id,
            if event.correct { "correct" } else { "incorrect" }
        );
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let mut argv = env::args().skip(1);

    let cmd = match argv.next() {
        None => {
            print_usage();
            return Err(ArgsError::MissingValue { flag: "subcommand" }.into());
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

    // Connect and migrate once at startup; services never migrate lazily.
    prepare_sqlite_file(&parsed.db_url)?;
    if cmd == Command::Init {
        let repo = SqliteRepository::connect(&parsed.db_url).await?;
        repo.migrate().await?;
        println!("database ready: {}", parsed.db_url);
        return Ok(());
    }

    let config = ProgressConfig::from_env()?;
    let services =
        AppServices::new_sqlite(&parsed.db_url, Clock::default_clock(), config).await?;
    let progress = services.progress();

    match cmd {
        Command::Init => Ok(()),
        Command::SignIn => {
            let identity = parsed.identity()?;
            let user = progress
                .sign_in(&identity, parsed.display_name.as_deref().unwrap_or_default())
                .await?;
            println!("user {} ({})", user.id, user.display_name);
            Ok(())
        }
        Command::Record => {
            let identity = parsed.identity()?;
            let correct = parsed
                .correct
                .ok_or(ArgsError::MissingFlag { flag: "--correct|--incorrect" })?;
            let answer = AnswerSubmission::parse(
                &required(parsed.card.clone(), "--card")?,
                &required(parsed.topic.clone(), "--topic")?,
                correct,
                parsed.next.as_deref(),
            )?;
            let row = progress.record_answer(&identity, &answer).await?;
            println!(
                "{}: {} attempts, {} correct, {} incorrect{}",
                answer.card_id,
                row.attempts(),
                row.correct,
                row.incorrect,
                if row.mastered { ", mastered" } else { "" }
            );
            Ok(())
        }
        Command::Dashboard => {
            let identity = parsed.identity()?;
            let dash = progress.dashboard(&identity).await?;
            let who = parsed
                .email
                .as_deref()
                .or(parsed.name.as_deref())
                .unwrap_or_default();
            print_dashboard(who, &dash);
            Ok(())
        }
        Command::Admin => {
            let overview = progress.admin_overview(&parsed.identity()?).await?;
            println!(
                "{} users, {} onboarded, {} attempts",
                overview.total_users, overview.onboarded_users, overview.total_attempts
            );
            for row in &overview.users {
                let last = row
                    .last_attempt_at
                    .map_or_else(|| "never".to_string(), |t| t.to_rfc3339());
                println!(
                    "  {} {:<24} {:>5} attempts {:>5} correct  last: {last}",
                    row.user.id, row.user.display_name, row.total_attempts, row.correct_attempts
                );
            }
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        tracing::error!(error = %err, "command failed");
        eprintln!("{err}");
        std::process::exit(2);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Result<Args, ArgsError> {
        let mut iter = raw.iter().map(|s| (*s).to_string());
        Args::parse(&mut iter)
    }

    #[test]
    fn record_flags_are_parsed() {
        let parsed = args(&[
            "--db",
            "sqlite://tmp/p.sqlite3",
            "--email",
            "kid@example.com",
            "--card",
            "c1",
            "--topic",
            "algebra",
            "--incorrect",
            "--next",
            "c2",
        ])
        .unwrap();
        assert_eq!(parsed.db_url, "sqlite://tmp/p.sqlite3");
        assert_eq!(parsed.correct, Some(false));
        assert_eq!(parsed.next.as_deref(), Some("c2"));
    }

    #[test]
    fn legacy_identity_needs_name_and_pin() {
        let parsed = args(&["--name", "Sam", "--pin", "1234"]).unwrap();
        assert_eq!(parsed.identity().unwrap(), Identity::legacy("Sam", "1234"));

        let parsed = args(&["--name", "Sam"]).unwrap();
        assert!(matches!(
            parsed.identity(),
            Err(ArgsError::MissingFlag { flag: "--pin" })
        ));
        assert!(matches!(args(&[]).unwrap().identity(), Err(ArgsError::MissingIdentity)));

        let parsed = args(&["--email", "kid@example.com", "--name", "Sam"]).unwrap();
        assert_eq!(parsed.identity().unwrap(), Identity::email("kid@example.com"));
    }

    #[test]
    fn missing_flag_values_are_errors() {
        assert!(matches!(
            args(&["--email"]),
            Err(ArgsError::MissingValue { flag: "--email" })
        ));
        assert!(matches!(args(&["--bogus"]), Err(ArgsError::UnknownArg(_))));
    }

    #[test]
    fn relative_paths_become_absolute_urls() {
        let url = normalize_sqlite_url("data/p.sqlite3".into());
        assert!(url.starts_with("sqlite:///"));
        assert!(url.ends_with("data/p.sqlite3"));
        assert_eq!(normalize_sqlite_url("sqlite::memory:".into()), "sqlite::memory:");
    }
}
