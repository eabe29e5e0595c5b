use std::fmt;

use chrono::{DateTime, Utc};
use course_core::model::{Course, CourseId, LearningNode, NodeId, NodeType, UnlockRule};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    course_id: CourseId,
    course_title: String,
    videos: u32,
    quiz_threshold: f64,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCourseId { raw: String },
    InvalidVideos { raw: String },
    InvalidThreshold { raw: String },
    InvalidDbUrl { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCourseId { raw } => write!(f, "invalid --course-id value: {raw}"),
            ArgsError::InvalidVideos { raw } => write!(f, "invalid --videos value: {raw}"),
            ArgsError::InvalidThreshold { raw } => write!(f, "invalid --threshold value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
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
        let mut db_url =
            std::env::var("COURSE_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut course_id = std::env::var("COURSE_ID")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .map_or_else(|| CourseId::new(1), CourseId::new);
        let mut course_title =
            std::env::var("COURSE_TITLE").unwrap_or_else(|_| "Intro to Rust".into());
        let mut videos = std::env::var("COURSE_VIDEOS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let mut quiz_threshold = 70.0;
        let mut now: Option<DateTime<Utc>> = None;

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
                "--course-id" => {
                    let value = require_value(&mut args, "--course-id")?;
                    let parsed: u64 = value
                        .parse()
                        .map_err(|_| ArgsError::InvalidCourseId { raw: value.clone() })?;
                    course_id = CourseId::new(parsed);
                }
                "--title" => {
                    let value = require_value(&mut args, "--title")?;
                    course_title = value;
                }
                "--videos" => {
                    let value = require_value(&mut args, "--videos")?;
                    videos = value
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidVideos { raw: value.clone() })?;
                }
                "--threshold" => {
                    let value = require_value(&mut args, "--threshold")?;
                    quiz_threshold = value
                        .parse::<f64>()
                        .map_err(|_| ArgsError::InvalidThreshold { raw: value.clone() })?;
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
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
            course_id,
            course_title,
            videos,
            quiz_threshold,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>    SQLite URL (default: sqlite:dev.sqlite3)");
    eprintln!("  --course-id <id>     Course id to upsert (default: 1)");
    eprintln!("  --title <name>       Course title (default: Intro to Rust)");
    eprintln!("  --videos <n>         Number of video nodes before the quizzes (default: 3)");
    eprintln!("  --threshold <score>  Required score for the quizzes (default: 70)");
    eprintln!("  --now <rfc3339>      Fixed current time for deterministic seeding");
    eprintln!("  -h, --help           Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  COURSE_DB_URL, COURSE_ID, COURSE_TITLE, COURSE_VIDEOS");
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let course = Course::new(args.course_id, args.course_title.clone(), now)?;
    storage.courses.upsert_course(&course).await?;

    // Linear chain: N videos, a checkpoint quiz, an optional SCORM module,
    // and a final exam quiz that also requires the first video explicitly.
    let mut position = 0u32;
    let mut next_id = 1u64;
    let mut node_count = 0u32;

    for i in 0..args.videos {
        let node = LearningNode::new(
            NodeId::new(next_id),
            course.id(),
            position,
            format!("Lesson {} video", i + 1),
            NodeType::Video,
            false,
            UnlockRule::none(),
        )?;
        storage.courses.upsert_node(&node).await?;
        next_id += 1;
        position += 1;
        node_count += 1;
    }

    let checkpoint = LearningNode::new(
        NodeId::new(next_id),
        course.id(),
        position,
        "Checkpoint quiz",
        NodeType::Quiz,
        false,
        UnlockRule::none().with_required_score(args.quiz_threshold)?,
    )?;
    storage.courses.upsert_node(&checkpoint).await?;
    next_id += 1;
    position += 1;
    node_count += 1;

    let extra = LearningNode::new(
        NodeId::new(next_id),
        course.id(),
        position,
        "Bonus material",
        NodeType::Scorm,
        true,
        UnlockRule::none(),
    )?;
    storage.courses.upsert_node(&extra).await?;
    next_id += 1;
    position += 1;
    node_count += 1;

    let exam = LearningNode::new(
        NodeId::new(next_id),
        course.id(),
        position,
        "Final exam",
        NodeType::Quiz,
        false,
        UnlockRule::with_prerequisites([NodeId::new(1)])
            .with_required_score(args.quiz_threshold)?,
    )?;
    storage.courses.upsert_node(&exam).await?;
    node_count += 1;

    println!(
        "Seeded course {} ({}) with {} nodes into {}",
        course.id().value(),
        args.course_title,
        node_count,
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
