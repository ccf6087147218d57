use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use contracts::{Command, QueryResponse};
use progression_api::{CampaignTracker, TrackerConfig};
use serde::Serialize;
use serde_json::Value;

const DEFAULT_SQLITE_PATH: &str = "progression.sqlite";

#[derive(Parser, Debug)]
#[command(author, version, about = "Campaign progression tracker", long_about = None)]
struct Cli {
    /// SQLite file holding tracker state (falls back to PROGRESSION_SQLITE_PATH).
    #[arg(long, global = true)]
    sqlite: Option<PathBuf>,

    /// Reference catalog JSON (falls back to PROGRESSION_CATALOG_PATH, then the built-in catalog).
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Keep state in memory only.
    #[arg(long, global = true, conflicts_with = "sqlite")]
    in_memory: bool,

    #[command(subcommand)]
    command: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Submit JSON commands from a file, or stdin when the path is `-`.
    Apply { path: PathBuf },
    /// Derived tier of a knight.
    Tier { knight_uid: String },
    /// Contract tiers a knight may select.
    Tiers { knight_uid: String },
    /// Full knight record.
    Knight { knight_uid: String },
    /// Investigation counts for one chapter.
    Chapter { knight_uid: String, chapter: u32 },
    /// Full campaign record.
    Campaign { campaign_id: String },
    /// Kingdom contracts with selectability for the campaign's party leader.
    Contracts {
        campaign_id: String,
        kingdom_id: String,
    },
    /// Active bestiary stage for a campaign in a kingdom.
    Stage {
        campaign_id: String,
        kingdom_id: String,
    },
    /// Monsters available at the active stage.
    Monsters {
        campaign_id: String,
        kingdom_id: String,
    },
    /// Current district wheel.
    Wheel {
        campaign_id: String,
        kingdom_id: String,
    },
    /// Stored events after a sequence number.
    Events {
        #[arg(long, default_value_t = 0)]
        after: u64,
    },
    /// Every submitted command with its result.
    Log,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn tracker_config(cli: &Cli) -> TrackerConfig {
    let mut config = TrackerConfig::from_env();
    if let Some(path) = cli.sqlite.as_ref() {
        config = config.with_sqlite_path(path);
    }
    if let Some(path) = cli.catalog.as_ref() {
        config = config.with_catalog_path(path);
    }
    if cli.in_memory {
        config.sqlite_path = None;
    } else if config.sqlite_path.is_none() {
        config.sqlite_path = Some(PathBuf::from(DEFAULT_SQLITE_PATH));
    }
    config
}

fn run(cli: Cli) -> Result<(), String> {
    let config = tracker_config(&cli);
    let mut tracker = CampaignTracker::from_config(&config)
        .map_err(|err| format!("failed to open tracker: {err}"))?;

    match cli.command {
        Action::Apply { path } => apply_commands(&mut tracker, &path),
        Action::Tier { knight_uid } => print_query("tier", tracker.calculate_tier(&knight_uid)),
        Action::Tiers { knight_uid } => print_query(
            "available_contract_tiers",
            tracker.available_contract_tiers(&knight_uid),
        ),
        Action::Knight { knight_uid } => print_query("knight", tracker.knight(&knight_uid)),
        Action::Chapter {
            knight_uid,
            chapter,
        } => print_query(
            "chapter_summary",
            tracker.chapter_summary(&knight_uid, chapter),
        ),
        Action::Campaign { campaign_id } => print_query("campaign", tracker.campaign(&campaign_id)),
        Action::Contracts {
            campaign_id,
            kingdom_id,
        } => print_query(
            "contract_options",
            tracker.contract_options(&campaign_id, &kingdom_id),
        ),
        Action::Stage {
            campaign_id,
            kingdom_id,
        } => print_query(
            "active_stage",
            tracker.active_stage(&campaign_id, &kingdom_id),
        ),
        Action::Monsters {
            campaign_id,
            kingdom_id,
        } => print_query(
            "eligible_monsters",
            tracker.eligible_monsters(&campaign_id, &kingdom_id),
        ),
        Action::Wheel {
            campaign_id,
            kingdom_id,
        } => print_query(
            "district_wheel",
            tracker.district_wheel(&campaign_id, &kingdom_id),
        ),
        Action::Events { after } => {
            let events = tracker
                .event_history(after)
                .map_err(|err| format!("failed to load events: {err}"))?;
            print_json(&QueryResponse::new("events", to_value(&events)?))
        }
        Action::Log => print_json(&QueryResponse::new(
            "command_log",
            to_value(tracker.command_log())?,
        )),
    }
}

/// Accepts a single command object or an array of them.
fn apply_commands(tracker: &mut CampaignTracker, path: &Path) -> Result<(), String> {
    let raw = if path.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|err| format!("failed to read stdin: {err}"))?;
        buffer
    } else {
        fs::read_to_string(path)
            .map_err(|err| format!("failed to read {}: {err}", path.display()))?
    };

    let value: Value =
        serde_json::from_str(&raw).map_err(|err| format!("invalid command json: {err}"))?;
    let commands: Vec<Command> = match value {
        Value::Array(_) => serde_json::from_value(value),
        other => serde_json::from_value(other).map(|command| vec![command]),
    }
    .map_err(|err| format!("invalid command json: {err}"))?;

    let mut results = Vec::with_capacity(commands.len());
    for command in commands {
        results.push(tracker.submit_command(command));
    }
    print_json(&results)?;

    if let Some(error) = tracker.last_persistence_error() {
        return Err(format!("persistence error: {error}"));
    }
    Ok(())
}

fn print_query<T: Serialize>(
    query_type: &str,
    result: Result<T, contracts::ApiError>,
) -> Result<(), String> {
    match result {
        Ok(data) => print_json(&QueryResponse::new(query_type, to_value(&data)?)),
        Err(error) => {
            print_json(&error)?;
            Err(format!("{query_type} failed: {error}"))
        }
    }
}

fn to_value<T: Serialize + ?Sized>(data: &T) -> Result<Value, String> {
    serde_json::to_value(data).map_err(|err| format!("failed to encode response: {err}"))
}

fn print_json<T: Serialize + ?Sized>(data: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(data)
        .map_err(|err| format!("failed to encode response: {err}"))?;
    println!("{rendered}");
    Ok(())
}
