use std::{
    fs, io,
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::{Context, Result};
use chrono::DateTime;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use shared::protocol::ResponseRecord;
use storage::{html_to_text, list_cases, load_cases_or_samples, read_records};
use study::StudyPlan;

const DEFAULT_CASES_DIR: &str = "./data/Cases";
const PREVIEW_CHARS: usize = 80;

#[derive(Parser, Debug)]
#[command(about = "Operator helpers for the case study server")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the case files the server would load.
    ListCases {
        #[arg(long)]
        cases_dir: Option<PathBuf>,
    },
    /// Check the configured sequence against the available cases.
    CheckPlan {
        #[arg(long, default_value = "study.toml")]
        config: PathBuf,
        #[arg(long)]
        cases_dir: Option<PathBuf>,
    },
    /// Print saved responses in the order they were recorded.
    Responses {
        #[arg(long, default_value = "./saved_data")]
        responses_dir: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

/// The subset of `study.toml` the tools care about. Other keys are ignored.
#[derive(Debug, Default, Deserialize)]
struct PlanFile {
    cases_dir: Option<PathBuf>,
    sequence: Option<StudyPlan>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    match cli.command {
        Command::ListCases { cases_dir } => {
            let dir = cases_dir.unwrap_or_else(|| PathBuf::from(DEFAULT_CASES_DIR));
            list_case_files(&dir);
            Ok(ExitCode::SUCCESS)
        }
        Command::CheckPlan { config, cases_dir } => check_plan(&config, cases_dir),
        Command::Responses {
            responses_dir,
            json,
        } => {
            let records = read_records(&responses_dir).await?;
            if json {
                for record in &records {
                    println!("{}", serde_json::to_string(record)?);
                }
            } else {
                print_records(&records);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn list_case_files(dir: &Path) {
    if list_cases(dir).is_empty() {
        println!(
            "no case files in {}; the server will use the built-in samples:",
            dir.display()
        );
    }
    for case in load_cases_or_samples(dir) {
        println!(
            "{:>3}  {:<24}  {}",
            case.index,
            case.source_file,
            preview(&case.text)
        );
    }
}

fn check_plan(config: &Path, cases_dir: Option<PathBuf>) -> Result<ExitCode> {
    let file = read_plan_file(config)?;
    let dir = cases_dir
        .or(file.cases_dir)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CASES_DIR));
    let plan = file.sequence.unwrap_or_default();
    let cases = load_cases_or_samples(&dir);

    if let Err(error) = plan.validate(&cases) {
        eprintln!("{error}");
        return Ok(ExitCode::FAILURE);
    }

    for (position, slot) in plan.slots().iter().enumerate() {
        let case = &cases[slot.resolved_case_index(position)];
        let difficulty = slot
            .difficulty
            .as_deref()
            .map(|d| format!(" ({d})"))
            .unwrap_or_default();
        println!(
            "slot {}: {}{} -> {}",
            position + 1,
            slot.condition,
            difficulty,
            case.source_file
        );
    }
    println!("plan ok: {} slots over {} cases", plan.len(), cases.len());
    Ok(ExitCode::SUCCESS)
}

fn read_plan_file(path: &Path) -> Result<PlanFile> {
    match fs::read_to_string(path) {
        Ok(raw) => toml::from_str(&raw)
            .with_context(|| format!("invalid config file '{}'", path.display())),
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(PlanFile::default()),
        Err(error) => {
            Err(error).with_context(|| format!("failed to read config file '{}'", path.display()))
        }
    }
}

fn print_records(records: &[ResponseRecord]) {
    if records.is_empty() {
        println!("no saved responses");
        return;
    }
    for record in records {
        let when = DateTime::from_timestamp_micros((record.timestamp * 1_000_000.0) as i64)
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| record.timestamp.to_string());
        let heading = match record.difficulty.as_deref() {
            Some(difficulty) => format!("{} ({difficulty})", record.condition),
            None => record.condition.to_string(),
        };
        println!(
            "{when}  {}  case {}  {:<18}  {}",
            record.session_id, record.case_ordinal, heading, record.case_file
        );
    }
}

fn preview(markup: &str) -> String {
    let text = html_to_text(markup).replace('\n', " ");
    if text.chars().count() <= PREVIEW_CHARS {
        return text;
    }
    let cut: String = text.chars().take(PREVIEW_CHARS).collect();
    format!("{cut}...")
}
