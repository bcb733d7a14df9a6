use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use shared::protocol::ResponseRecord;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{info, warn};
use uuid::Uuid;

mod cases;

pub use cases::{html_to_text, list_cases, load_cases_or_samples, sample_cases};

/// Durable sink for per-case answers.
///
/// Implementations report failures honestly; deciding whether a failure may
/// block the participant is the caller's business.
#[async_trait]
pub trait ResponseRecorder: Send + Sync {
    async fn record(&self, record: &ResponseRecord) -> Result<()>;
}

/// Writes each record to its own uniquely named file, one JSON object per line.
#[derive(Debug, Clone)]
pub struct JsonFileRecorder {
    dir: PathBuf,
}

impl JsonFileRecorder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub async fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("failed to create responses directory '{}'", self.dir.display()))
    }
}

#[async_trait]
impl ResponseRecorder for JsonFileRecorder {
    async fn record(&self, record: &ResponseRecord) -> Result<()> {
        self.ensure_dir().await?;

        let path = self.dir.join(record_file_name(record));
        let mut line = serde_json::to_vec(record).context("failed to encode response record")?;
        line.push(b'\n');

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to create response file '{}'", path.display()))?;
        file.write_all(&line)
            .await
            .with_context(|| format!("failed to write response file '{}'", path.display()))?;
        file.sync_all().await?;

        info!(
            path = %path.display(),
            case_ordinal = record.case_ordinal,
            condition = %record.condition,
            "responses saved"
        );
        Ok(())
    }
}

/// `case_{ordinal}_{condition}[_{difficulty}]_{unix_millis}_{nonce}.json`
pub fn record_file_name(record: &ResponseRecord) -> String {
    let difficulty = record
        .difficulty
        .as_deref()
        .map(|difficulty| format!("_{}", sanitize_component(difficulty)))
        .unwrap_or_default();
    let millis = (record.timestamp * 1000.0) as i64;
    let nonce = Uuid::new_v4().simple().to_string();
    format!(
        "case_{}_{}{}_{}_{}.json",
        record.case_ordinal,
        record.condition.label(),
        difficulty,
        millis,
        &nonce[..8]
    )
}

fn sanitize_component(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Reads back every record in `dir`, oldest first. Files that do not parse are
/// skipped with a warning.
pub async fn read_records(dir: &Path) -> Result<Vec<ResponseRecord>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to open responses directory '{}'", dir.display()))?;

    let mut records = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let raw = fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read '{}'", path.display()))?;
        match parse_record_file(&raw) {
            Ok(mut parsed) => records.append(&mut parsed),
            Err(error) => warn!(file = %path.display(), %error, "skipping unreadable response file"),
        }
    }

    records.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    Ok(records)
}

fn parse_record_file(raw: &str) -> Result<Vec<ResponseRecord>> {
    if let Ok(single) = serde_json::from_str::<ResponseRecord>(raw) {
        return Ok(vec![single]);
    }
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).context("malformed response record"))
        .collect()
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
