use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{bail, Context};
use serde::Deserialize;
use study::StudyPlan;

const DEFAULT_CONFIG_PATH: &str = "study.toml";
const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    Canned,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantSettings {
    pub mode: AssistantMode,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub system_prompt: Option<String>,
    pub timeout_seconds: u64,
}

impl AssistantSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            mode: AssistantMode::Canned,
            endpoint: DEFAULT_ENDPOINT.into(),
            model: DEFAULT_MODEL.into(),
            api_key: None,
            system_prompt: None,
            timeout_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub bind_addr: String,
    pub cases_dir: PathBuf,
    pub responses_dir: PathBuf,
    pub max_body_bytes: usize,
    pub session_idle_seconds: u64,
    pub assistant: AssistantSettings,
    pub plan: StudyPlan,
}

impl Settings {
    /// How long a session may go untouched before it is dropped.
    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.session_idle_seconds)
    }

    /// A quarter of the idle limit, kept between one second and one minute.
    pub fn session_sweep_interval(&self) -> Duration {
        (self.session_idle() / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7860".into(),
            cases_dir: PathBuf::from("./data/Cases"),
            responses_dir: PathBuf::from("./saved_data"),
            max_body_bytes: 64 * 1024,
            session_idle_seconds: 2 * 60 * 60,
            assistant: AssistantSettings::default(),
            plan: StudyPlan::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileSettings {
    bind_addr: Option<String>,
    cases_dir: Option<PathBuf>,
    responses_dir: Option<PathBuf>,
    max_body_bytes: Option<usize>,
    session_idle_seconds: Option<u64>,
    #[serde(default)]
    assistant: FileAssistantSettings,
    sequence: Option<StudyPlan>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileAssistantSettings {
    mode: Option<AssistantMode>,
    endpoint: Option<String>,
    model: Option<String>,
    api_key: Option<String>,
    system_prompt: Option<String>,
    timeout_seconds: Option<u64>,
}

/// Defaults, then `study.toml` (or `$STUDY_CONFIG`), then environment overrides.
pub fn load_settings() -> anyhow::Result<Settings> {
    let path = std::env::var("STUDY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    load_settings_with(Path::new(&path), |key| std::env::var(key).ok())
}

pub fn load_settings_with(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    match fs::read_to_string(path) {
        Ok(raw) => {
            let file_cfg: FileSettings = toml::from_str(&raw)
                .with_context(|| format!("invalid config file '{}'", path.display()))?;
            apply_file(&mut settings, file_cfg);
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(error) => {
            return Err(error)
                .with_context(|| format!("failed to read config file '{}'", path.display()));
        }
    }

    apply_env(&mut settings, &env)?;
    validate(&settings)?;
    Ok(settings)
}

fn apply_file(settings: &mut Settings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.bind_addr {
        settings.bind_addr = v;
    }
    if let Some(v) = file_cfg.cases_dir {
        settings.cases_dir = v;
    }
    if let Some(v) = file_cfg.responses_dir {
        settings.responses_dir = v;
    }
    if let Some(v) = file_cfg.max_body_bytes {
        settings.max_body_bytes = v;
    }
    if let Some(v) = file_cfg.session_idle_seconds {
        settings.session_idle_seconds = v;
    }
    if let Some(v) = file_cfg.sequence {
        settings.plan = v;
    }

    let assistant = file_cfg.assistant;
    if let Some(v) = assistant.mode {
        settings.assistant.mode = v;
    }
    if let Some(v) = assistant.endpoint {
        settings.assistant.endpoint = v;
    }
    if let Some(v) = assistant.model {
        settings.assistant.model = v;
    }
    if let Some(v) = assistant.api_key {
        settings.assistant.api_key = Some(v);
    }
    if let Some(v) = assistant.system_prompt {
        settings.assistant.system_prompt = Some(v);
    }
    if let Some(v) = assistant.timeout_seconds {
        settings.assistant.timeout_seconds = v;
    }
}

/// Later keys win, so `APP__` names override the plain ones.
fn lookup(env: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().rev().find_map(|&key| env(key))
}

fn apply_env(settings: &mut Settings, env: &impl Fn(&str) -> Option<String>) -> anyhow::Result<()> {
    if let Some(v) = lookup(env, &["STUDY_BIND", "APP__BIND_ADDR"]) {
        settings.bind_addr = v;
    }
    if let Some(v) = lookup(env, &["APP__CASES_DIR"]) {
        settings.cases_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup(env, &["APP__RESPONSES_DIR"]) {
        settings.responses_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup(env, &["APP__MAX_BODY_BYTES"]) {
        settings.max_body_bytes = v
            .parse()
            .with_context(|| format!("APP__MAX_BODY_BYTES is not a number: '{v}'"))?;
    }
    if let Some(v) = lookup(env, &["APP__SESSION_IDLE_SECONDS"]) {
        settings.session_idle_seconds = v
            .parse()
            .with_context(|| format!("APP__SESSION_IDLE_SECONDS is not a number: '{v}'"))?;
    }
    if let Some(v) = lookup(env, &["APP__ASSISTANT_MODE"]) {
        settings.assistant.mode = match v.trim().to_ascii_lowercase().as_str() {
            "canned" => AssistantMode::Canned,
            "remote" => AssistantMode::Remote,
            other => bail!("APP__ASSISTANT_MODE must be 'canned' or 'remote', got '{other}'"),
        };
    }
    if let Some(v) = lookup(env, &["APP__ASSISTANT_ENDPOINT"]) {
        settings.assistant.endpoint = v;
    }
    if let Some(v) = lookup(env, &["APP__ASSISTANT_MODEL"]) {
        settings.assistant.model = v;
    }
    if let Some(v) = lookup(env, &["OPENAI_API_KEY", "APP__ASSISTANT_API_KEY"]) {
        settings.assistant.api_key = Some(v);
    }
    if let Some(v) = lookup(env, &["APP__ASSISTANT_TIMEOUT_SECONDS"]) {
        settings.assistant.timeout_seconds = v
            .parse()
            .with_context(|| format!("APP__ASSISTANT_TIMEOUT_SECONDS is not a number: '{v}'"))?;
    }
    Ok(())
}

fn validate(settings: &Settings) -> anyhow::Result<()> {
    if settings.max_body_bytes == 0 {
        bail!("max_body_bytes must be greater than zero");
    }
    if settings.session_idle_seconds == 0 {
        bail!("session_idle_seconds must be greater than zero");
    }

    let assistant = &settings.assistant;
    if assistant.timeout_seconds == 0 {
        bail!("assistant.timeout_seconds must be greater than zero");
    }
    if assistant.mode == AssistantMode::Remote {
        url::Url::parse(&assistant.endpoint)
            .with_context(|| format!("invalid assistant endpoint '{}'", assistant.endpoint))?;
        if assistant.model.trim().is_empty() {
            bail!("assistant.model is required in remote mode");
        }
        let has_key = assistant
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty());
        if !has_key {
            bail!("remote assistant mode needs an API key (OPENAI_API_KEY or assistant.api_key)");
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
