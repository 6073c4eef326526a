use crate::assistant::openai::DEFAULT_BASE_URL;
use crate::assistant::PollPolicy;
use directories::BaseDirs;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct CoachSettings {
    pub supabase: SupabaseSettings,
    pub openai: OpenAiSettings,
    pub polling: PollPolicy,
    pub thread_map_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SupabaseSettings {
    pub url: String,
    pub anon_key: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub assistant_id: String,
    pub base_url: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Fitcoach not configured: create fitcoach.yaml or set SUPABASE_URL and OPENAI_API_KEY.")]
    Missing,
    #[error("Fitcoach configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Missing => {
                "Fitcoach not configured: create fitcoach.yaml with service credentials.".to_string()
            }
            Self::Invalid(detail) => {
                format!("Fitcoach not configured: {detail}. Update fitcoach.yaml.")
            }
        }
    }
}

/// Values taken from the process environment; they win over the file.
#[derive(Debug, Default, Clone)]
pub struct EnvOverrides {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_assistant_id: Option<String>,
    pub openai_base_url: Option<String>,
}

impl EnvOverrides {
    pub fn from_environment() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            supabase_url: var("SUPABASE_URL"),
            supabase_anon_key: var("SUPABASE_ANON_KEY"),
            openai_api_key: var("OPENAI_API_KEY"),
            openai_assistant_id: var("OPENAI_ASSISTANT_ID"),
            openai_base_url: var("OPENAI_BASE_URL"),
        }
    }

    fn is_empty(&self) -> bool {
        self.supabase_url.is_none()
            && self.supabase_anon_key.is_none()
            && self.openai_api_key.is_none()
            && self.openai_assistant_id.is_none()
            && self.openai_base_url.is_none()
    }
}

impl CoachSettings {
    /// Load `.env`, then the first `fitcoach.yaml` found, then apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = EnvOverrides::from_environment();
        let file = match locate_config_file() {
            Some(path) => Some(read_config(&path)?),
            None => None,
        };
        if file.is_none() && env.is_empty() {
            return Err(ConfigError::Missing);
        }
        resolve_settings(file.unwrap_or_default(), env)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        resolve_settings(read_config(path)?, EnvOverrides::from_environment())
    }
}

fn read_config(path: &Path) -> Result<FitcoachConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| {
        ConfigError::Invalid(format!("failed to read {}: {err}", path.display()))
    })?;
    serde_yaml::from_str(&contents)
        .map_err(|err| ConfigError::Invalid(format!("invalid fitcoach.yaml: {err}")))
}

fn required(value: Option<String>, what: &str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Invalid(format!("missing {what}")))
}

fn resolve_settings(config: FitcoachConfig, env: EnvOverrides) -> Result<CoachSettings, ConfigError> {
    let supabase = config.supabase.unwrap_or_default();
    let url = required(env.supabase_url.or(supabase.url), "Supabase url")?;
    Url::parse(&url).map_err(|err| ConfigError::Invalid(format!("bad Supabase url: {err}")))?;
    let anon_key = required(env.supabase_anon_key.or(supabase.anon_key), "Supabase anon key")?;

    let openai = config.openai.unwrap_or_default();
    let api_key = required(env.openai_api_key.or(openai.api_key), "OpenAI api key")?;
    let assistant_id = required(
        env.openai_assistant_id.or(openai.assistant_id),
        "OpenAI assistant id",
    )?;
    let base_url = env
        .openai_base_url
        .or(openai.base_url)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    let polling = resolve_polling(config.polling.unwrap_or_default())?;
    let thread_map_path = config.storage.and_then(|storage| storage.thread_map_path);

    Ok(CoachSettings {
        supabase: SupabaseSettings { url, anon_key },
        openai: OpenAiSettings {
            api_key,
            assistant_id,
            base_url,
        },
        polling,
        thread_map_path,
    })
}

fn resolve_polling(section: PollingSection) -> Result<PollPolicy, ConfigError> {
    let mut policy = PollPolicy::default();
    if let Some(ms) = section.interval_ms {
        if ms == 0 {
            return Err(ConfigError::Invalid("polling interval must be positive".into()));
        }
        policy.interval = Duration::from_millis(ms);
    }
    if let Some(multiplier) = section.multiplier {
        if !(multiplier >= 1.0 && multiplier.is_finite()) {
            return Err(ConfigError::Invalid(
                "polling multiplier must be at least 1.0".into(),
            ));
        }
        policy.multiplier = multiplier;
    }
    if let Some(ms) = section.max_interval_ms {
        policy.max_interval = Duration::from_millis(ms);
    }
    policy.max_interval = policy.max_interval.max(policy.interval);
    if let Some(attempts) = section.max_attempts {
        if attempts == 0 {
            return Err(ConfigError::Invalid("polling max_attempts must be positive".into()));
        }
        policy.max_attempts = attempts;
    }
    if let Some(secs) = section.timeout_secs {
        policy.timeout = (secs > 0).then(|| Duration::from_secs(secs));
    }
    Ok(policy)
}

fn locate_config_file() -> Option<PathBuf> {
    fitcoach_yaml_candidates()
        .into_iter()
        .find(|path| path.exists())
}

fn fitcoach_yaml_candidates() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("fitcoach.yaml")];
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("fitcoach");
        paths.push(config_dir.join("fitcoach.yaml"));
        paths.push(config_dir.join("fitcoach.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".fitcoach").join("fitcoach.yaml"));
        paths.push(home_dir.join(".fitcoach").join("fitcoach.yml"));
    }
    paths
}

#[derive(Debug, Default, Deserialize)]
struct FitcoachConfig {
    supabase: Option<SupabaseSection>,
    openai: Option<OpenAiSection>,
    polling: Option<PollingSection>,
    storage: Option<StorageSection>,
}

#[derive(Debug, Default, Deserialize)]
struct SupabaseSection {
    url: Option<String>,
    anon_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OpenAiSection {
    api_key: Option<String>,
    assistant_id: Option<String>,
    base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PollingSection {
    interval_ms: Option<u64>,
    multiplier: Option<f64>,
    max_interval_ms: Option<u64>,
    max_attempts: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct StorageSection {
    thread_map_path: Option<PathBuf>,
}
