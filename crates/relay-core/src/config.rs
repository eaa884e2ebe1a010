use std::{env, fs, path::Path, time::Duration};

use crate::{
    context::{WindowPolicy, DEFAULT_MAX_TURNS, DEFAULT_TOKEN_BUDGET},
    errors::Error,
    streaming::{DeliveryConfig, DeliveryMode},
    Result,
};

pub const DEFAULT_LLM_BASE_URL: &str = "https://api.fireworks.ai/inference/v1";
pub const DEFAULT_LLM_MODEL: &str = "accounts/fireworks/models/gpt-oss-20b";

/// Typed configuration, read from the environment (plus an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,

    // Completion endpoint
    pub llm: LlmConfig,
    pub system_prompt: Option<String>,

    // Conversation history
    /// SQLite URL or path; `None` keeps history in memory only.
    pub database_url: Option<String>,
    pub window: WindowPolicy,

    // Delivery
    pub delivery_mode: DeliveryMode,
    pub delivery: DeliveryConfig,

    // Rate limiting
    pub rate_limit_enabled: bool,
    pub user_min_interval: Duration,
}

/// OpenAI-compatible chat-completions settings.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub top_k: Option<u32>,
    pub presence_penalty: f64,
    pub frequency_penalty: f64,
    pub timeout: Duration,
}

impl LlmConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_LLM_BASE_URL.to_string(),
            model: DEFAULT_LLM_MODEL.to_string(),
            max_tokens: 300,
            temperature: 0.6,
            top_p: 1.0,
            top_k: Some(40),
            presence_penalty: 0.0,
            frequency_penalty: 0.0,
            timeout: Duration::from_secs(45),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env_str = |key: &str| get(key).and_then(non_empty);

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN")
            .or_else(|| env_str("TELEGRAM_TOKEN"))
            .ok_or_else(|| {
                Error::Config(
                    "TELEGRAM_BOT_TOKEN (or TELEGRAM_TOKEN) environment variable is required"
                        .to_string(),
                )
            })?;

        let api_key = env_str("LLM_API_KEY")
            .or_else(|| env_str("FIREWORKS_API_KEY"))
            .ok_or_else(|| {
                Error::Config(
                    "LLM_API_KEY (or FIREWORKS_API_KEY) environment variable is required"
                        .to_string(),
                )
            })?;

        let mut llm = LlmConfig::new(api_key);
        if let Some(url) = env_str("LLM_BASE_URL") {
            llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = env_str("LLM_MODEL") {
            llm.model = model;
        }
        llm.max_tokens = parse_or(&env_str, "LLM_MAX_TOKENS", llm.max_tokens)?;
        llm.temperature = parse_or(&env_str, "LLM_TEMPERATURE", llm.temperature)?;
        llm.timeout = Duration::from_secs(parse_or(&env_str, "LLM_TIMEOUT_SECS", 45u64)?);

        let system_prompt = env_str("SYSTEM_PROMPT");
        let database_url = env_str("DATABASE_URL");

        let window = WindowPolicy {
            token_budget: parse_or(&env_str, "CONTEXT_TOKEN_BUDGET", DEFAULT_TOKEN_BUDGET)?,
            max_turns: parse_or(&env_str, "CONTEXT_MAX_TURNS", DEFAULT_MAX_TURNS)?,
        };

        let delivery_mode = match env_str("DELIVERY_MODE") {
            Some(s) => s.parse()?,
            None => DeliveryMode::Bubbles,
        };

        let defaults = DeliveryConfig::default();
        let delivery = DeliveryConfig {
            short_threshold: parse_or(&env_str, "SHORT_REPLY_THRESHOLD", defaults.short_threshold)?,
            chars_per_sec: parse_or(&env_str, "TYPING_CHARS_PER_SEC", defaults.chars_per_sec)?,
            max_typing_delay: Duration::from_millis(parse_or(
                &env_str,
                "TYPING_DELAY_CAP_MS",
                defaults.max_typing_delay.as_millis() as u64,
            )?),
            min_segment_len: parse_or(&env_str, "MIN_SEGMENT_LEN", defaults.min_segment_len)?,
            edit_chunk_chars: parse_or(&env_str, "EDIT_CHUNK_CHARS", defaults.edit_chunk_chars)?
                .max(1),
            edit_interval: Duration::from_millis(parse_or(
                &env_str,
                "EDIT_INTERVAL_MS",
                defaults.edit_interval.as_millis() as u64,
            )?),
            max_message_len: parse_or(&env_str, "TELEGRAM_SAFE_LIMIT", defaults.max_message_len)?
                .clamp(1, 4096),
        };

        let rate_limit_enabled = env_str("RATE_LIMIT_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(true);
        let user_min_interval =
            Duration::from_millis(parse_or(&env_str, "USER_MIN_INTERVAL_MS", 1000u64)?);

        Ok(Self {
            telegram_bot_token,
            llm,
            system_prompt,
            database_url,
            window,
            delivery_mode,
            delivery,
            rate_limit_enabled,
            user_min_interval,
        })
    }
}

fn parse_or<T>(env_str: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match env_str(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw:?}"))),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim().trim_start_matches("export ").trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
