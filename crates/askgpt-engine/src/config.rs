use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Connection settings for the hosted chat service, read from the
/// environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            timeout: None,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        let api_base = normalize_api_base(
            &first_non_empty_env(&["OPENAI_API_BASE", "OPENAI_BASE_URL"])
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        );
        let api_key = first_non_empty_env(&["OPENAI_API_KEY", "OPENAI_API_KEY_BACKUP"]);
        let timeout = first_non_empty_env(&["ASKGPT_TIMEOUT_SECS"])
            .map(|raw| parse_timeout_secs(&raw))
            .transpose()?;
        Ok(Self {
            api_base,
            api_key,
            timeout,
        })
    }
}

fn first_non_empty_env(keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Ok(value) = env::var(key) {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

/// Strips trailing slashes; a bare host gets `/v1`.
pub fn normalize_api_base(raw: &str) -> String {
    let mut base = raw.trim().trim_end_matches('/').to_string();
    if let Ok(parsed) = reqwest::Url::parse(&base) {
        if parsed.path().trim().is_empty() || parsed.path() == "/" {
            base = format!("{base}/v1");
        }
    }
    base.trim_end_matches('/').to_string()
}

fn parse_timeout_secs(raw: &str) -> Result<Duration> {
    let secs: f64 = raw
        .trim()
        .parse()
        .with_context(|| format!("ASKGPT_TIMEOUT_SECS must be a number of seconds, got '{raw}'"))?;
    if !secs.is_finite() || secs <= 0.0 {
        anyhow::bail!("ASKGPT_TIMEOUT_SECS must be positive, got '{raw}'");
    }
    Ok(Duration::from_secs_f64(secs))
}
