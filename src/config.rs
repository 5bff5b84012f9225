use std::path::PathBuf;
use std::time::Duration;

use url::Url;

const DEFAULT_BASE_URL: &str = "http://localhost:8080";
const DEFAULT_TIMEOUT_MS: u64 = 10_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("VIBE_CHECK_API_BASE_URL is not a valid url: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("VIBE_CHECK_API_TIMEOUT_MS must be a positive number of milliseconds, got `{0}`")]
    Timeout(String),
    #[error("no state directory: set VIBE_CHECK_STATE_DIR or HOME")]
    StateDir,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: Url,
    pub timeout: Duration,
    pub token: Option<String>,
    pub session_cookie: Option<String>,
    pub state_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let raw_base = non_empty("VIBE_CHECK_API_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = normalize_base(&raw_base)?;

        let timeout = match non_empty("VIBE_CHECK_API_TIMEOUT_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::Timeout(raw)),
            },
            None => Duration::from_millis(DEFAULT_TIMEOUT_MS),
        };

        let state_dir = match non_empty("VIBE_CHECK_STATE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => non_empty("HOME")
                .map(|home| PathBuf::from(home).join(".vibe-check"))
                .ok_or(ConfigError::StateDir)?,
        };

        let token = non_empty("VIBE_CHECK_TOKEN").or_else(|| read_stored_token(&state_dir));

        Ok(Config {
            base_url,
            timeout,
            token,
            session_cookie: non_empty("VIBE_CHECK_SESSION_COOKIE"),
            state_dir,
        })
    }

    pub fn login_url(&self) -> Result<Url, url::ParseError> {
        self.base_url.join("login")
    }
}

// `Url::join` drops the last path segment unless the base ends with '/'.
fn normalize_base(raw: &str) -> Result<Url, url::ParseError> {
    let trimmed = raw.trim();
    if trimmed.ends_with('/') {
        Url::parse(trimmed)
    } else {
        Url::parse(&format!("{trimmed}/"))
    }
}

fn read_stored_token(state_dir: &std::path::Path) -> Option<String> {
    let raw = std::fs::read_to_string(state_dir.join("auth_token")).ok()?;
    let token = raw.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
