use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_TVMAZE_URL: &str = "https://api.tvmaze.com";
const DEFAULT_MOVIES_SECTION: &str = "Movies";
const DEFAULT_TV_SECTION: &str = "TV Shows";
const DEFAULT_CONCURRENCY: usize = 4;
const MAX_CONCURRENCY: usize = 32;
const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub plex: PlexConfig,
    pub tvmaze: TvMazeConfig,
    pub movies_section: String,
    pub tv_section: String,
    pub output_dir: PathBuf,
    pub lookup_concurrency: usize,
}

#[derive(Clone)]
pub struct PlexConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for PlexConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlexConfig")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct TvMazeConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Backoff applied to rate-limited metadata requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_BACKOFF_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = get("PLEX_URL").ok_or(ConfigError::Missing("PLEX_URL"))?;
        let timeout = Duration::from_secs(parse_or(&get, "HTTP_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?);

        let retry = RetryPolicy {
            max_retries: parse_or(&get, "TVMAZE_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            base_delay: Duration::from_millis(parse_or(&get, "TVMAZE_BACKOFF_MS", DEFAULT_BACKOFF_MS)?),
            max_delay: Duration::from_millis(parse_or(
                &get,
                "TVMAZE_MAX_BACKOFF_MS",
                DEFAULT_MAX_BACKOFF_MS,
            )?),
        };

        let concurrency: usize = parse_or(&get, "LOOKUP_CONCURRENCY", DEFAULT_CONCURRENCY)?;

        Ok(Self {
            plex: PlexConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                token: get("PLEX_TOKEN"),
                timeout,
            },
            tvmaze: TvMazeConfig {
                base_url: get("TVMAZE_URL")
                    .unwrap_or_else(|| DEFAULT_TVMAZE_URL.to_string())
                    .trim_end_matches('/')
                    .to_string(),
                timeout,
                retry,
            },
            movies_section: get("PLEX_MOVIES_SECTION")
                .unwrap_or_else(|| DEFAULT_MOVIES_SECTION.to_string()),
            tv_section: get("PLEX_TV_SECTION").unwrap_or_else(|| DEFAULT_TV_SECTION.to_string()),
            output_dir: get("OUTPUT_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            lookup_concurrency: clamp_concurrency(concurrency),
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.lookup_concurrency = clamp_concurrency(concurrency);
        self
    }
}

fn clamp_concurrency(n: usize) -> usize {
    n.clamp(1, MAX_CONCURRENCY)
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}
