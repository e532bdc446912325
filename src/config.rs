use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::answer::{DEFAULT_MODEL, DEFAULT_TIMEOUT};
use crate::error::{Error, Result};
use crate::provider::cache::CacheTtls;
use crate::provider::coindesk::DEFAULT_NEWS_LIMIT;
use crate::provider::coingecko::DEFAULT_TOP_COINS_LIMIT;

/// File name used in the XDG config directory.
pub const CONFIG_FILE_NAME: &str = "cryptoask.toml";

/// Application configuration loaded from `$XDG_CONFIG_HOME/cryptoask.toml`
/// or `~/.config/cryptoask.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub cache: CacheConfig,
    pub coingecko: CoinGeckoConfig,
    pub binance: BinanceConfig,
    pub news: NewsConfig,
    pub answer: AnswerConfig,
}

/// Per-category cache lifetimes in seconds.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub news_ttl_secs: Option<u64>,
    pub market_ttl_secs: Option<u64>,
    pub price_ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoinGeckoConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub top_coins_limit: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BinanceConfig {
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewsConfig {
    pub feed_url: Option<String>,
    pub limit: Option<usize>,
}

/// Language-model settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AnswerConfig {
    pub model: Option<String>,
    pub ollama_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings used to wire the assistant.
///
/// `None` URLs mean the production endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub cache_ttls: CacheTtls,
    pub coingecko_api_key: Option<String>,
    pub coingecko_url: Option<String>,
    pub top_coins_limit: usize,
    pub binance_url: Option<String>,
    pub news_feed_url: Option<String>,
    pub news_limit: usize,
    pub model: String,
    pub ollama_url: Option<String>,
    pub answer_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        AppConfig::default().settings()
    }
}

impl AppConfig {
    /// Apply built-in defaults to every unset value.
    pub fn settings(&self) -> Settings {
        let defaults = CacheTtls::default();
        let secs_or = |value: Option<u64>, default: Duration| {
            value.map(Duration::from_secs).unwrap_or(default)
        };

        Settings {
            cache_ttls: CacheTtls {
                news: secs_or(self.cache.news_ttl_secs, defaults.news),
                market: secs_or(self.cache.market_ttl_secs, defaults.market),
                price: secs_or(self.cache.price_ttl_secs, defaults.price),
            },
            coingecko_api_key: non_empty(self.coingecko.api_key.as_deref()),
            coingecko_url: non_empty(self.coingecko.base_url.as_deref()),
            top_coins_limit: self
                .coingecko
                .top_coins_limit
                .unwrap_or(DEFAULT_TOP_COINS_LIMIT),
            binance_url: non_empty(self.binance.base_url.as_deref()),
            news_feed_url: non_empty(self.news.feed_url.as_deref()),
            news_limit: self.news.limit.unwrap_or(DEFAULT_NEWS_LIMIT),
            model: non_empty(self.answer.model.as_deref())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            ollama_url: non_empty(self.answer.ollama_url.as_deref()),
            answer_timeout: secs_or(self.answer.timeout_secs, DEFAULT_TIMEOUT),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToOwned::to_owned)
}

/// Resolve the configuration file path based on XDG conventions.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME")
        && !xdg_config_home.trim().is_empty()
    {
        return Some(PathBuf::from(xdg_config_home).join(CONFIG_FILE_NAME));
    }

    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config").join(CONFIG_FILE_NAME))
}

/// Load config from disk. Returns defaults when the file does not exist.
pub fn load() -> Result<AppConfig> {
    let Some(path) = config_path() else {
        return Ok(AppConfig::default());
    };

    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(AppConfig::default()),
        Err(err) => {
            return Err(read_config_error(&path, err));
        }
    };

    parse(&raw).map_err(|err| parse_config_error(&path, err))
}

/// Load config from an explicit path.
///
/// Unlike [`load`], this returns an error when the file is missing.
pub fn load_from_path(path: &Path) -> Result<AppConfig> {
    let raw = fs::read_to_string(path).map_err(|err| read_config_error(path, err))?;
    parse(&raw).map_err(|err| parse_config_error(path, err))
}

fn parse(raw: &str) -> std::result::Result<AppConfig, toml::de::Error> {
    toml::from_str(raw)
}

fn read_config_error(path: &Path, err: std::io::Error) -> Error {
    Error::Config(format!(
        "failed to read config file '{}': {}",
        path.display(),
        err
    ))
}

fn parse_config_error(path: &Path, err: toml::de::Error) -> Error {
    Error::Config(format!(
        "failed to parse config file '{}': {}",
        path.display(),
        err
    ))
}
