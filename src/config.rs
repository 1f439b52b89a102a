use crate::pipeline::PipelineConfig;
use crate::source::urls::STOOQ_DAILY_CSV_URL;
use crate::symbol::{filter_symbols, Symbol};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://prices.db?mode=rwc";
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 500;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// 未指定 PIPELINE_TICKERS 时使用的默认股票池
pub const DEFAULT_TICKERS: &[&str] = &[
    "AAPL", "MSFT", "GOOGL", "AMZN", "NVDA", "META", "TSLA", "BRK.B", "JPM", "V", "UNH", "XOM",
    "JNJ", "WMT", "MA", "PG", "HD", "CVX", "LLY", "ABBV", "MRK", "KO", "PEP", "AVGO", "COST",
    "ORCL", "BAC", "ADBE", "CRM", "NFLX", "AMD", "INTC", "DIS", "CSCO", "MCD",
];

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{0} contains no valid tickers")]
    EmptyUniverse(&'static str),
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    /// 含 `{symbol}` / `{d1}` / `{d2}` 占位符的下载地址模板
    pub source_url: String,
    pub tickers: Vec<Symbol>,
    pub request_delay: Duration,
    pub request_timeout: Duration,
    pub batch_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            source_url: STOOQ_DAILY_CSV_URL.to_string(),
            tickers: filter_symbols(DEFAULT_TICKERS),
            request_delay: Duration::from_millis(DEFAULT_REQUEST_DELAY_MS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl Settings {
    /// 先加载 .env（不存在也没关系），再读取环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut settings = Self::default();

        if let Some(url) = get("DATABASE_URL") {
            settings.database_url = url;
        }
        if let Some(url) = get("STOOQ_URL") {
            settings.source_url = url;
        }
        if let Some(raw) = get("PIPELINE_TICKERS") {
            let tickers = filter_symbols(raw.split(','));
            if tickers.is_empty() {
                return Err(ConfigError::EmptyUniverse("PIPELINE_TICKERS"));
            }
            settings.tickers = tickers;
        }
        if let Some(raw) = get("REQUEST_DELAY_MS") {
            settings.request_delay = Duration::from_millis(parse_value("REQUEST_DELAY_MS", &raw)?);
        }
        if let Some(raw) = get("REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_value("REQUEST_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "REQUEST_TIMEOUT_SECS",
                    value: raw,
                });
            }
            settings.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("UPSERT_BATCH_SIZE") {
            let size: usize = parse_value("UPSERT_BATCH_SIZE", &raw)?;
            settings.batch_size = size.max(1);
        }

        Ok(settings)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            universe: self.tickers.clone(),
            request_delay: self.request_delay,
            batch_size: self.batch_size,
        }
    }
}

fn parse_value<T: FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
