use crate::source::{format_source_date, SOURCE_DATE_FORMAT};
use crate::symbol::Symbol;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum WindowError {
    #[error("start and end dates must be given together")]
    Incomplete,
    #[error("invalid date {0:?}, expected YYYYMMDD")]
    InvalidDate(String),
}

/// 请求的日期窗口：相对今天的天数，或显式起止日
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateWindow {
    Trailing { days: u32 },
    Explicit { start: NaiveDate, end: NaiveDate },
}

impl Default for DateWindow {
    fn default() -> Self {
        DateWindow::Trailing { days: 1 }
    }
}

impl DateWindow {
    /// 0 天按 1 天处理
    pub fn trailing(days: u32) -> Self {
        DateWindow::Trailing { days: days.max(1) }
    }

    pub fn explicit(start: &str, end: &str) -> Result<Self, WindowError> {
        Ok(DateWindow::Explicit {
            start: parse_compact(start)?,
            end: parse_compact(end)?,
        })
    }

    /// 显式起止日优先；只给了其中一个视为错误
    pub fn from_parts(
        days: Option<u32>,
        start: Option<&str>,
        end: Option<&str>,
    ) -> Result<Self, WindowError> {
        match (start, end) {
            (Some(s), Some(e)) => Self::explicit(s, e),
            (None, None) => Ok(Self::trailing(days.unwrap_or(1))),
            _ => Err(WindowError::Incomplete),
        }
    }

    pub fn resolve(&self, today: NaiveDate) -> ResolvedWindow {
        match *self {
            DateWindow::Trailing { days } => ResolvedWindow {
                start: today
                    .checked_sub_days(Days::new(u64::from(days.max(1))))
                    .unwrap_or(NaiveDate::MIN),
                end: today,
            },
            DateWindow::Explicit { start, end } => ResolvedWindow {
                start,
                end: end.min(today),
            },
        }
    }
}

fn parse_compact(raw: &str) -> Result<NaiveDate, WindowError> {
    let raw = raw.trim();
    if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WindowError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, SOURCE_DATE_FORMAT)
        .map_err(|_| WindowError::InvalidDate(raw.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ResolvedWindow {
    pub fn is_inverted(&self) -> bool {
        self.start > self.end
    }

    pub fn label(&self) -> String {
        format!(
            "{} - {}",
            format_source_date(self.start),
            format_source_date(self.end)
        )
    }
}

/// 一次运行的输入；`symbols` 为 None 时使用配置里的默认标的
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub window: DateWindow,
    pub symbols: Option<Vec<Symbol>>,
}

impl RunRequest {
    pub fn trailing(days: u32) -> Self {
        Self {
            window: DateWindow::trailing(days),
            symbols: None,
        }
    }

    pub fn with_symbols(mut self, symbols: Vec<Symbol>) -> Self {
        self.symbols = Some(symbols);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub date_range: String,
    pub tickers_requested: usize,
    pub tickers_fetched: usize,
    pub records_parsed: usize,
    pub rows_skipped: usize,
    pub records_inserted: usize,
    pub records_updated: usize,
    pub records_failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub universe: Vec<Symbol>,
    pub request_delay: Duration,
    pub batch_size: usize,
}
