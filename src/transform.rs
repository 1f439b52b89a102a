//! 把单个标的的原始 CSV 文本转换成 [`PriceRecord`]。
//!
//! 输入格式：表头 + 数据行，列为 `Date,Open,High,Low,Close,Volume`
//! （按表头名定位，大小写不敏感，多余列忽略）。
//! 每一行独立解析：坏行只记日志并跳过，绝不会让整个 payload 失败。

use crate::symbol::Symbol;
use chrono::NaiveDate;
use csv::StringRecord;
use log::warn;
use serde::{Deserialize, Serialize};

pub const CSV_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub symbol: Symbol,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

#[derive(thiserror::Error, Debug)]
pub enum RowError {
    #[error("missing column {0}")]
    MissingColumn(&'static str),
    #[error("invalid {column} value {value:?}")]
    InvalidNumber { column: &'static str, value: String },
    #[error("{column} must be a non-negative finite number, got {value}")]
    OutOfRange { column: &'static str, value: f64 },
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("unreadable row: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Debug, Default)]
pub struct ParsedPayload {
    pub records: Vec<PriceRecord>,
    /// 被跳过的坏行数
    pub skipped: usize,
}

#[derive(Debug, Default)]
struct Columns {
    date: Option<usize>,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: Option<usize>,
    volume: Option<usize>,
}

impl Columns {
    fn locate(headers: &StringRecord) -> Self {
        let find = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
        Self {
            date: find("Date"),
            open: find("Open"),
            high: find("High"),
            low: find("Low"),
            close: find("Close"),
            volume: find("Volume"),
        }
    }
}

pub fn parse_price_csv(symbol: &Symbol, payload: &str) -> ParsedPayload {
    let mut parsed = ParsedPayload::default();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(payload.as_bytes());

    let columns = match reader.headers() {
        Ok(headers) => Columns::locate(headers),
        Err(e) => {
            warn!("⚠ {} 表头无法解析，整段跳过: {}", symbol, e);
            return parsed;
        }
    };

    for (idx, row) in reader.records().enumerate() {
        let result = row
            .map_err(RowError::from)
            .and_then(|row| parse_row(symbol, &columns, &row));
        match result {
            Ok(record) => parsed.records.push(record),
            Err(e) => {
                // 第 1 行是表头
                warn!("跳过 {} 第 {} 行: {}", symbol, idx + 2, e);
                parsed.skipped += 1;
            }
        }
    }

    parsed
}

fn parse_row(
    symbol: &Symbol,
    columns: &Columns,
    row: &StringRecord,
) -> Result<PriceRecord, RowError> {
    let raw_date = field(row, columns.date, "Date")?;
    let date = parse_date(raw_date)?;

    let open = price(row, columns.open, "Open")?;
    let high = price(row, columns.high, "High")?;
    let low = price(row, columns.low, "Low")?;
    let close = price(row, columns.close, "Close")?;
    // 源数据里的成交量可能带小数点，先按浮点解析再截断
    let volume = price(row, columns.volume, "Volume")?.trunc() as i64;

    Ok(PriceRecord {
        symbol: symbol.clone(),
        date,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// `%Y` 接受任意位数的年份，这里先要求年份恰好四位
fn parse_date(raw: &str) -> Result<NaiveDate, RowError> {
    let four_digit_year = raw
        .split_once('-')
        .is_some_and(|(year, _)| year.len() == 4 && year.bytes().all(|b| b.is_ascii_digit()));
    if !four_digit_year {
        return Err(RowError::InvalidDate(raw.to_string()));
    }
    NaiveDate::parse_from_str(raw, CSV_DATE_FORMAT)
        .map_err(|_| RowError::InvalidDate(raw.to_string()))
}

fn field<'r>(
    row: &'r StringRecord,
    idx: Option<usize>,
    column: &'static str,
) -> Result<&'r str, RowError> {
    idx.and_then(|i| row.get(i))
        .ok_or(RowError::MissingColumn(column))
}

fn price(row: &StringRecord, idx: Option<usize>, column: &'static str) -> Result<f64, RowError> {
    let raw = field(row, idx, column)?;
    let value: f64 = raw.parse().map_err(|_| RowError::InvalidNumber {
        column,
        value: raw.to_string(),
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(RowError::OutOfRange { column, value });
    }
    Ok(value)
}
