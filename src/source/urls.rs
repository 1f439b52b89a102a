use crate::symbol::Symbol;
use chrono::NaiveDate;

/// Stooq 日线 CSV 下载地址
pub const STOOQ_DAILY_CSV_URL: &str = "https://stooq.com/q/d/l/?s={symbol}.us&d1={d1}&d2={d2}&i=d";

/// 源站对无数据标的返回的正文
pub const NO_DATA_SENTINEL: &str = "No data";

/// 源站要求的紧凑日期格式（YYYYMMDD）
pub const SOURCE_DATE_FORMAT: &str = "%Y%m%d";

pub fn format_source_date(date: NaiveDate) -> String {
    date.format(SOURCE_DATE_FORMAT).to_string()
}

pub fn url_daily_csv(template: &str, symbol: &Symbol, start: NaiveDate, end: NaiveDate) -> String {
    template
        .replace("{symbol}", &symbol.as_str().to_ascii_lowercase())
        .replace("{d1}", &format_source_date(start))
        .replace("{d2}", &format_source_date(end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fills_template_with_lowercase_symbol_and_compact_dates() {
        let url = url_daily_csv(
            STOOQ_DAILY_CSV_URL,
            &Symbol::parse("BRK.B").unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        );
        assert_eq!(
            url,
            "https://stooq.com/q/d/l/?s=brk.b.us&d1=20240101&d2=20240131&i=d"
        );
    }
}
