use super::{FetchError, PriceSource};
use crate::symbol::Symbol;
use chrono::NaiveDate;
use log::{error, info, warn};
use std::time::Duration;
use tokio::time::sleep;

/// 成功拉到数据的标的及其原始 CSV，顺序与请求顺序一致
pub type FetchedPayloads = Vec<(Symbol, String)>;

/// 拉取单个标的；无数据和各种失败都记日志后返回 None
pub async fn fetch_one(
    source: &dyn PriceSource,
    symbol: &Symbol,
    start: NaiveDate,
    end: NaiveDate,
) -> Option<String> {
    match source.fetch_csv(symbol, start, end).await {
        Ok(Some(body)) if !body.trim().is_empty() => Some(body),
        Ok(_) => {
            warn!("⚠ {} 无数据返回", symbol);
            None
        }
        Err(FetchError::Timeout(t)) => {
            error!("✗ 拉取 {} 超时 ({:?})", symbol, t);
            None
        }
        Err(e) => {
            error!("✗ 拉取 {} 失败: {}", symbol, e);
            None
        }
    }
}

/// 逐个顺序拉取，两次请求之间固定间隔 `delay`（最后一个之后不再等待）。
///
/// 单个标的失败不会中断整批，也不做重试。
pub async fn fetch_many(
    source: &dyn PriceSource,
    symbols: &[Symbol],
    start: NaiveDate,
    end: NaiveDate,
    delay: Duration,
) -> FetchedPayloads {
    let total = symbols.len();
    let mut results = Vec::with_capacity(total);

    for (i, symbol) in symbols.iter().enumerate() {
        info!("拉取 {} ({}/{})", symbol, i + 1, total);
        if let Some(body) = fetch_one(source, symbol, start, end).await {
            results.push((symbol.clone(), body));
        }
        if i + 1 < total && !delay.is_zero() {
            sleep(delay).await;
        }
    }

    info!("✓ 拉取完成: {}/{} 个标的有数据", results.len(), total);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tokio::time::Instant;

    enum Reply {
        Csv(&'static str),
        NoData,
        Timeout,
        Status(u16),
    }

    struct ScriptedSource {
        replies: HashMap<&'static str, Reply>,
        calls: Mutex<Vec<(String, Instant)>>,
    }

    impl ScriptedSource {
        fn new(replies: Vec<(&'static str, Reply)>) -> Self {
            Self {
                replies: replies.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_csv(
            &self,
            symbol: &Symbol,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> Result<Option<String>, FetchError> {
            self.calls
                .lock()
                .unwrap()
                .push((symbol.to_string(), Instant::now()));
            match self.replies.get(symbol.as_str()) {
                Some(Reply::Csv(body)) => Ok(Some(body.to_string())),
                Some(Reply::NoData) | None => Ok(None),
                Some(Reply::Timeout) => Err(FetchError::Timeout(Duration::from_secs(30))),
                Some(Reply::Status(code)) => Err(FetchError::Status {
                    status: *code,
                    url: "http://stub".to_string(),
                }),
            }
        }
    }

    fn symbols(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|n| Symbol::parse(n).unwrap()).collect()
    }

    fn window() -> (NaiveDate, NaiveDate) {
        (
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
        )
    }

    #[tokio::test]
    async fn failed_and_empty_symbols_are_left_out() {
        let source = ScriptedSource::new(vec![
            ("AAPL", Reply::Csv("Date,Open\n2024-01-02,1")),
            ("NODATA", Reply::NoData),
            ("SLOW", Reply::Timeout),
        ]);
        let (start, end) = window();

        let got = fetch_many(&source, &symbols(&["NODATA", "SLOW", "AAPL"]), start, end, Duration::ZERO).await;

        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0.as_str(), "AAPL");
        // 三个都请求过，失败不中断后续
        assert_eq!(source.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn blank_payload_and_http_errors_count_as_absent() {
        let source = ScriptedSource::new(vec![
            ("BLANK", Reply::Csv("  \n ")),
            ("GONE", Reply::Status(404)),
        ]);
        let (start, end) = window();
        assert!(fetch_one(&source, &symbols(&["BLANK"])[0], start, end).await.is_none());
        assert!(fetch_one(&source, &symbols(&["GONE"])[0], start, end).await.is_none());
    }

    #[tokio::test]
    async fn results_keep_request_order() {
        let source = ScriptedSource::new(vec![
            ("MSFT", Reply::Csv("m")),
            ("AAPL", Reply::Csv("a")),
            ("IBM", Reply::Csv("i")),
        ]);
        let (start, end) = window();
        let got = fetch_many(&source, &symbols(&["MSFT", "AAPL", "IBM"]), start, end, Duration::ZERO).await;
        let order: Vec<&str> = got.iter().map(|(s, _)| s.as_str()).collect();
        assert_eq!(order, vec!["MSFT", "AAPL", "IBM"]);
    }

    #[tokio::test(start_paused = true)]
    async fn paces_between_requests_but_not_after_the_last() {
        let source = ScriptedSource::new(vec![
            ("A", Reply::Csv("a")),
            ("B", Reply::Timeout),
            ("C", Reply::Csv("c")),
        ]);
        let (start, end) = window();
        let delay = Duration::from_millis(500);

        let began = Instant::now();
        fetch_many(&source, &symbols(&["A", "B", "C"]), start, end, delay).await;
        let elapsed = began.elapsed();

        let calls = source.calls.lock().unwrap();
        for pair in calls.windows(2) {
            assert!(pair[1].1 - pair[0].1 >= delay);
        }
        // 3 个标的只等待 2 次
        assert!(elapsed >= delay * 2);
        assert!(elapsed < delay * 3);
    }

    #[tokio::test]
    async fn empty_symbol_list_makes_no_requests() {
        let source = ScriptedSource::new(vec![]);
        let (start, end) = window();
        let got = fetch_many(&source, &[], start, end, Duration::from_secs(1)).await;
        assert!(got.is_empty());
        assert!(source.calls.lock().unwrap().is_empty());
    }
}
