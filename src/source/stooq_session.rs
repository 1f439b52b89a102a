use super::urls::{url_daily_csv, NO_DATA_SENTINEL};
use super::{FetchError, PriceSource};
use crate::config::Settings;
use crate::symbol::Symbol;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{info, warn};
use reqwest::Client;
use std::time::Duration;

/// Stooq 会话：每个标的一次 GET，超时由 Client 统一控制，不做重试。
pub struct StooqSession {
    client: Client,
    url_template: String,
    timeout: Duration,
}

impl StooqSession {
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("eodsync/0.1")
            .build()
            .map_err(FetchError::Request)?;
        Ok(Self::with_client(client, url_template, timeout))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, FetchError> {
        Self::new(settings.source_url.clone(), settings.request_timeout)
    }

    /// 使用外部构建好的 Client（其超时应与 `timeout` 一致）
    pub fn with_client(client: Client, url_template: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            timeout,
        }
    }

    fn classify(&self, e: reqwest::Error) -> FetchError {
        if e.is_timeout() {
            FetchError::Timeout(self.timeout)
        } else {
            FetchError::Request(e)
        }
    }
}

/// 空正文或包含无数据标记的正文视为"无数据"
fn payload_from_body(body: &str) -> Option<String> {
    let text = body.trim();
    if text.is_empty() || text.contains(NO_DATA_SENTINEL) {
        None
    } else {
        Some(text.to_string())
    }
}

#[async_trait]
impl PriceSource for StooqSession {
    async fn fetch_csv(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<String>, FetchError> {
        let url = url_daily_csv(&self.url_template, symbol, start, end);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = resp.text().await.map_err(|e| self.classify(e))?;
        let payload = payload_from_body(&body);
        if payload.is_none() {
            warn!("{} fetch_csv({}) 无数据 [{}]", self, symbol, url);
        } else {
            info!("{} fetch_csv({}) [{}]", self, symbol, url);
        }
        Ok(payload)
    }
}

impl std::fmt::Display for StooqSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let host = self
            .url_template
            .split("://")
            .nth(1)
            .and_then(|rest| rest.split('/').next())
            .unwrap_or(&self.url_template);
        write!(f, "<StooqSession [{}]>", host)
    }
}

impl std::fmt::Debug for StooqSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn session(template: String, timeout: Duration) -> StooqSession {
        let client = Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()
            .unwrap();
        StooqSession::with_client(client, template, timeout)
    }

    /// 单连接 HTTP 桩：回放固定响应，并把请求行回传给测试
    async fn serve_once(status_line: &str, body: &str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        let (tx, rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = sock.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            let _ = tx.send(request.lines().next().unwrap_or_default().to_string());
            sock.write_all(response.as_bytes()).await.unwrap();
            let _ = sock.shutdown().await;
        });
        (
            format!("http://{addr}/q/d/l/?s={{symbol}}.us&d1={{d1}}&d2={{d2}}&i=d"),
            rx,
        )
    }

    #[tokio::test]
    async fn returns_csv_body_and_builds_request_url() {
        let csv = "Date,Open,High,Low,Close,Volume\n2024-01-02,1,2,0.5,1.5,100\n";
        let (template, request_line) = serve_once("200 OK", csv).await;
        let s = session(template, Duration::from_secs(5));

        let body = s
            .fetch_csv(&Symbol::parse("AAPL").unwrap(), day(2024, 1, 1), day(2024, 1, 31))
            .await
            .unwrap();
        assert_eq!(body.as_deref(), Some(csv.trim()));

        let line = request_line.await.unwrap();
        assert!(line.starts_with("GET /q/d/l/?s=aapl.us&d1=20240101&d2=20240131&i=d"), "{line}");
    }

    #[tokio::test]
    async fn no_data_sentinel_and_blank_body_are_absent() {
        for body in ["No data", "   \n"] {
            let (template, _rx) = serve_once("200 OK", body).await;
            let s = session(template, Duration::from_secs(5));
            let got = s
                .fetch_csv(&Symbol::parse("ZZZZ").unwrap(), day(2024, 1, 1), day(2024, 1, 2))
                .await
                .unwrap();
            assert_eq!(got, None);
        }
    }

    #[tokio::test]
    async fn http_error_status_is_a_fetch_error() {
        let (template, _rx) = serve_once("503 Service Unavailable", "busy").await;
        let s = session(template, Duration::from_secs(5));
        let err = s
            .fetch_csv(&Symbol::parse("AAPL").unwrap(), day(2024, 1, 1), day(2024, 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 503, .. }), "{err:?}");
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let timeout = Duration::from_millis(200);
        let s = session(format!("http://{addr}/?s={{symbol}}"), timeout);

        let err = s
            .fetch_csv(&Symbol::parse("AAPL").unwrap(), day(2024, 1, 1), day(2024, 1, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout(t) if t == timeout), "{err:?}");
    }

    #[test]
    fn display_shows_host_only() {
        let s = StooqSession::new(crate::source::STOOQ_DAILY_CSV_URL, Duration::from_secs(1)).unwrap();
        assert_eq!(s.to_string(), "<StooqSession [stooq.com]>");
    }
}
