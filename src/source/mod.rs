pub mod extract;
pub mod stooq_session;
pub mod urls;

pub use extract::{fetch_many, fetch_one, FetchedPayloads};
pub use stooq_session::StooqSession;
pub use urls::*;

use crate::symbol::Symbol;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("request failed: {0}")]
    Request(reqwest::Error),
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },
}

/// 远端日线数据源
///
/// `Ok(None)` 表示源站明确返回"无数据"，这不是错误。
#[async_trait]
pub trait PriceSource: Send + Sync {
    async fn fetch_csv(
        &self,
        symbol: &Symbol,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<String>, FetchError>;
}
