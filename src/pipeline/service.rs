use crate::pipeline::model::{PipelineConfig, RunRequest, RunStats};
use crate::source::{fetch_many, PriceSource};
use crate::storage::repository::PriceRepository;
use crate::transform::parse_price_csv;
use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use log::{info, warn};
use sea_orm::DatabaseConnection;
use std::fmt;
use std::sync::Arc;

/// extract → transform → load，一次性跑完一个窗口
pub struct Pipeline {
    db: Arc<DatabaseConnection>,
    source: Arc<dyn PriceSource>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        db: Arc<DatabaseConnection>,
        source: Arc<dyn PriceSource>,
        config: PipelineConfig,
    ) -> Self {
        Self { db, source, config }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunStats> {
        self.run_on(request, Local::now().date_naive()).await
    }

    pub async fn run_on(&self, request: RunRequest, today: NaiveDate) -> Result<RunStats> {
        let window = request.window.resolve(today);
        let symbols = match request.symbols {
            Some(list) if !list.is_empty() => list,
            _ => self.config.universe.clone(),
        };

        let mut stats = RunStats {
            date_range: window.label(),
            tickers_requested: symbols.len(),
            ..Default::default()
        };
        info!("{} run({} tickers) [{}]", self, symbols.len(), stats.date_range);

        PriceRepository::ensure_indexes(&self.db)
            .await
            .context("failed to ensure price indexes")?;

        if window.is_inverted() {
            warn!("⚠ 日期窗口倒置 [{}]，跳过本次运行", stats.date_range);
            return Ok(stats);
        }

        let payloads = fetch_many(
            self.source.as_ref(),
            &symbols,
            window.start,
            window.end,
            self.config.request_delay,
        )
        .await;
        stats.tickers_fetched = payloads.len();

        let mut records = Vec::new();
        for (symbol, body) in &payloads {
            let parsed = parse_price_csv(symbol, body);
            info!("解析 {}: {} 条记录, 跳过 {} 行", symbol, parsed.records.len(), parsed.skipped);
            stats.rows_skipped += parsed.skipped;
            records.extend(parsed.records);
        }
        stats.records_parsed = records.len();

        let summary = PriceRepository::upsert_batch(&self.db, &records, self.config.batch_size)
            .await
            .context("failed to upsert price records")?;
        stats.records_inserted = summary.inserted;
        stats.records_updated = summary.updated;
        stats.records_failed = summary.failed;

        info!(
            "✓ 运行完成 [{}]: {}/{} 个标的, 解析 {} 条, 新增 {}, 更新 {}, 失败 {}",
            stats.date_range,
            stats.tickers_fetched,
            stats.tickers_requested,
            stats.records_parsed,
            stats.records_inserted,
            stats.records_updated,
            stats.records_failed
        );
        Ok(stats)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Pipeline [{} tickers]>", self.config.universe.len())
    }
}
