use crate::storage::entity::price::{
    ActiveModel as PriceActiveModel, Column as PriceColumn, Entity as Price, Model as PriceModel,
};
use crate::symbol::Symbol;
use crate::transform::PriceRecord;
use chrono::{Days, NaiveDate};
use log::{info, warn};
use sea_orm::sea_query::{Index, OnConflict};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Schema, Set, SqlErr,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

pub const UNIQUE_INDEX: &str = "idx_prices_symbol_date";
pub const SYMBOL_INDEX: &str = "idx_prices_symbol";

/// (symbol, date) 自然键
type NaturalKey = (String, NaiveDate);

fn natural_key(r: &PriceRecord) -> NaturalKey {
    (r.symbol.to_string(), r.date)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceDto {
    pub symbol: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

impl From<PriceModel> for PriceDto {
    fn from(model: PriceModel) -> Self {
        Self {
            symbol: model.symbol,
            date: model.date,
            open: model.open,
            high: model.high,
            low: model.low,
            close: model.close,
            volume: model.volume,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertSummary {
    pub total: usize,
    pub inserted: usize,
    pub updated: usize,
    pub failed: usize,
    pub batches: usize,
}

#[derive(Debug, Default)]
struct ChunkOutcome {
    inserted: usize,
    updated: usize,
    failed: usize,
}

pub struct PriceRepository;

impl PriceRepository {
    /// 建表 + (symbol, date) 唯一索引 + symbol 普通索引，可重复调用
    pub async fn ensure_indexes(db: &DatabaseConnection) -> Result<(), DbErr> {
        let builder = db.get_database_backend();
        let schema = Schema::new(builder);

        let stmt = builder.build(schema.create_table_from_entity(Price).if_not_exists());
        db.execute(stmt).await?;

        let unique = Index::create()
            .name(UNIQUE_INDEX)
            .table(Price)
            .col(PriceColumn::Symbol)
            .col(PriceColumn::Date)
            .unique()
            .if_not_exists()
            .to_owned();
        db.execute(builder.build(&unique)).await?;

        let lookup = Index::create()
            .name(SYMBOL_INDEX)
            .table(Price)
            .col(PriceColumn::Symbol)
            .if_not_exists()
            .to_owned();
        db.execute(builder.build(&lookup)).await?;

        info!("Indexes ensured on prices ({}, {})", UNIQUE_INDEX, SYMBOL_INDEX);
        Ok(())
    }

    /// 按 (symbol, date) 分批 upsert。
    ///
    /// 写入前已存在（或同批次内更早出现）的键计为 updated，其余计为 inserted。
    /// 某批整体失败时逐条重试，约束类的单条失败只计入 failed；整批全部失败则返回原始错误，
    /// 遇到非约束类错误（锁库、只读）立即返回该错误。
    pub async fn upsert_batch(
        db: &DatabaseConnection,
        records: &[PriceRecord],
        batch_size: usize,
    ) -> Result<UpsertSummary, DbErr> {
        let mut summary = UpsertSummary {
            total: records.len(),
            ..Default::default()
        };
        if records.is_empty() {
            info!("No records to load");
            return Ok(summary);
        }

        for chunk in records.chunks(batch_size.max(1)) {
            let outcome = Self::upsert_chunk(db, chunk).await?;
            summary.inserted += outcome.inserted;
            summary.updated += outcome.updated;
            summary.failed += outcome.failed;
            summary.batches += 1;
        }

        info!(
            "Loaded {} records in {} batches: {} inserted, {} updated, {} failed",
            summary.total, summary.batches, summary.inserted, summary.updated, summary.failed
        );
        Ok(summary)
    }

    async fn upsert_chunk(
        db: &DatabaseConnection,
        chunk: &[PriceRecord],
    ) -> Result<ChunkOutcome, DbErr> {
        let existing = Self::existing_keys(db, chunk).await?;

        let models = collapse_duplicates(chunk).into_iter().map(to_active_model);
        let batch_result = Price::insert_many(models)
            .on_conflict(Self::on_conflict())
            .exec_without_returning(db)
            .await;

        let batch_err = match batch_result {
            Ok(_) => {
                let mut known = existing;
                let mut outcome = ChunkOutcome::default();
                for r in chunk {
                    if known.insert(natural_key(r)) {
                        outcome.inserted += 1;
                    } else {
                        outcome.updated += 1;
                    }
                }
                return Ok(outcome);
            }
            Err(e) => e,
        };

        warn!("⚠ 批量写入失败，逐条重试 ({} 条): {}", chunk.len(), batch_err);
        let mut known = existing;
        let mut outcome = ChunkOutcome::default();
        for r in chunk {
            let res = Price::insert(to_active_model(r))
                .on_conflict(Self::on_conflict())
                .exec_without_returning(db)
                .await;
            match res {
                Ok(_) => {
                    if known.insert(natural_key(r)) {
                        outcome.inserted += 1;
                    } else {
                        outcome.updated += 1;
                    }
                }
                Err(e) if is_record_error(&e) => {
                    warn!("✗ 写入 {} {} 失败: {}", r.symbol, r.date, e);
                    outcome.failed += 1;
                }
                // 锁库、只读等整库级错误，逐条重试也不会成功
                Err(e) => {
                    warn!("✗ 写入 {} {} 失败，停止重试: {}", r.symbol, r.date, e);
                    return Err(e);
                }
            }
        }

        if outcome.failed == chunk.len() {
            return Err(batch_err);
        }
        Ok(outcome)
    }

    async fn existing_keys(
        db: &DatabaseConnection,
        chunk: &[PriceRecord],
    ) -> Result<HashSet<NaturalKey>, DbErr> {
        let symbols: HashSet<&str> = chunk.iter().map(|r| r.symbol.as_str()).collect();
        let dates: HashSet<NaiveDate> = chunk.iter().map(|r| r.date).collect();
        let wanted: HashSet<NaturalKey> = chunk.iter().map(natural_key).collect();

        let rows: Vec<(String, NaiveDate)> = Price::find()
            .select_only()
            .column(PriceColumn::Symbol)
            .column(PriceColumn::Date)
            .filter(PriceColumn::Symbol.is_in(symbols))
            .filter(PriceColumn::Date.is_in(dates))
            .into_tuple()
            .all(db)
            .await?;

        Ok(rows.into_iter().filter(|k| wanted.contains(k)).collect())
    }

    fn on_conflict() -> OnConflict {
        OnConflict::columns([PriceColumn::Symbol, PriceColumn::Date])
            .update_columns([
                PriceColumn::Open,
                PriceColumn::High,
                PriceColumn::Low,
                PriceColumn::Close,
                PriceColumn::Volume,
            ])
            .to_owned()
    }

    /// 某个标的自 `since`（含）以来的日线，按日期升序
    pub async fn history(
        db: &DatabaseConnection,
        symbol: &Symbol,
        since: NaiveDate,
    ) -> Result<Vec<PriceDto>, DbErr> {
        let rows = Price::find()
            .filter(PriceColumn::Symbol.eq(symbol.as_str()))
            .filter(PriceColumn::Date.gte(since))
            .order_by_asc(PriceColumn::Date)
            .all(db)
            .await?;
        Ok(rows.into_iter().map(PriceDto::from).collect())
    }

    pub async fn history_days(
        db: &DatabaseConnection,
        symbol: &Symbol,
        days: u32,
        today: NaiveDate,
    ) -> Result<Vec<PriceDto>, DbErr> {
        let since = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self::history(db, symbol, since).await
    }

    /// 已入库代码的前缀搜索；前缀本身不合法时直接返回空
    pub async fn search_symbols(
        db: &DatabaseConnection,
        prefix: &str,
        limit: u64,
    ) -> Result<Vec<String>, DbErr> {
        let Ok(prefix) = Symbol::parse(prefix) else {
            return Ok(Vec::new());
        };
        Price::find()
            .select_only()
            .column(PriceColumn::Symbol)
            .distinct()
            .filter(PriceColumn::Symbol.starts_with(prefix.as_str()))
            .order_by_asc(PriceColumn::Symbol)
            .limit(limit)
            .into_tuple::<String>()
            .all(db)
            .await
    }
}

/// 只有约束类错误算单条记录的问题
fn is_record_error(e: &DbErr) -> bool {
    matches!(
        e.sql_err(),
        Some(SqlErr::UniqueConstraintViolation(_)) | Some(SqlErr::ForeignKeyConstraintViolation(_))
    ) || e.to_string().contains("constraint failed")
}

fn to_active_model(r: &PriceRecord) -> PriceActiveModel {
    PriceActiveModel {
        symbol: Set(r.symbol.to_string()),
        date: Set(r.date),
        open: Set(r.open),
        high: Set(r.high),
        low: Set(r.low),
        close: Set(r.close),
        volume: Set(r.volume),
        ..Default::default()
    }
}

/// 同一批内重复的键只保留最后一次出现的值（位置取第一次出现的位置）
fn collapse_duplicates(chunk: &[PriceRecord]) -> Vec<&PriceRecord> {
    let mut slot: HashMap<NaturalKey, usize> = HashMap::new();
    let mut out: Vec<&PriceRecord> = Vec::with_capacity(chunk.len());
    for r in chunk {
        match slot.get(&natural_key(r)) {
            Some(&i) => out[i] = r,
            None => {
                slot.insert(natural_key(r), out.len());
                out.push(r);
            }
        }
    }
    out
}
