use crate::storage::repository::PriceRepository;
use log::info;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, DbErr};
use std::time::Duration;

pub async fn establish_connection(db_url: &str) -> Result<DatabaseConnection, DbErr> {
    let mut opt = ConnectOptions::new(db_url.to_owned());
    opt.connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Info);
    // 内存库每个连接都是独立的库，只能用单连接
    if db_url.contains(":memory:") {
        opt.max_connections(1).min_connections(1);
    } else {
        opt.max_connections(10)
            .min_connections(1)
            .idle_timeout(Duration::from_secs(300));
    }

    let db = Database::connect(opt).await?;

    if db.get_database_backend() == DatabaseBackend::Sqlite {
        // 启用 WAL 模式
        db.execute(sea_orm::Statement::from_string(
            DatabaseBackend::Sqlite,
            "PRAGMA journal_mode=WAL;".to_string(),
        ))
        .await?;
    }

    // 建表 + 唯一索引（幂等）
    PriceRepository::ensure_indexes(&db).await?;

    info!("Database connection established and prices table initialized.");

    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::entity::Price;
    use sea_orm::{EntityTrait, PaginatorTrait};

    #[tokio::test]
    async fn memory_database_is_ready_to_use() {
        let db = establish_connection("sqlite::memory:").await.unwrap();
        assert_eq!(Price::find().count(&db).await.unwrap(), 0);
        // 重复初始化不报错
        PriceRepository::ensure_indexes(&db).await.unwrap();
    }
}
