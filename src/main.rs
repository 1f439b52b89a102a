use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use eodsync::pipeline::{RunRequest, TriggerRequest};
use eodsync::source::StooqSession;
use eodsync::storage::{establish_connection, PriceRepository};
use eodsync::{Pipeline, Settings, Symbol};
use log::info;
use std::sync::Arc;

const FULL_HISTORY_DAYS: u32 = 5 * 365;
const SEARCH_LIMIT: u64 = 20;

#[derive(Parser)]
#[command(name = "eodsync", about = "Stooq end-of-day price sync into SQLite")]
struct Cli {
    /// Write logs to logs/app-<timestamp>.log instead of stderr.
    #[arg(long, global = true, default_value_t = false)]
    log_file: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch, parse and upsert daily prices, then print run stats as JSON.
    Run {
        /// Trailing window in days, ending today.
        #[arg(long, default_value_t = 7, conflicts_with = "full")]
        days: u32,

        /// Backfill five years of history.
        #[arg(long, default_value_t = false)]
        full: bool,

        /// Explicit start date (YYYYMMDD); requires --end.
        #[arg(long, requires = "end")]
        start: Option<String>,

        /// Explicit end date (YYYYMMDD); requires --start.
        #[arg(long, requires = "start")]
        end: Option<String>,

        /// Comma separated tickers. Defaults to the configured universe.
        #[arg(long, value_delimiter = ',')]
        tickers: Vec<String>,
    },
    /// Print stored daily rows for one symbol.
    History {
        symbol: String,

        #[arg(long, default_value_t = 365)]
        days: u32,
    },
    /// List stored symbols starting with a prefix.
    Search { prefix: String },
}

fn init_logging(to_file: bool) -> Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(log::LevelFilter::Warn)
        .filter_module("eodsync", log::LevelFilter::Info)
        .filter_module("sqlx", log::LevelFilter::Error)
        .filter_module("sea_orm", log::LevelFilter::Error)
        .parse_default_env();

    if to_file {
        let ts = Local::now().format("%Y%m%d-%H%M%S").to_string();
        let log_dir = std::path::PathBuf::from("logs");
        std::fs::create_dir_all(&log_dir)?;
        let log_file = std::fs::File::create(log_dir.join(format!("app-{}.log", ts)))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

/// 已校验的子命令输入；校验全部在连接数据库之前完成
#[derive(Debug)]
enum Job {
    Run(RunRequest),
    History { symbol: Symbol, days: u32 },
    Search { prefix: Option<Symbol> },
}

impl Commands {
    fn into_job(self) -> Result<Job> {
        let job = match self {
            Commands::Run {
                days,
                full,
                start,
                end,
                tickers,
            } => Job::Run(
                TriggerRequest {
                    days: Some(if full { FULL_HISTORY_DAYS } else { days }),
                    start_date: start,
                    end_date: end,
                    symbols: Some(tickers),
                }
                .validate()?,
            ),
            Commands::History { symbol, days } => Job::History {
                symbol: Symbol::parse(&symbol)?,
                days,
            },
            // 非法前缀不是错误，只是没有结果
            Commands::Search { prefix } => Job::Search {
                prefix: Symbol::parse(&prefix).ok(),
            },
        };
        Ok(job)
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file)?;

    let settings = Settings::from_env().context("invalid configuration")?;
    let job = cli.command.into_job()?;

    if let Job::Search { prefix: None } = job {
        println!("[]");
        return Ok(());
    }

    let db = establish_connection(&settings.database_url)
        .await
        .with_context(|| format!("failed to open database {}", settings.database_url))?;
    info!("数据库已就绪: {}", settings.database_url);

    match job {
        Job::Run(request) => {
            let session = StooqSession::from_settings(&settings)?;
            let pipeline = Pipeline::new(Arc::new(db), Arc::new(session), settings.pipeline_config());
            let stats = pipeline.run(request).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Job::History { symbol, days } => {
            let today = Local::now().date_naive();
            let rows = PriceRepository::history_days(&db, &symbol, days, today).await?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Job::Search { prefix } => {
            let prefix = prefix.as_ref().map(Symbol::as_str).unwrap_or_default();
            let symbols = PriceRepository::search_symbols(&db, prefix, SEARCH_LIMIT).await?;
            println!("{}", serde_json::to_string_pretty(&symbols)?);
        }
    }

    Ok(())
}
