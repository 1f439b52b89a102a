use crate::pipeline::model::{DateWindow, RunRequest, RunStats, WindowError};
use crate::pipeline::service::Pipeline;
use crate::symbol::{filter_symbols, Symbol};
use chrono::{DateTime, Local};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum TriggerError {
    #[error("a pipeline run is already in progress")]
    AlreadyRunning,
    #[error("no valid symbols in request")]
    NoValidSymbols,
    #[error("invalid date window: {0}")]
    InvalidWindow(#[from] WindowError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Success,
    Failed { message: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatus {
    pub running: bool,
    pub last_result: Option<RunOutcome>,
    pub last_stats: Option<RunStats>,
    pub started_at: Option<DateTime<Local>>,
    pub finished_at: Option<DateTime<Local>>,
}

/// 外部触发请求（原始输入，尚未校验）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TriggerRequest {
    pub days: Option<u32>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    #[serde(alias = "tickers")]
    pub symbols: Option<Vec<String>>,
}

impl TriggerRequest {
    /// 空列表等同于未指定（使用默认标的）；非空但全部非法则整体拒绝
    pub fn validate(&self) -> Result<RunRequest, TriggerError> {
        let symbols = match &self.symbols {
            Some(raw) if !raw.is_empty() => {
                let filtered = filter_symbols(raw);
                if filtered.is_empty() {
                    return Err(TriggerError::NoValidSymbols);
                }
                Some(filtered)
            }
            _ => None,
        };

        let window = DateWindow::from_parts(
            self.days,
            non_blank(&self.start_date),
            non_blank(&self.end_date),
        )?;

        Ok(RunRequest { window, symbols })
    }
}

fn non_blank(v: &Option<String>) -> Option<&str> {
    v.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Accepted {
    pub symbols: Option<Vec<Symbol>>,
}

/// 单槽后台运行：同一时刻最多一个运行中的 pipeline
#[derive(Clone)]
pub struct PipelineSupervisor {
    pipeline: Arc<Pipeline>,
    status: Arc<Mutex<RunStatus>>,
}

impl PipelineSupervisor {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            status: Arc::new(Mutex::new(RunStatus::default())),
        }
    }

    pub async fn trigger(&self, request: TriggerRequest) -> Result<Accepted, TriggerError> {
        let mut status = self.status.lock().await;
        if status.running {
            warn!("⚠ 已有运行中的任务，拒绝本次触发");
            return Err(TriggerError::AlreadyRunning);
        }
        let request = request.validate()?;

        status.running = true;
        status.started_at = Some(Local::now());
        status.finished_at = None;
        drop(status);

        let accepted = Accepted {
            symbols: request.symbols.clone(),
        };
        info!("{} trigger() [{:?}]", self.pipeline, request.window);

        let pipeline = self.pipeline.clone();
        let shared = self.status.clone();
        tokio::spawn(async move {
            // 内层任务 panic 时 JoinError 也要落到状态里
            let joined = tokio::spawn(async move { pipeline.run(request).await }).await;
            let (outcome, stats) = match joined {
                Ok(Ok(stats)) => (RunOutcome::Success, Some(stats)),
                Ok(Err(e)) => {
                    let message = describe_failure(&e);
                    error!("✗ 运行失败: {}", message);
                    (RunOutcome::Failed { message }, None)
                }
                Err(e) => {
                    error!("✗ 运行任务异常退出: {}", e);
                    (
                        RunOutcome::Failed {
                            message: format!("run task aborted: {}", e),
                        },
                        None,
                    )
                }
            };

            let mut status = shared.lock().await;
            status.running = false;
            status.last_result = Some(outcome);
            status.last_stats = stats;
            status.finished_at = Some(Local::now());
        });

        Ok(accepted)
    }

    pub async fn status(&self) -> RunStatus {
        self.status.lock().await.clone()
    }

    pub async fn is_running(&self) -> bool {
        self.status.lock().await.running
    }
}

/// 最外层上下文 + 根因，不逐层展开
fn describe_failure(e: &anyhow::Error) -> String {
    let top = e.to_string();
    let root = e.root_cause().to_string();
    if top.contains(&root) {
        top
    } else {
        format!("{}: {}", top, root)
    }
}
