pub mod model;
pub mod service;
pub mod supervisor;

pub use model::{DateWindow, PipelineConfig, ResolvedWindow, RunRequest, RunStats, WindowError};
pub use service::Pipeline;
pub use supervisor::{
    Accepted, PipelineSupervisor, RunOutcome, RunStatus, TriggerError, TriggerRequest,
};
