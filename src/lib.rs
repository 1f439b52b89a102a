pub mod config;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod symbol;
pub mod transform;

pub use config::Settings;
pub use pipeline::{Pipeline, PipelineSupervisor, RunRequest, RunStats};
pub use symbol::Symbol;
