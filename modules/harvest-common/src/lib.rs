pub mod config;
pub mod error;
pub mod report;
pub mod types;

pub use config::{
    Concurrency, EnvConfig, FetchSettings, FileConfig, HarvestConfig, PaginationSettings,
    RenderBackend, RenderPolicy, RenderSettings,
};
pub use error::{ConfigError, HarvestError};
pub use report::{EventKind, RunEvent, RunReport, SourceReport, SourceStatus, TerminationReason};
pub use types::*;
