//! Report orchestration: cache-or-fetch activity, decide skip-or-generate,
//! persist markdown reports, and fan the run out across repositories.

pub mod error;
pub mod pipeline;
pub mod render;
pub mod store;

#[cfg(test)]
mod tests;

pub use error::{PipelineError, Result};
pub use pipeline::{
    CancelToken, EntityOutcome, EntityStatus, PipelineReport, ReportPipeline, RunOptions,
    RunSummary,
};
pub use store::ReportStore;
