pub mod fingerprint;
pub mod types;

pub use types::{
    ActivityKind, ActivityRecord, ActivityState, DateRange, GenerationDecision, RepoId, Report,
    ReportOrigin, ReportSubject, Snapshot,
};
