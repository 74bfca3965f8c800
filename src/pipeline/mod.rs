//! Export and reimport orchestration
//!
//! Both pipelines talk to the service only through [`crate::api::RemoteApi`] and report
//! progress through a [`ProgressSink`].

pub mod export;
pub mod progress;
pub mod reimport;

pub use export::{ExportOptions, ExportSummary, Exporter};
pub use progress::{MutationCallbacks, MutationKind, NoProgress, ProgressHandler, ProgressSink};
pub use reimport::{ReimportOptions, ReimportSummary, Reimporter};
