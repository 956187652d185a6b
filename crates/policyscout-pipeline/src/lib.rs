//! The research pipeline.
//!
//! A run moves through four phases, each a module here:
//!
//! 1. [`signal_hunter`]: find named policy programs in the target countries.
//! 2. [`vetting`]: gather success and criticism evidence and score it.
//! 3. [`gap`]: classify whether the domestic country already has an equivalent.
//! 4. [`report`]: write up the high and medium opportunities and persist them.
//!
//! [`Pipeline`] drives the phases against a [`RecordStore`](policyscout_store::RecordStore)
//! and records every step through an [`ActivityCollector`].

pub mod activity;
pub mod batch;
mod context;
mod error;
pub mod gap;
pub mod interpret;
mod orchestrator;
pub mod report;
pub mod signal_hunter;
pub mod vetting;

#[cfg(test)]
mod testing;

pub use activity::{ActivityCollector, summarize};
pub use context::PhaseContext;
pub use error::PipelineError;
pub use interpret::interpret_policy_idea;
pub use orchestrator::{CancelRegistry, Pipeline, PipelineResult};
pub use signal_hunter::HuntStrategy;
