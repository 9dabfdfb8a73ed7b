//! Durable report queue and its retry worker
//!
//! Used by the `automatic_legacy` policy. Reports that must survive a
//! process restart are appended to a newline-delimited JSON file; a serial
//! worker drains it whenever a new report arrives or the host signals that
//! delivery is worth trying again (app start, connectivity regained).

mod store;
mod worker;

pub use store::ReportQueue;
pub use worker::{EntryOutcome, PassSummary, QueueWorker, RetryWorker};
