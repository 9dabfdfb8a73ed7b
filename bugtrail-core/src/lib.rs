//! # bugtrail-core
//!
//! Core library for bugtrail - capture bug reports and get them to a remote
//! collector, even when the device is offline or the process is killed.
//!
//! This library provides:
//! - The report data model (attributes, attachments, environment snapshot)
//! - The draft-to-report assembler and its JSON wire format
//! - A per-flow attachment data cache
//! - Delivery policies: scheduled jobs, a durable queue with a retry worker,
//!   and synchronous manual submission
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! Data flows one way, from capture to delivery:
//!
//! ```text
//! invocation -> BugContext (draft) -> Report (frozen) -> policy engine
//!            -> { HTTP now | scheduled job | durable queue -> retry worker } -> collector
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use bugtrail_core::{BugReporter, Config, InvocationMethod};
//!
//! let config = Config::load().expect("failed to load config");
//! let reporter = BugReporter::new(config).expect("failed to start reporter");
//!
//! let mut draft = reporter.begin_capture(InvocationMethod::Shake);
//! draft.set_summary("Checkout button does nothing");
//! let outcome = reporter.finalize_and_submit(&draft, None, None, None);
//! reporter.on_flow_finished();
//! ```

// Re-export commonly used items at the crate root
pub use cache::{AttachmentDataCache, FlowGuard};
pub use collector::{HttpTransport, ReportTransport, SubmitError, SubmitResponse};
pub use config::Config;
pub use context::BugContext;
pub use environment::{EnvironmentSnapshot, InvocationMethod};
pub use error::{Error, Result};
pub use model::*;
pub use policy::{RetryPolicy, SubmissionEngine, SubmitOutcome};
pub use queue::{PassSummary, ReportQueue, RetryWorker};
pub use report::{Identity, Report};
pub use reporter::BugReporter;
pub use scheduler::{JobRunSummary, JobScheduler, ScheduledJob, SpoolScheduler};

// Public modules
pub mod cache;
pub mod collector;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod logging;
pub mod model;
pub mod policy;
pub mod queue;
pub mod report;
pub mod reporter;
pub mod scheduler;
