//! Submission policy engine
//!
//! Maps a [`RetryPolicy`] to a delivery strategy:
//!
//! | Policy | Strategy | Survives process death |
//! |--------|----------|------------------------|
//! | `automatic` | one persistent scheduled job per report | yes |
//! | `automatic_legacy` | append to the durable queue, trigger the retry worker | yes |
//! | `manual` | POST now, hand the outcome back for a user-driven retry | no |

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::collector::{ReportTransport, SubmitError, SubmitResponse};
use crate::error::{Error, Result};
use crate::queue::{QueueWorker, ReportQueue, RetryWorker};
use crate::report::Report;
use crate::scheduler::{JobRunSummary, JobScheduler, ScheduledJob};

/// How persistently a report is delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Hand the report to the host's persistent job scheduler
    #[default]
    Automatic,
    /// Durable newline-delimited queue drained by the retry worker
    AutomaticLegacy,
    /// Synchronous, unpersisted submission
    Manual,
}

impl RetryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryPolicy::Automatic => "automatic",
            RetryPolicy::AutomaticLegacy => "automatic_legacy",
            RetryPolicy::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "automatic" => Some(RetryPolicy::Automatic),
            "automatic_legacy" | "automatic-legacy" => Some(RetryPolicy::AutomaticLegacy),
            "manual" => Some(RetryPolicy::Manual),
            _ => None,
        }
    }
}

/// Result of a MANUAL submission
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Delivered(SubmitResponse),
    /// The report is handed back so the user can retry it
    Failed { report: Report, error: SubmitError },
}

impl SubmitOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, SubmitOutcome::Delivered(_))
    }
}

/// Routes frozen reports to the strategy their policy selects
pub struct SubmissionEngine {
    transport: Arc<dyn ReportTransport>,
    scheduler: Arc<dyn JobScheduler>,
    queue: Arc<ReportQueue>,
    worker: QueueWorker,
}

impl SubmissionEngine {
    /// Build the engine and start the queue's retry worker
    pub fn new(
        transport: Arc<dyn ReportTransport>,
        scheduler: Arc<dyn JobScheduler>,
        queue: Arc<ReportQueue>,
    ) -> Result<Self> {
        let worker = QueueWorker::spawn(RetryWorker::new(
            Arc::clone(&queue),
            Arc::clone(&transport),
        ))?;

        Ok(Self {
            transport,
            scheduler,
            queue,
            worker,
        })
    }

    pub fn queue(&self) -> &ReportQueue {
        &self.queue
    }

    /// Submit a report under `policy`.
    ///
    /// Returns `Some(outcome)` only for [`RetryPolicy::Manual`]. The automatic
    /// policies return once the report is persisted; delivery failures after
    /// that point are logged, never surfaced.
    pub fn submit(&self, report: Report, policy: RetryPolicy) -> Result<Option<SubmitOutcome>> {
        match policy {
            RetryPolicy::Automatic => {
                let job_id = self.scheduler.schedule(ScheduledJob::for_report(report.into_json()))?;
                tracing::info!(job_id = %job_id, "Report handed to job scheduler");
                Ok(None)
            }
            RetryPolicy::AutomaticLegacy => {
                self.queue.append(report.json())?;
                tracing::info!(path = %self.queue.path().display(), "Report queued");
                self.worker.trigger();
                Ok(None)
            }
            RetryPolicy::Manual => Ok(Some(self.submit_now(report))),
        }
    }

    /// POST a report right away, blocking until the collector answers
    pub fn submit_now(&self, report: Report) -> SubmitOutcome {
        deliver(self.transport.as_ref(), report)
    }

    /// POST a report on a dedicated thread and pass the outcome to `on_complete`.
    ///
    /// The request cannot be cancelled once started.
    pub fn submit_in_background<F>(&self, report: Report, on_complete: F) -> Result<JoinHandle<()>>
    where
        F: FnOnce(SubmitOutcome) + Send + 'static,
    {
        let transport = Arc::clone(&self.transport);
        std::thread::Builder::new()
            .name("bugtrail-submit".to_string())
            .spawn(move || on_complete(deliver(transport.as_ref(), report)))
            .map_err(|e| Error::Collector(format!("failed to spawn submit thread: {}", e)))
    }

    /// Run scheduled jobs that are due, through this engine's transport
    pub fn run_pending_jobs(&self) -> Result<JobRunSummary> {
        let summary = self.scheduler.run_pending(self.transport.as_ref())?;
        tracing::info!(
            delivered = summary.delivered,
            rescheduled = summary.rescheduled,
            dropped = summary.dropped,
            corrupt = summary.corrupt,
            "Scheduled jobs run"
        );
        Ok(summary)
    }

    /// Ask the retry worker for a pass (app start, connectivity regained)
    pub fn trigger_queue(&self) {
        self.worker.trigger();
    }

    /// Wait for pending queue passes and stop the worker
    pub fn shutdown(self) {
        self.worker.shutdown();
    }
}

fn deliver(transport: &dyn ReportTransport, report: Report) -> SubmitOutcome {
    match transport.submit(report.json()) {
        Ok(response) => {
            tracing::info!(status = response.status, "Report delivered");
            SubmitOutcome::Delivered(response)
        }
        Err(error) => {
            tracing::warn!(error = %error, "Report submission failed");
            SubmitOutcome::Failed { report, error }
        }
    }
}
