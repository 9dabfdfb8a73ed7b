//! Persistent scheduled jobs for the `automatic` policy
//!
//! Each report becomes one job that asks for "any network" and survives a
//! reboot. Hosts with a native job scheduler implement [`JobScheduler`];
//! [`SpoolScheduler`] keeps jobs as files in a spool directory and runs them
//! when the host calls [`SpoolScheduler::run_pending`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::collector::{ReportTransport, SubmitError};
use crate::error::{Error, Result};

/// Identity of a scheduled job.
///
/// Random rather than time-derived, so two reports captured in the same
/// clock tick never share an id.
pub type JobId = Uuid;

/// Network precondition for running a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkRequirement {
    None,
    Any,
    Unmetered,
}

/// Preconditions requested from the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConstraints {
    pub network: NetworkRequirement,
    /// Keep the job across reboots
    pub persisted: bool,
}

impl Default for JobConstraints {
    fn default() -> Self {
        Self {
            network: NetworkRequirement::Any,
            persisted: true,
        }
    }
}

/// One report delivery handed to the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub created_at: DateTime<Utc>,
    pub constraints: JobConstraints,
    /// Serialized report document
    pub payload: String,
}

impl ScheduledJob {
    pub fn for_report(payload: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            constraints: JobConstraints::default(),
            payload: payload.into(),
        }
    }
}

/// Host facility that runs jobs later, even after the process dies
pub trait JobScheduler: Send + Sync {
    fn schedule(&self, job: ScheduledJob) -> Result<JobId>;

    /// Run jobs that are due now through `transport`.
    ///
    /// Schedulers that dispatch jobs on their own keep this no-op.
    fn run_pending(&self, transport: &dyn ReportTransport) -> Result<JobRunSummary> {
        let _ = transport;
        Ok(JobRunSummary::default())
    }
}

/// Counts from one [`SpoolScheduler::run_pending`] call
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct JobRunSummary {
    pub delivered: usize,
    pub rescheduled: usize,
    pub dropped: usize,
    pub corrupt: usize,
}

/// [`JobScheduler`] that persists each job as `<id>.json` in a directory
#[derive(Debug, Clone)]
pub struct SpoolScheduler {
    dir: PathBuf,
}

impl SpoolScheduler {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn job_path(&self, id: &JobId) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Paths of all spooled job files
    fn job_files(&self) -> Result<Vec<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Number of jobs waiting to run
    pub fn pending_count(&self) -> Result<usize> {
        Ok(self.job_files()?.len())
    }

    /// Run every spooled job once, oldest first.
    ///
    /// Jobs that could not reach the collector stay spooled; everything else
    /// is removed.
    pub fn run_pending(&self, transport: &dyn ReportTransport) -> Result<JobRunSummary> {
        let mut summary = JobRunSummary::default();
        let mut jobs = Vec::new();

        for path in self.job_files()? {
            let parsed = fs::read_to_string(&path)
                .map_err(Error::from)
                .and_then(|content| serde_json::from_str::<ScheduledJob>(&content).map_err(Error::from));

            match parsed {
                Ok(job) => jobs.push((path, job)),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Dropping corrupt job");
                    remove_job_file(&path);
                    summary.corrupt += 1;
                }
            }
        }

        jobs.sort_by_key(|(_, job)| job.created_at);

        for (path, job) in jobs {
            match transport.submit(&job.payload) {
                Ok(_) => {
                    tracing::debug!(job_id = %job.id, "Delivered scheduled report");
                    remove_job_file(&path);
                    summary.delivered += 1;
                }
                Err(SubmitError::Transient(reason)) => {
                    tracing::warn!(job_id = %job.id, %reason, "Collector unreachable; rescheduling");
                    summary.rescheduled += 1;
                }
                Err(SubmitError::Terminal(reason)) => {
                    tracing::error!(job_id = %job.id, %reason, "Dropping scheduled report");
                    remove_job_file(&path);
                    summary.dropped += 1;
                }
            }
        }

        Ok(summary)
    }
}

fn remove_job_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::error!(path = %path.display(), error = %e, "Failed to remove job file");
        }
    }
}

impl JobScheduler for SpoolScheduler {
    fn schedule(&self, job: ScheduledJob) -> Result<JobId> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            Error::Scheduler(format!(
                "failed to create spool directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let path = self.job_path(&job.id);
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string(&job)?;

        fs::write(&tmp_path, content)?;
        fs::rename(&tmp_path, &path)?;

        tracing::debug!(job_id = %job.id, "Scheduled report delivery");
        Ok(job.id)
    }

    fn run_pending(&self, transport: &dyn ReportTransport) -> Result<JobRunSummary> {
        SpoolScheduler::run_pending(self, transport)
    }
}
