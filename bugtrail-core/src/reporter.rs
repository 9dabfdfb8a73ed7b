//! Pipeline root
//!
//! [`BugReporter`] owns every service the capture-to-delivery pipeline needs
//! (transport, scheduler, queue worker, attachment cache) and exposes the
//! small API that invocation detectors and report UIs call:
//!
//! 1. [`BugReporter::begin_capture`] when a gesture asks for a report
//! 2. edit the returned [`BugContext`]
//! 3. [`BugReporter::finalize_and_submit`]
//! 4. [`BugReporter::on_flow_finished`] on every exit path, including cancel

use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::{AttachmentDataCache, FlowGuard};
use crate::collector::{HttpTransport, ReportTransport};
use crate::config::Config;
use crate::context::BugContext;
use crate::environment::{DeviceInspector, EnvironmentSnapshot, HostInspector, InvocationMethod, SessionSnapshot};
use crate::error::Result;
use crate::model::Attachment;
use crate::policy::{RetryPolicy, SubmissionEngine, SubmitOutcome};
use crate::queue::ReportQueue;
use crate::report::{AppBody, Identity, Report};
use crate::scheduler::{JobRunSummary, JobScheduler, SpoolScheduler};

/// Explicitly constructed pipeline root. No global state.
pub struct BugReporter {
    config: Config,
    inspector: Box<dyn DeviceInspector>,
    session: SessionSnapshot,
    cache: Arc<AttachmentDataCache>,
    flow: Mutex<Option<FlowGuard>>,
    engine: SubmissionEngine,
}

impl BugReporter {
    /// Build a reporter delivering over HTTP, with the spool scheduler and
    /// queue file taken from configuration
    pub fn new(config: Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.collector)?);
        let scheduler = Arc::new(SpoolScheduler::new(config.delivery.jobs_dir()));
        Self::with_services(config, transport, scheduler, Box::new(HostInspector))
    }

    /// Build a reporter from caller-supplied services
    pub fn with_services(
        config: Config,
        transport: Arc<dyn ReportTransport>,
        scheduler: Arc<dyn JobScheduler>,
        inspector: Box<dyn DeviceInspector>,
    ) -> Result<Self> {
        let queue = Arc::new(ReportQueue::new(config.delivery.queue_path()));
        let engine = SubmissionEngine::new(transport, scheduler, queue)?;

        Ok(Self {
            config,
            inspector,
            session: SessionSnapshot::default(),
            cache: Arc::new(AttachmentDataCache::new()),
            flow: Mutex::new(None),
            engine,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &ReportQueue {
        self.engine.queue()
    }

    pub fn cache(&self) -> &AttachmentDataCache {
        &self.cache
    }

    pub fn set_user_email(&mut self, email: Option<String>) {
        self.session.user_email = email;
    }

    pub fn set_user_identifier(&mut self, identifier: Option<String>) {
        self.session.user_identifier = identifier;
    }

    fn flow(&self) -> MutexGuard<'_, Option<FlowGuard>> {
        self.flow.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Start a capture flow and return a fresh draft.
    ///
    /// The environment is snapshotted here, once. A flow that was never
    /// finished is ended first.
    pub fn begin_capture(&self, invocation: InvocationMethod) -> BugContext {
        let mut flow = self.flow();
        if flow.take().is_some() {
            tracing::warn!("Previous capture flow was not finished; clearing it");
        }
        *flow = Some(FlowGuard::new(Arc::clone(&self.cache)));

        let environment =
            EnvironmentSnapshot::capture(self.inspector.as_ref(), self.session.clone(), invocation);
        tracing::info!(invocation = invocation.as_str(), "Capture started");

        BugContext::new(environment, AppBody::from(&self.config.app))
    }

    /// End the current flow and release cached attachment data
    pub fn on_flow_finished(&self) {
        if let Some(guard) = self.flow().take() {
            guard.finish();
            tracing::debug!("Capture flow finished");
        }
    }

    /// Decoded bytes of an attachment, read at most once per flow
    pub fn load_attachment_data(&self, attachment: &Attachment) -> Result<Arc<[u8]>> {
        if let Some(data) = self.cache.get(attachment.id()) {
            return Ok(data);
        }
        let bytes = attachment.read_bytes()?;
        Ok(self.cache.put(attachment.id(), bytes))
    }

    /// Freeze the draft and submit it.
    ///
    /// `identity` falls back to the configured API key or email and `policy`
    /// to the configured delivery policy. Returns the synchronous outcome for
    /// the manual policy, `None` otherwise.
    pub fn finalize_and_submit(
        &self,
        context: &BugContext,
        what_happened: Option<&str>,
        identity: Option<&Identity>,
        policy: Option<RetryPolicy>,
    ) -> Result<Option<SubmitOutcome>> {
        let configured = self.config.collector.identity();
        let identity = identity.or(configured.as_ref());
        let report = context.freeze(identity, what_happened)?;
        let policy = policy.unwrap_or(self.config.delivery.policy);

        tracing::info!(policy = policy.as_str(), "Submitting report");
        self.engine.submit(report, policy)
    }

    /// User-initiated retry of a failed manual submission
    pub fn retry(&self, report: Report) -> SubmitOutcome {
        self.engine.submit_now(report)
    }

    /// Manual submission on a background thread, reporting to one callback
    pub fn submit_in_background<F>(&self, report: Report, on_complete: F) -> Result<std::thread::JoinHandle<()>>
    where
        F: FnOnce(SubmitOutcome) + Send + 'static,
    {
        self.engine.submit_in_background(report, on_complete)
    }

    /// External trigger for a queue pass (app start, connectivity regained)
    pub fn flush_queue(&self) {
        self.engine.trigger_queue();
    }

    /// Deliver reports spooled by the automatic policy (app start,
    /// connectivity regained)
    pub fn run_pending_jobs(&self) -> Result<JobRunSummary> {
        self.engine.run_pending_jobs()
    }

    /// Wait for pending queue passes, then stop background work
    pub fn shutdown(self) {
        self.on_flow_finished();
        self.engine.shutdown();
    }
}
