//! Retry worker draining the durable queue
//!
//! A pass moves through `LOADING -> PROCESSING* -> COMPACTING`:
//! - load every entry in file order
//! - try one submission per entry
//! - rewrite the file with only the retained entries
//!
//! Delivery is at-least-once for entries that hit a connection failure and
//! at-most-once for everything else.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::collector::{ReportTransport, SubmitError};
use crate::error::{Error, Result};

use super::store::ReportQueue;

/// What happened to one queue entry during a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryOutcome {
    /// Accepted by the collector; removed
    Delivered,
    /// Collector unreachable; kept for the next pass
    Retained,
    /// Rejected terminally; removed and lost
    Dropped,
    /// Stored line is not a UTF-8 JSON document; removed and lost
    Corrupt,
}

impl EntryOutcome {
    fn keep(&self) -> bool {
        matches!(self, EntryOutcome::Retained)
    }
}

/// Counts from one processing pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub delivered: usize,
    pub retained: usize,
    pub dropped: usize,
    pub corrupt: usize,
}

impl PassSummary {
    fn record(&mut self, outcome: EntryOutcome) {
        match outcome {
            EntryOutcome::Delivered => self.delivered += 1,
            EntryOutcome::Retained => self.retained += 1,
            EntryOutcome::Dropped => self.dropped += 1,
            EntryOutcome::Corrupt => self.corrupt += 1,
        }
    }

    pub fn processed(&self) -> usize {
        self.delivered + self.retained + self.dropped + self.corrupt
    }
}

/// Runs processing passes over one queue.
///
/// Only one pass may run against a queue file at a time; [`QueueWorker`]
/// guarantees that by running passes on a single thread.
pub struct RetryWorker {
    queue: Arc<ReportQueue>,
    transport: Arc<dyn ReportTransport>,
}

impl RetryWorker {
    pub fn new(queue: Arc<ReportQueue>, transport: Arc<dyn ReportTransport>) -> Self {
        Self { queue, transport }
    }

    pub fn queue(&self) -> &ReportQueue {
        &self.queue
    }

    /// Run one full pass. Never fails: errors are classified and logged here.
    pub fn process_pass(&self) -> PassSummary {
        let mut summary = PassSummary::default();

        let entries = match self.queue.load_raw() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(
                    path = %self.queue.path().display(),
                    error = %e,
                    "Failed to load report queue"
                );
                return summary;
            }
        };

        if entries.is_empty() {
            return summary;
        }

        tracing::debug!(entries = entries.len(), "Processing report queue");

        let keep: Vec<bool> = entries
            .iter()
            .enumerate()
            .map(|(index, entry)| {
                let outcome = self.process_entry(index, entry);
                summary.record(outcome);
                outcome.keep()
            })
            .collect();

        match self.queue.compact(&keep) {
            Ok(remaining) => {
                tracing::info!(
                    delivered = summary.delivered,
                    retained = summary.retained,
                    dropped = summary.dropped,
                    corrupt = summary.corrupt,
                    remaining,
                    "Report queue pass finished"
                );
            }
            Err(e) => {
                // Delivered entries stay on disk and will be sent again
                tracing::error!(error = %e, "Failed to compact report queue");
            }
        }

        summary
    }

    fn process_entry(&self, index: usize, raw: &[u8]) -> EntryOutcome {
        let entry = match std::str::from_utf8(raw) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::error!(index, error = %e, "Dropping queued report: not valid UTF-8");
                return EntryOutcome::Corrupt;
            }
        };

        match serde_json::from_str::<serde_json::Value>(entry) {
            Ok(value) if value.is_object() => {}
            Ok(_) => {
                tracing::error!(index, "Dropping queued report: not a JSON object");
                return EntryOutcome::Corrupt;
            }
            Err(e) => {
                tracing::error!(index, error = %e, "Dropping corrupt queued report");
                return EntryOutcome::Corrupt;
            }
        }

        match self.transport.submit(entry) {
            Ok(response) => {
                tracing::debug!(index, status = response.status, "Delivered queued report");
                EntryOutcome::Delivered
            }
            Err(SubmitError::Transient(reason)) => {
                tracing::warn!(index, %reason, "Collector unreachable; keeping report");
                EntryOutcome::Retained
            }
            Err(SubmitError::Terminal(reason)) => {
                tracing::error!(index, %reason, "Dropping report after terminal failure");
                EntryOutcome::Dropped
            }
        }
    }
}

enum WorkerMessage {
    Trigger,
    Shutdown,
}

/// Single background thread running [`RetryWorker`] passes one at a time.
///
/// Triggers that arrive while a pass is running are coalesced into one
/// follow-up pass. Re-processing the file is harmless because delivered
/// entries are already gone from it.
pub struct QueueWorker {
    sender: Sender<WorkerMessage>,
    handle: Option<JoinHandle<()>>,
}

impl QueueWorker {
    pub fn spawn(worker: RetryWorker) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();

        let handle = std::thread::Builder::new()
            .name("bugtrail-queue".to_string())
            .spawn(move || run_worker(worker, receiver))
            .map_err(|e| Error::Collector(format!("failed to spawn queue worker: {}", e)))?;

        Ok(Self {
            sender,
            handle: Some(handle),
        })
    }

    /// Request a processing pass
    pub fn trigger(&self) {
        if self.sender.send(WorkerMessage::Trigger).is_err() {
            tracing::warn!("Queue worker has stopped; trigger ignored");
        }
    }

    /// Finish pending passes and stop the thread
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.sender.send(WorkerMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Queue worker thread panicked");
            }
        }
    }
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(worker: RetryWorker, receiver: Receiver<WorkerMessage>) {
    while let Ok(message) = receiver.recv() {
        if let WorkerMessage::Shutdown = message {
            break;
        }

        let mut shutdown = false;
        loop {
            match receiver.try_recv() {
                Ok(WorkerMessage::Trigger) => continue,
                Ok(WorkerMessage::Shutdown) | Err(TryRecvError::Disconnected) => {
                    shutdown = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }

        worker.process_pass();

        if shutdown {
            break;
        }
    }
    tracing::debug!("Queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::SubmitResponse;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Transport answering per document, recording every call
    #[derive(Default)]
    struct ScriptedTransport {
        failures: HashMap<String, SubmitError>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn failing(mut self, document: &str, error: SubmitError) -> Self {
            self.failures.insert(document.to_string(), error);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ReportTransport for ScriptedTransport {
        fn submit(&self, document: &str) -> std::result::Result<SubmitResponse, SubmitError> {
            self.calls.lock().unwrap().push(document.to_string());
            match self.failures.get(document) {
                Some(error) => Err(error.clone()),
                None => Ok(SubmitResponse {
                    status: 200,
                    body: None,
                }),
            }
        }
    }

    fn doc(n: u32) -> String {
        format!(r#"{{"report":{{"n":{}}},"api_key":"k"}}"#, n)
    }

    fn setup(transport: ScriptedTransport) -> (TempDir, Arc<ReportQueue>, Arc<ScriptedTransport>, RetryWorker) {
        crate::logging::init_test();
        let dir = TempDir::new().unwrap();
        let queue = Arc::new(ReportQueue::new(dir.path().join("report_queue.jsonl")));
        let transport = Arc::new(transport);
        let worker = RetryWorker::new(Arc::clone(&queue), transport.clone());
        (dir, queue, transport, worker)
    }

    #[test]
    fn test_pass_on_missing_file_is_noop() {
        let (_dir, queue, transport, worker) = setup(ScriptedTransport::default());
        assert_eq!(worker.process_pass(), PassSummary::default());
        assert!(transport.calls().is_empty());
        assert!(!queue.path().exists());
    }

    #[test]
    fn test_all_delivered_deletes_file() {
        let (_dir, queue, transport, worker) = setup(ScriptedTransport::default());
        for n in 1..=3 {
            queue.append(&doc(n)).unwrap();
        }

        let summary = worker.process_pass();

        assert_eq!(summary.delivered, 3);
        assert_eq!(transport.calls(), vec![doc(1), doc(2), doc(3)]);
        assert!(!queue.path().exists());
    }

    #[test]
    fn test_transient_failure_retained_in_position() {
        let transport = ScriptedTransport::default()
            .failing(&doc(2), SubmitError::Transient("connection refused".to_string()));
        let (_dir, queue, _transport, worker) = setup(transport);
        for n in 1..=3 {
            queue.append(&doc(n)).unwrap();
        }

        let summary = worker.process_pass();

        assert_eq!(summary.delivered, 2);
        assert_eq!(summary.retained, 1);
        assert_eq!(queue.load().unwrap(), vec![doc(2)]);
    }

    #[test]
    fn test_terminal_failure_removes_exactly_one_entry() {
        let transport = ScriptedTransport::default()
            .failing(&doc(1), SubmitError::Transient("offline".to_string()))
            .failing(&doc(2), SubmitError::Terminal("malformed response".to_string()))
            .failing(&doc(3), SubmitError::Transient("offline".to_string()));
        let (_dir, queue, _transport, worker) = setup(transport);
        for n in 1..=3 {
            queue.append(&doc(n)).unwrap();
        }

        let summary = worker.process_pass();

        assert_eq!(summary.dropped, 1);
        assert_eq!(summary.retained, 2);
        assert_eq!(queue.load().unwrap(), vec![doc(1), doc(3)]);
    }

    #[test]
    fn test_corrupt_entry_dropped_without_submission() {
        let (_dir, queue, transport, worker) = setup(ScriptedTransport::default());
        queue.append(&doc(1)).unwrap();
        queue.append("{not json").unwrap();
        queue.append("[1,2,3]").unwrap();

        let summary = worker.process_pass();

        assert_eq!(summary.corrupt, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(transport.calls(), vec![doc(1)]);
        assert!(!queue.path().exists());
    }

    #[test]
    fn test_invalid_utf8_entry_dropped_and_neighbours_kept_intact() {
        let transport = ScriptedTransport::default()
            .failing(&doc(3), SubmitError::Transient("offline".to_string()));
        let (_dir, queue, transport, worker) = setup(transport);

        let mut raw = Vec::new();
        raw.extend_from_slice(doc(1).as_bytes());
        raw.push(b'\n');
        raw.extend_from_slice(b"{\"report\":{\"what_happened\":\"bad\xff\"},\"api_key\":\"k\"}\n");
        raw.extend_from_slice(doc(3).as_bytes());
        raw.push(b'\n');
        std::fs::write(queue.path(), &raw).unwrap();

        let summary = worker.process_pass();

        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.corrupt, 1);
        assert_eq!(summary.retained, 1);
        assert_eq!(transport.calls(), vec![doc(1), doc(3)]);
        assert_eq!(
            std::fs::read(queue.path()).unwrap(),
            format!("{}\n", doc(3)).into_bytes()
        );
    }

    #[test]
    fn test_offline_then_online_drains_queue() {
        let offline = ScriptedTransport::default()
            .failing(&doc(1), SubmitError::Transient("offline".to_string()))
            .failing(&doc(2), SubmitError::Transient("offline".to_string()));
        let (_dir, queue, _transport, worker) = setup(offline);
        queue.append(&doc(1)).unwrap();
        queue.append(&doc(2)).unwrap();

        assert_eq!(worker.process_pass().retained, 2);
        assert_eq!(queue.len().unwrap(), 2);

        let online = RetryWorker::new(Arc::clone(&queue), Arc::new(ScriptedTransport::default()));
        assert_eq!(online.process_pass().delivered, 2);
        assert!(!queue.path().exists());
    }

    #[test]
    fn test_background_worker_runs_triggered_passes() {
        let (_dir, queue, transport, worker) = setup(ScriptedTransport::default());
        queue.append(&doc(1)).unwrap();

        let background = QueueWorker::spawn(worker).unwrap();
        background.trigger();
        background.trigger();
        background.shutdown();

        assert_eq!(transport.calls(), vec![doc(1)]);
        assert!(queue.is_empty().unwrap());
    }
}
