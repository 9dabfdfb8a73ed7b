//! End-to-end tests for the capture-to-delivery pipeline
//!
//! These tests drive the public API the way an embedding application would:
//! capture, edit, submit, then drain the durable queue.

use bugtrail_core::config::{AppConfig, CollectorConfig, DeliveryConfig};
use bugtrail_core::environment::{DeviceFacts, DeviceInspector};
use bugtrail_core::{
    Attachment, Attribute, BugReporter, Config, InvocationMethod, ReportQueue, ReportTransport,
    RetryPolicy, RetryWorker, SpoolScheduler, SubmitError, SubmitResponse,
};
use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================
// Helpers
// ============================================

struct QuietInspector;

impl DeviceInspector for QuietInspector {
    fn inspect(&self) -> DeviceFacts {
        DeviceFacts::default()
    }
}

/// Transport that is "offline" for some reports, identified by what_happened
#[derive(Default)]
struct SelectiveTransport {
    unreachable_for: HashSet<String>,
    delivered: Mutex<Vec<String>>,
}

impl SelectiveTransport {
    fn offline_for(labels: &[&str]) -> Self {
        Self {
            unreachable_for: labels.iter().map(|s| s.to_string()).collect(),
            delivered: Mutex::new(Vec::new()),
        }
    }

    fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

fn label_of(document: &str) -> String {
    let value: serde_json::Value = serde_json::from_str(document).unwrap();
    value["report"]["what_happened"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}

impl ReportTransport for SelectiveTransport {
    fn submit(&self, document: &str) -> Result<SubmitResponse, SubmitError> {
        let label = label_of(document);
        if self.unreachable_for.contains(&label) {
            return Err(SubmitError::Transient("connection refused".to_string()));
        }
        self.delivered.lock().unwrap().push(label);
        Ok(SubmitResponse {
            status: 200,
            body: None,
        })
    }
}

fn config_in(dir: &Path, server_url: &str, policy: RetryPolicy) -> Config {
    Config {
        collector: CollectorConfig {
            server_url: Some(server_url.to_string()),
            api_key: Some("bt_live_test".to_string()),
            timeout_secs: 5,
            connect_timeout_secs: 5,
            ..Default::default()
        },
        delivery: DeliveryConfig {
            policy,
            queue_path: Some(dir.join("report_queue.jsonl")),
            jobs_dir: Some(dir.join("jobs")),
        },
        app: AppConfig {
            bundle_identifier: "com.example.notes".to_string(),
            bundle_name: "Notes".to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// Queue three frozen reports labelled "one", "two", "three"
fn seed_queue(reporter: &BugReporter, queue: &ReportQueue) {
    for label in ["one", "two", "three"] {
        let context = reporter.begin_capture(InvocationMethod::Shake);
        let report = context
            .freeze(reporter.config().collector.identity().as_ref(), Some(label))
            .unwrap();
        queue.append(report.json()).unwrap();
        reporter.on_flow_finished();
    }
}

/// Minimal HTTP server answering one request per status line, in order,
/// and recording the request bodies
fn scripted_server(status_lines: Vec<&'static str>) -> (String, std::thread::JoinHandle<Vec<String>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/api/v1/reports.json", listener.local_addr().unwrap());

    let handle = std::thread::spawn(move || {
        let mut bodies = Vec::new();
        for status_line in status_lines {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut content_length = 0usize;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    break;
                }
                if let Some((name, value)) = trimmed.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
            }
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).unwrap();
            bodies.push(String::from_utf8(body).unwrap());

            let mut stream = stream;
            let response = format!(
                "{}\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{{}}",
                status_line
            );
            stream.write_all(response.as_bytes()).unwrap();
        }
        bodies
    });

    (url, handle)
}

/// Server answering `count` requests with 200
fn accepting_server(count: usize) -> (String, std::thread::JoinHandle<Vec<String>>) {
    scripted_server(vec!["HTTP/1.1 200 OK"; count])
}

fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}/api/v1/reports.json", addr)
}

fn queue_path(dir: &TempDir) -> PathBuf {
    dir.path().join("report_queue.jsonl")
}

// ============================================
// Queue scenarios
// ============================================

#[test]
fn test_middle_entry_unreachable_stays_in_place() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), "http://unused.invalid/", RetryPolicy::AutomaticLegacy);
    let transport = Arc::new(SelectiveTransport::offline_for(&["two"]));
    let reporter = BugReporter::with_services(
        config,
        transport.clone(),
        Arc::new(SpoolScheduler::new(dir.path().join("jobs"))),
        Box::new(QuietInspector),
    )
    .unwrap();

    let queue = Arc::new(ReportQueue::new(queue_path(&dir)));
    seed_queue(&reporter, &queue);

    let summary = RetryWorker::new(Arc::clone(&queue), transport.clone()).process_pass();

    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.retained, 1);
    assert_eq!(transport.delivered(), vec!["one", "three"]);

    let remaining = queue.load().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(label_of(&remaining[0]), "two");
}

#[test]
fn test_offline_reports_drain_once_online() {
    let dir = TempDir::new().unwrap();
    let config = config_in(dir.path(), "http://unused.invalid/", RetryPolicy::AutomaticLegacy);
    let offline = Arc::new(SelectiveTransport::offline_for(&["one", "two", "three"]));
    let reporter = BugReporter::with_services(
        config,
        offline.clone(),
        Arc::new(SpoolScheduler::new(dir.path().join("jobs"))),
        Box::new(QuietInspector),
    )
    .unwrap();

    for label in ["one", "two", "three"] {
        let context = reporter.begin_capture(InvocationMethod::Button);
        reporter
            .finalize_and_submit(&context, Some(label), None, None)
            .unwrap();
        reporter.on_flow_finished();
    }
    reporter.shutdown();

    let queue = Arc::new(ReportQueue::new(queue_path(&dir)));
    assert_eq!(queue.len().unwrap(), 3);

    let online = Arc::new(SelectiveTransport::default());
    let summary = RetryWorker::new(Arc::clone(&queue), online.clone()).process_pass();

    assert_eq!(summary.delivered, 3);
    assert_eq!(online.delivered(), vec!["one", "two", "three"]);
    assert!(!queue_path(&dir).exists());
}

// ============================================
// Over real HTTP
// ============================================

#[test]
fn test_server_error_removes_exactly_one_entry() {
    let dir = TempDir::new().unwrap();
    let (url, server) = scripted_server(vec![
        "HTTP/1.1 200 OK",
        "HTTP/1.1 500 Internal Server Error",
        "HTTP/1.1 200 OK",
    ]);
    let config = config_in(dir.path(), &url, RetryPolicy::AutomaticLegacy);
    let capture = BugReporter::with_services(
        config.clone(),
        Arc::new(SelectiveTransport::default()),
        Arc::new(SpoolScheduler::new(dir.path().join("jobs"))),
        Box::new(QuietInspector),
    )
    .unwrap();

    let queue = Arc::new(ReportQueue::new(queue_path(&dir)));
    seed_queue(&capture, &queue);
    capture.shutdown();

    let transport = Arc::new(bugtrail_core::HttpTransport::new(&config.collector).unwrap());
    let worker = RetryWorker::new(Arc::clone(&queue), transport);

    let summary = worker.process_pass();
    let bodies = server.join().unwrap();

    let labels: Vec<String> = bodies.iter().map(|b| label_of(b)).collect();
    assert_eq!(labels, vec!["one", "two", "three"]);
    assert_eq!(summary.delivered, 2);
    assert_eq!(summary.dropped, 1);
    assert_eq!(summary.retained, 0);

    // The rejected report is gone too; nothing is left to retry
    assert!(queue.load().unwrap().is_empty());
    assert!(!queue_path(&dir).exists());
}

#[test]
fn test_legacy_policy_delivers_over_http() {
    let dir = TempDir::new().unwrap();
    let (url, server) = accepting_server(1);
    let reporter = BugReporter::new(config_in(dir.path(), &url, RetryPolicy::AutomaticLegacy)).unwrap();

    let mut context = reporter.begin_capture(InvocationMethod::Screenshot);
    context.add_attachment(Attachment::from_bytes("shot.png", "image/png", vec![0x89, 0x50]));
    context.put_attribute("plan", Some(Attribute::string("pro")));
    reporter
        .finalize_and_submit(&context, Some("Sync never finishes"), None, None)
        .unwrap();
    reporter.on_flow_finished();
    reporter.shutdown();

    let bodies = server.join().unwrap();
    assert_eq!(bodies.len(), 1);
    let document: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(document["api_key"], "bt_live_test");
    assert_eq!(document["app"]["bundle_name"], "Notes");
    assert_eq!(document["report"]["what_happened"], "Sync never finishes");
    assert_eq!(document["report"]["attachments"][0]["filename"], "shot.png");
    assert_eq!(document["report"]["attributes"]["plan"]["attribute_value"], "pro");

    assert!(!queue_path(&dir).exists());
}

#[test]
fn test_legacy_policy_keeps_report_when_refused() {
    let dir = TempDir::new().unwrap();
    let reporter =
        BugReporter::new(config_in(dir.path(), &refused_url(), RetryPolicy::AutomaticLegacy))
            .unwrap();

    let context = reporter.begin_capture(InvocationMethod::Shake);
    reporter
        .finalize_and_submit(&context, Some("offline"), None, None)
        .unwrap();
    reporter.on_flow_finished();
    reporter.shutdown();

    let queue = ReportQueue::new(queue_path(&dir));
    let entries = queue.load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(label_of(&entries[0]), "offline");
}

#[test]
fn test_manual_policy_failure_leaves_no_queue_file() {
    let dir = TempDir::new().unwrap();
    let reporter =
        BugReporter::new(config_in(dir.path(), &refused_url(), RetryPolicy::Manual)).unwrap();

    let context = reporter.begin_capture(InvocationMethod::Button);
    let outcome = reporter
        .finalize_and_submit(&context, Some("manual"), None, None)
        .unwrap()
        .expect("manual policy returns an outcome");
    reporter.on_flow_finished();
    reporter.shutdown();

    assert!(!outcome.is_delivered());
    assert!(!queue_path(&dir).exists());
    assert!(!dir.path().join("jobs").exists());
}

#[test]
fn test_automatic_policy_spools_job_then_runs_it() {
    let dir = TempDir::new().unwrap();
    let (url, server) = accepting_server(1);
    let config = config_in(dir.path(), &url, RetryPolicy::Automatic);
    let reporter = BugReporter::new(config.clone()).unwrap();

    let context = reporter.begin_capture(InvocationMethod::ScreenRecording);
    assert!(reporter
        .finalize_and_submit(&context, Some("scheduled"), None, None)
        .unwrap()
        .is_none());
    reporter.on_flow_finished();
    reporter.shutdown();

    let scheduler = SpoolScheduler::new(config.delivery.jobs_dir());
    assert_eq!(scheduler.pending_count().unwrap(), 1);

    let transport = bugtrail_core::HttpTransport::new(&config.collector).unwrap();
    let summary = scheduler.run_pending(&transport).unwrap();
    assert_eq!(summary.delivered, 1);
    assert_eq!(scheduler.pending_count().unwrap(), 0);

    let bodies = server.join().unwrap();
    assert_eq!(label_of(&bodies[0]), "scheduled");
}
