//! bugtrail - CLI for capturing and delivering bug reports
//!
//! This tool provides commands for:
//! - Capturing a report from the terminal and submitting it
//! - Draining the durable report queue
//! - Running spooled scheduled jobs
//! - Checking configuration and pending deliveries
//!
//! Uses XDG Base Directory specification for file locations:
//! - Queue: $XDG_DATA_HOME/bugtrail/report_queue.jsonl (~/.local/share/bugtrail/report_queue.jsonl)
//! - Jobs: $XDG_DATA_HOME/bugtrail/jobs/ (~/.local/share/bugtrail/jobs/)
//! - Config: $XDG_CONFIG_HOME/bugtrail/config.toml (~/.config/bugtrail/config.toml)

use anyhow::{bail, Context, Result};
use bugtrail_core::report::Identity;
use bugtrail_core::{
    Attachment, Attribute, BugReporter, Config, HttpTransport, InvocationMethod, ReportQueue,
    RetryPolicy, RetryWorker, SpoolScheduler, SubmitOutcome,
};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "bugtrail")]
#[command(about = "Capture bug reports and deliver them to a collector")]
#[command(version)]
struct Args {
    /// Write logs to the state directory
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show collector configuration and pending deliveries
    Status,

    /// Capture a report and submit it
    Submit {
        /// What happened, in the reporter's words
        #[arg(short = 'm', long)]
        what_happened: String,

        /// File to attach (repeatable)
        #[arg(short, long = "attach")]
        attachments: Vec<PathBuf>,

        /// Custom attribute as KEY=VALUE (repeatable)
        #[arg(long = "attr", value_parser = parse_attribute)]
        attributes: Vec<(String, String)>,

        /// Delivery policy: automatic, automatic_legacy, manual (default: from config)
        #[arg(short, long, value_parser = parse_policy)]
        policy: Option<RetryPolicy>,

        /// Invocation method recorded with the report
        #[arg(long, default_value = "manual", value_parser = parse_invocation)]
        invocation: InvocationMethod,

        /// Route the report by this email instead of the configured identity
        #[arg(long)]
        email: Option<String>,
    },

    /// Run one pass over the durable report queue
    Flush,

    /// Run spooled scheduled jobs
    RunJobs,
}

fn parse_attribute(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

fn parse_policy(s: &str) -> std::result::Result<RetryPolicy, String> {
    RetryPolicy::parse(s).ok_or_else(|| format!("unknown policy '{}'", s))
}

fn parse_invocation(s: &str) -> std::result::Result<InvocationMethod, String> {
    InvocationMethod::parse(s).ok_or_else(|| format!("unknown invocation method '{}'", s))
}

/// Typed attribute from a command-line value
fn typed_attribute(value: &str) -> Attribute {
    if let Ok(b) = value.parse::<bool>() {
        Attribute::bool(b)
    } else if let Ok(i) = value.parse::<i64>() {
        Attribute::int(i)
    } else if let Ok(f) = value.parse::<f64>() {
        Attribute::float(f)
    } else {
        Attribute::string(value)
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    Config::ensure_xdg_env();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = if args.verbose {
        Some(bugtrail_core::logging::init(&config.logging).context("failed to initialize logging")?)
    } else {
        None
    };

    tracing::debug!(config = %Config::config_path().display(), "Configuration loaded");

    match args.command {
        Command::Status => cmd_status(&config),
        Command::Submit {
            what_happened,
            attachments,
            attributes,
            policy,
            invocation,
            email,
        } => cmd_submit(
            config,
            &what_happened,
            attachments,
            attributes,
            policy,
            invocation,
            email,
        ),
        Command::Flush => cmd_flush(&config),
        Command::RunJobs => cmd_run_jobs(&config),
    }
}

fn cmd_status(config: &Config) -> Result<()> {
    println!("Bugtrail Collector Configuration");
    println!("================================");
    println!();

    let collector = &config.collector;

    println!(
        "Server URL:      {}",
        collector.server_url.as_deref().unwrap_or("<not set>")
    );
    println!(
        "Identity:        {}",
        match collector.identity() {
            Some(Identity::ApiKey(_)) => "api key <set>".to_string(),
            Some(Identity::Email(email)) => format!("email {}", email),
            None => "<not set>".to_string(),
        }
    );
    println!("Policy:          {}", config.delivery.policy.as_str());
    println!("Timeout:         {}s", collector.timeout_secs);
    println!("Connect Timeout: {}s", collector.connect_timeout_secs);

    let queue = ReportQueue::new(config.delivery.queue_path());
    let scheduler = SpoolScheduler::new(config.delivery.jobs_dir());

    println!();
    println!("Queue File:      {}", queue.path().display());
    println!("Queued Reports:  {}", queue.len()?);
    println!("Jobs Directory:  {}", scheduler.dir().display());
    println!("Pending Jobs:    {}", scheduler.pending_count()?);
    println!(
        "Log File:        {}",
        bugtrail_core::logging::current_log_file_path().display()
    );

    println!();
    if collector.is_ready() {
        println!("Status: Ready to deliver");
    } else {
        println!("Status: Not ready (missing required configuration)");
        println!();
        println!("Collector is not configured. Add to config.toml:");
        println!();
        println!("  [collector]");
        println!("  server_url = \"https://collector.example.com/api/v1/reports.json\"");
        println!("  api_key = \"bt_live_xxxxxxxxxxxx\"");
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_submit(
    config: Config,
    what_happened: &str,
    attachments: Vec<PathBuf>,
    attributes: Vec<(String, String)>,
    policy: Option<RetryPolicy>,
    invocation: InvocationMethod,
    email: Option<String>,
) -> Result<()> {
    if config.collector.server_url.is_none() {
        bail!("Collector is not configured. Run 'bugtrail status' for details.");
    }

    let policy = policy.unwrap_or(config.delivery.policy);
    let identity = email.map(Identity::Email);
    let reporter = BugReporter::new(config).context("failed to start reporter")?;

    let mut context = reporter.begin_capture(invocation);
    for path in attachments {
        if !path.exists() {
            reporter.on_flow_finished();
            bail!("attachment not found: {}", path.display());
        }
        context.add_attachment(Attachment::from_file(path));
    }
    for (key, value) in attributes {
        context.put_attribute(key, Some(typed_attribute(&value)));
    }

    let result = reporter.finalize_and_submit(&context, Some(what_happened), identity.as_ref(), Some(policy));
    reporter.on_flow_finished();
    let queue_path = reporter.queue().path().to_path_buf();

    // Wait for the retry worker to finish any pass the submission started
    reporter.shutdown();

    match result.context("failed to submit report")? {
        Some(SubmitOutcome::Delivered(response)) => {
            println!("Report delivered (HTTP {})", response.status);
            if let Some(body) = response.body {
                println!("{}", serde_json::to_string_pretty(&body)?);
            }
        }
        Some(SubmitOutcome::Failed { error, .. }) => {
            bail!("Submission failed: {}", error);
        }
        None if policy == RetryPolicy::Automatic => {
            println!("Report scheduled for delivery. Run 'bugtrail run-jobs' to deliver now.");
        }
        None => {
            let remaining = ReportQueue::new(queue_path).len()?;
            if remaining == 0 {
                println!("Report delivered via queue");
            } else {
                println!("Report queued ({} pending)", remaining);
            }
        }
    }

    Ok(())
}

fn cmd_flush(config: &Config) -> Result<()> {
    // Stored documents carry their own identity; only the endpoint is needed
    if config.collector.server_url.is_none() {
        println!("Collector is not configured. Run 'bugtrail status' for details.");
        return Ok(());
    }

    let queue = Arc::new(ReportQueue::new(config.delivery.queue_path()));
    if queue.is_empty()? {
        println!("No queued reports.");
        return Ok(());
    }

    let transport = Arc::new(HttpTransport::new(&config.collector).context("failed to create transport")?);
    println!("Flushing {} queued report(s)...", queue.len()?);

    let summary = RetryWorker::new(Arc::clone(&queue), transport).process_pass();

    println!();
    println!("Delivered:  {}", summary.delivered);
    println!("Retained:   {}", summary.retained);
    println!("Dropped:    {}", summary.dropped);
    println!("Corrupt:    {}", summary.corrupt);

    Ok(())
}

fn cmd_run_jobs(config: &Config) -> Result<()> {
    // Stored documents carry their own identity; only the endpoint is needed
    if config.collector.server_url.is_none() {
        println!("Collector is not configured. Run 'bugtrail status' for details.");
        return Ok(());
    }

    let scheduler = SpoolScheduler::new(config.delivery.jobs_dir());
    let pending = scheduler.pending_count()?;
    if pending == 0 {
        println!("No pending jobs.");
        return Ok(());
    }

    let transport = HttpTransport::new(&config.collector).context("failed to create transport")?;
    println!("Running {} job(s)...", pending);

    let summary = scheduler.run_pending(&transport)?;

    println!();
    println!("Delivered:   {}", summary.delivered);
    println!("Rescheduled: {}", summary.rescheduled);
    println!("Dropped:     {}", summary.dropped);
    println!("Corrupt:     {}", summary.corrupt);

    Ok(())
}
