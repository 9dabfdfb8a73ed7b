//! Point-in-time device, app and session facts
//!
//! An [`EnvironmentSnapshot`] is taken exactly once, when capture is invoked.
//! A report that sits in the durable queue for hours still describes the
//! device as it was at the moment the user asked to report a bug.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name reported in `sdk_name`
pub const SDK_NAME: &str = "bugtrail";

/// Version reported in `sdk_version`
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Invocation
// ============================================

/// The gesture or event that triggered capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationMethod {
    Shake,
    Screenshot,
    Button,
    ScreenRecording,
    Manual,
}

impl InvocationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationMethod::Shake => "shake",
            InvocationMethod::Screenshot => "screenshot",
            InvocationMethod::Button => "button",
            InvocationMethod::ScreenRecording => "screen_recording",
            InvocationMethod::Manual => "manual",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shake" => Some(InvocationMethod::Shake),
            "screenshot" => Some(InvocationMethod::Screenshot),
            "button" => Some(InvocationMethod::Button),
            "screen_recording" | "screen-recording" => Some(InvocationMethod::ScreenRecording),
            "manual" => Some(InvocationMethod::Manual),
            _ => None,
        }
    }
}

// ============================================
// Device facts
// ============================================

/// Device facts gathered by a [`DeviceInspector`]. Unknown values stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceFacts {
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub brand: Option<String>,
    pub operating_system_version: Option<String>,
    pub total_capacity_bytes: Option<u64>,
    pub free_capacity_bytes: Option<u64>,
    pub total_memory_bytes: Option<u64>,
    pub free_memory_bytes: Option<u64>,
    /// Battery charge in `0.0..=1.0`
    pub battery_level: Option<f32>,
    pub carrier_name: Option<String>,
    pub wifi_connected: Option<bool>,
    pub locale: Option<String>,
}

/// Source of device facts. Hosts with richer platform APIs supply their own.
pub trait DeviceInspector: Send + Sync {
    fn inspect(&self) -> DeviceFacts;
}

/// Inspector using what the standard library and the OS expose portably
#[derive(Debug, Default, Clone, Copy)]
pub struct HostInspector;

impl DeviceInspector for HostInspector {
    fn inspect(&self) -> DeviceFacts {
        let (total_memory_bytes, free_memory_bytes) = read_memory_info();
        DeviceFacts {
            operating_system_version: Some(format!(
                "{} {}",
                std::env::consts::OS,
                std::env::consts::ARCH
            )),
            total_memory_bytes,
            free_memory_bytes,
            locale: sys_locale::get_locale(),
            ..Default::default()
        }
    }
}

#[cfg(target_os = "linux")]
fn read_memory_info() -> (Option<u64>, Option<u64>) {
    match std::fs::read_to_string("/proc/meminfo") {
        Ok(content) => parse_meminfo(&content),
        Err(e) => {
            tracing::debug!(error = %e, "Could not read /proc/meminfo");
            (None, None)
        }
    }
}

#[cfg(not(target_os = "linux"))]
fn read_memory_info() -> (Option<u64>, Option<u64>) {
    (None, None)
}

/// Extract `MemTotal` and `MemAvailable` (in bytes) from `/proc/meminfo` text
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo(content: &str) -> (Option<u64>, Option<u64>) {
    let field = |name: &str| {
        content.lines().find_map(|line| {
            let rest = line.strip_prefix(name)?.strip_prefix(':')?;
            let kib: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
            Some(kib * 1024)
        })
    };
    (field("MemTotal"), field("MemAvailable"))
}

// ============================================
// Session
// ============================================

/// Facts about the current user, set by the host application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub user_email: Option<String>,
    pub user_identifier: Option<String>,
}

// ============================================
// Snapshot
// ============================================

/// Immutable capture of device and session state at invocation time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    device: DeviceFacts,
    session: SessionSnapshot,
    sdk_name: String,
    sdk_version: String,
    invocation_method: InvocationMethod,
    invoked_at: DateTime<Utc>,
}

impl EnvironmentSnapshot {
    /// Capture now, using the given inspector
    pub fn capture(
        inspector: &dyn DeviceInspector,
        session: SessionSnapshot,
        invocation_method: InvocationMethod,
    ) -> Self {
        Self::new(inspector.inspect(), session, invocation_method, Utc::now())
    }

    /// Build a snapshot from already-gathered facts
    pub fn new(
        device: DeviceFacts,
        session: SessionSnapshot,
        invocation_method: InvocationMethod,
        invoked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            device,
            session,
            sdk_name: SDK_NAME.to_string(),
            sdk_version: SDK_VERSION.to_string(),
            invocation_method,
            invoked_at,
        }
    }

    pub fn device(&self) -> &DeviceFacts {
        &self.device
    }

    pub fn session(&self) -> &SessionSnapshot {
        &self.session
    }

    pub fn sdk_name(&self) -> &str {
        &self.sdk_name
    }

    pub fn sdk_version(&self) -> &str {
        &self.sdk_version
    }

    pub fn invocation_method(&self) -> InvocationMethod {
        self.invocation_method
    }

    pub fn invoked_at(&self) -> DateTime<Utc> {
        self.invoked_at
    }
}
