//! Submit-ready reports and their wire format
//!
//! A [`Report`] is the frozen projection of a [`BugContext`](crate::context::BugContext).
//! It carries the serialized JSON document that is either POSTed directly or
//! written to durable storage for later delivery.
//!
//! ## Wire format
//!
//! ```text
//! { "report": { "what_happened", "sdk_version", ..., "attachments": [..], "attributes": {..} },
//!   "app":    { "bundle_identifier", "bundle_name", ..., "platform" },
//!   "api_key" | "email": "<identity>" }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::AppConfig;
use crate::model::SerializedAttachment;

/// Identity the collector routes a report by
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Identity {
    ApiKey(String),
    Email(String),
}

impl Identity {
    pub fn value(&self) -> &str {
        match self {
            Identity::ApiKey(value) | Identity::Email(value) => value,
        }
    }

    pub fn is_blank(&self) -> bool {
        self.value().trim().is_empty()
    }
}

/// Top-level document POSTed to the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub report: ReportBody,
    pub app: AppBody,
    #[serde(flatten)]
    pub identity: Identity,
}

/// The `report` object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportBody {
    pub what_happened: Option<String>,
    pub sdk_version: String,
    pub sdk_name: String,
    pub device_manufacturer: Option<String>,
    pub device_model: Option<String>,
    pub device_brand: Option<String>,
    pub operating_system_version: Option<String>,
    pub bundle_version: String,
    pub bundle_short_version: String,
    pub user_email: Option<String>,
    pub user_identifier: Option<String>,
    pub total_capacity_bytes: Option<u64>,
    pub free_capacity_bytes: Option<u64>,
    pub total_memory_bytes: Option<u64>,
    pub free_memory_bytes: Option<u64>,
    pub battery_level: Option<f32>,
    pub carrier_name: Option<String>,
    pub wifi_connected: Option<bool>,
    pub locale: Option<String>,
    pub invoked_at: DateTime<Utc>,
    pub invocation_method: String,
    pub submission_attempts: u32,
    pub attachments: Vec<SerializedAttachment>,
    pub attributes: BTreeMap<String, WireAttribute>,
}

/// One entry of the `attributes` object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireAttribute {
    pub attribute_type: u8,
    pub attribute_value: String,
}

/// The `app` object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppBody {
    pub bundle_identifier: String,
    pub bundle_name: String,
    pub bundle_version: String,
    pub bundle_short_version: String,
    pub platform: String,
}

impl From<&AppConfig> for AppBody {
    fn from(app: &AppConfig) -> Self {
        Self {
            bundle_identifier: app.bundle_identifier.clone(),
            bundle_name: app.bundle_name.clone(),
            bundle_version: app.bundle_version.clone(),
            bundle_short_version: app.bundle_short_version.clone(),
            platform: app.platform.clone(),
        }
    }
}

/// An immutable, submit-ready report
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    identity: Identity,
    what_happened: Option<String>,
    json: String,
}

impl Report {
    pub(crate) fn new(identity: Identity, what_happened: Option<String>, json: String) -> Self {
        Self {
            identity,
            what_happened,
            json,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn what_happened(&self) -> Option<&str> {
        self.what_happened.as_deref()
    }

    /// The serialized document, always a single line
    pub fn json(&self) -> &str {
        &self.json
    }

    pub fn into_json(self) -> String {
        self.json
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_keys() {
        let identity: Identity =
            serde_json::from_value(serde_json::json!({ "email": "qa@example.com" })).unwrap();
        assert_eq!(identity, Identity::Email("qa@example.com".to_string()));

        let value = serde_json::to_value(Identity::ApiKey("k".to_string())).unwrap();
        assert_eq!(value, serde_json::json!({ "api_key": "k" }));
    }

    #[test]
    fn test_app_body_from_config() {
        let app = AppConfig {
            bundle_identifier: "com.example.notes".to_string(),
            ..Default::default()
        };
        let body = AppBody::from(&app);
        assert_eq!(body.bundle_identifier, "com.example.notes");
        assert_eq!(body.platform, std::env::consts::OS);
    }

    #[test]
    fn test_blank_identity() {
        assert!(Identity::ApiKey("  ".to_string()).is_blank());
        assert!(!Identity::Email("qa@example.com".to_string()).is_blank());
    }
}
