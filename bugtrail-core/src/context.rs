//! The mutable report draft and its freeze into a [`Report`]

use std::collections::BTreeMap;

use crate::environment::EnvironmentSnapshot;
use crate::error::{Error, Result};
use crate::model::{Attachment, AttachmentId, Attribute, AttributeFlags, AttributeMap, SUMMARY_ATTRIBUTE};
use crate::report::{AppBody, Identity, Report, ReportBody, ReportDocument, WireAttribute};

/// Attempt count stamped on a freshly frozen report
const INITIAL_SUBMISSION_ATTEMPTS: u32 = 1;

/// A report draft, exclusively owned by the capture flow that created it.
///
/// The environment snapshot is fixed at construction. Attachments and
/// attributes are edited freely until [`BugContext::freeze`].
#[derive(Debug, Clone)]
pub struct BugContext {
    environment: EnvironmentSnapshot,
    app: AppBody,
    attachments: Vec<Attachment>,
    attributes: AttributeMap,
}

impl BugContext {
    pub fn new(environment: EnvironmentSnapshot, app: AppBody) -> Self {
        Self {
            environment,
            app,
            attachments: Vec::new(),
            attributes: AttributeMap::new(),
        }
    }

    pub fn environment(&self) -> &EnvironmentSnapshot {
        &self.environment
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    pub fn attachment(&self, id: AttachmentId) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.id() == id)
    }

    pub fn attributes(&self) -> &AttributeMap {
        &self.attributes
    }

    /// Append an attachment, returning its identity
    pub fn add_attachment(&mut self, attachment: Attachment) -> AttachmentId {
        let id = attachment.id();
        self.attachments.push(attachment);
        id
    }

    /// Swap in an edited version of an attachment, keeping its position.
    ///
    /// Returns the attachment that was replaced.
    pub fn replace_attachment(&mut self, id: AttachmentId, replacement: Attachment) -> Result<Attachment> {
        let slot = self
            .attachments
            .iter_mut()
            .find(|a| a.id() == id)
            .ok_or_else(|| Error::Validation(format!("no attachment with id {}", id)))?;
        Ok(std::mem::replace(slot, replacement))
    }

    /// Set an attribute. `None` removes it.
    pub fn put_attribute(&mut self, key: impl Into<String>, attribute: Option<Attribute>) {
        self.attributes.put(key, attribute);
    }

    /// Store the "what happened" text as the internal summary attribute
    pub fn set_summary(&mut self, text: impl Into<String>) {
        let attribute = Attribute::string(text)
            .with_flags(AttributeFlags::SYSTEM | AttributeFlags::INTERNAL);
        self.attributes.put(SUMMARY_ATTRIBUTE, Some(attribute));
    }

    /// Freeze the draft into a submit-ready report.
    ///
    /// `what_happened` takes precedence over the summary attribute. Fails with
    /// [`Error::Validation`] when no identity is available, or when the draft
    /// has no description, attachment or custom attribute. Serialization is
    /// deterministic: freezing the same draft twice yields identical JSON.
    pub fn freeze(&self, identity: Option<&Identity>, what_happened: Option<&str>) -> Result<Report> {
        let identity = identity
            .filter(|identity| !identity.is_blank())
            .cloned()
            .ok_or_else(|| {
                Error::Validation(
                    "an API key or email address is required to submit a report".to_string(),
                )
            })?;

        let what_happened = what_happened
            .map(str::to_string)
            .or_else(|| {
                self.attributes
                    .get(SUMMARY_ATTRIBUTE)
                    .map(|a| a.value().to_string())
            })
            .filter(|text| !text.trim().is_empty());

        let has_custom_attributes = self
            .attributes
            .iter()
            .any(|(key, _)| key.as_str() != SUMMARY_ATTRIBUTE);
        if what_happened.is_none() && self.attachments.is_empty() && !has_custom_attributes {
            return Err(Error::Validation(
                "a report needs a description, an attachment or an attribute".to_string(),
            ));
        }

        let attachments = self
            .attachments
            .iter()
            .map(Attachment::to_serializable)
            .collect::<Result<Vec<_>>>()?;

        let attributes: BTreeMap<String, WireAttribute> = self
            .attributes
            .sorted()
            .into_iter()
            .filter(|(key, _)| *key != SUMMARY_ATTRIBUTE)
            .map(|(key, attribute)| {
                (
                    key.to_string(),
                    WireAttribute {
                        attribute_type: attribute.value_type().code(),
                        attribute_value: attribute.value().to_string(),
                    },
                )
            })
            .collect();

        let env = &self.environment;
        let device = env.device();
        let session = env.session();

        let document = ReportDocument {
            report: ReportBody {
                what_happened: what_happened.clone(),
                sdk_version: env.sdk_version().to_string(),
                sdk_name: env.sdk_name().to_string(),
                device_manufacturer: device.manufacturer.clone(),
                device_model: device.model.clone(),
                device_brand: device.brand.clone(),
                operating_system_version: device.operating_system_version.clone(),
                bundle_version: self.app.bundle_version.clone(),
                bundle_short_version: self.app.bundle_short_version.clone(),
                user_email: session.user_email.clone(),
                user_identifier: session.user_identifier.clone(),
                total_capacity_bytes: device.total_capacity_bytes,
                free_capacity_bytes: device.free_capacity_bytes,
                total_memory_bytes: device.total_memory_bytes,
                free_memory_bytes: device.free_memory_bytes,
                battery_level: device.battery_level,
                carrier_name: device.carrier_name.clone(),
                wifi_connected: device.wifi_connected,
                locale: device.locale.clone(),
                invoked_at: env.invoked_at(),
                invocation_method: env.invocation_method().as_str().to_string(),
                submission_attempts: INITIAL_SUBMISSION_ATTEMPTS,
                attachments,
                attributes,
            },
            app: self.app.clone(),
            identity: identity.clone(),
        };

        let json = serde_json::to_string(&document)?;
        Ok(Report::new(identity, what_happened, json))
    }
}
