//! Value objects carried by a bug report
//!
//! - [`Attribute`] / [`AttributeMap`]: typed custom key/value pairs
//! - [`Attachment`]: a named binary payload, in memory or file-backed

mod attachment;
mod attribute;

pub use attachment::{mime_type_for_path, Attachment, AttachmentId, Payload, SerializedAttachment};
pub use attribute::{Attribute, AttributeFlags, AttributeMap, AttributeType, SUMMARY_ATTRIBUTE};
