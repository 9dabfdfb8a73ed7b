//! Binary attachments (screenshots, logs, recordings) carried by a report
//!
//! The reporter never looks inside an attachment. It only needs the filename,
//! the MIME type and, at serialization time, the raw bytes.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};

static NEXT_ATTACHMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one attachment instance.
///
/// Allocated when the attachment is constructed, so two attachments with
/// byte-identical payloads still have distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttachmentId(u64);

impl AttachmentId {
    fn next() -> Self {
        AttachmentId(NEXT_ATTACHMENT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "attachment-{}", self.0)
    }
}

/// Where an attachment's bytes live
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Already decoded and held in memory
    Bytes(Vec<u8>),
    /// Read lazily from disk when the report is serialized
    File(PathBuf),
}

impl Payload {
    /// Produce the raw bytes for this payload
    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        match self {
            Payload::Bytes(bytes) => Ok(bytes.clone()),
            Payload::File(path) => std::fs::read(path),
        }
    }
}

/// An attachment as it appears in the `attachments` array on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedAttachment {
    pub filename: String,
    pub mime_type: String,
    pub base64_attachment_data: String,
}

/// A named binary payload with a MIME type
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    id: AttachmentId,
    filename: String,
    mime_type: String,
    payload: Payload,
}

impl Attachment {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: AttachmentId::next(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            payload,
        }
    }

    /// In-memory attachment
    pub fn from_bytes(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self::new(filename, mime_type, Payload::Bytes(bytes))
    }

    /// File-backed attachment. Filename and MIME type are derived from the path.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "attachment".to_string());
        let mime_type = mime_type_for_path(&path);
        Self::new(filename, mime_type, Payload::File(path))
    }

    pub fn id(&self) -> AttachmentId {
        self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Read the raw bytes, attributing IO failures to this attachment
    pub fn read_bytes(&self) -> Result<Vec<u8>> {
        self.payload.read().map_err(|source| Error::Attachment {
            filename: self.filename.clone(),
            source,
        })
    }

    /// Encode this attachment for the wire
    pub fn to_serializable(&self) -> Result<SerializedAttachment> {
        let bytes = self.read_bytes()?;
        Ok(SerializedAttachment {
            filename: self.filename.clone(),
            mime_type: self.mime_type.clone(),
            base64_attachment_data: STANDARD.encode(bytes),
        })
    }
}

/// Best-effort MIME type from a file extension
pub fn mime_type_for_path(path: &Path) -> String {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("json") => "application/json",
        Some("txt") | Some("log") => "text/plain",
        _ => "application/octet-stream",
    }
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_identical_payloads_have_distinct_ids() {
        let a = Attachment::from_bytes("a.png", "image/png", vec![1, 2, 3]);
        let b = Attachment::from_bytes("a.png", "image/png", vec![1, 2, 3]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_in_memory_serialization() {
        let attachment = Attachment::from_bytes("note.txt", "text/plain", b"hello".to_vec());
        let serialized = attachment.to_serializable().unwrap();

        assert_eq!(serialized.filename, "note.txt");
        assert_eq!(serialized.mime_type, "text/plain");
        assert_eq!(serialized.base64_attachment_data, "aGVsbG8=");
    }

    #[test]
    fn test_file_backed_reads_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("screen.png");
        let attachment = Attachment::from_file(&path);

        // File does not exist yet; construction must not touch the disk
        assert_eq!(attachment.filename(), "screen.png");
        assert_eq!(attachment.mime_type(), "image/png");

        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(&[0xff, 0x00]).unwrap();
        drop(file);

        let serialized = attachment.to_serializable().unwrap();
        assert_eq!(serialized.base64_attachment_data, "/wA=");
    }

    #[test]
    fn test_missing_file_reports_attachment_error() {
        let attachment = Attachment::from_file("/nonexistent/bugtrail/console.log");
        let err = attachment.to_serializable().unwrap_err();
        assert!(matches!(err, Error::Attachment { ref filename, .. } if filename == "console.log"));
    }

    #[test]
    fn test_mime_type_for_path() {
        assert_eq!(mime_type_for_path(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_type_for_path(Path::new("trace.log")), "text/plain");
        assert_eq!(
            mime_type_for_path(Path::new("blob")),
            "application/octet-stream"
        );
    }
}
