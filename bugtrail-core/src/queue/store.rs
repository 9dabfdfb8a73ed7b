//! Newline-delimited queue file
//!
//! One serialized report per line, UTF-8. A missing file is an empty queue,
//! and an emptied queue deletes its file.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Durable FIFO of serialized reports backed by a single file.
///
/// Appends and compaction are serialized by an in-process lock, so a report
/// appended while a pass is in flight survives that pass's compaction.
#[derive(Debug)]
pub struct ReportQueue {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ReportQueue {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append one document and flush it to disk
    pub fn append(&self, document: &str) -> Result<()> {
        if document.contains('\n') {
            return Err(Error::Validation(
                "queued documents must be a single line".to_string(),
            ));
        }

        let _guard = self.lock();

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", document)?;
        file.sync_data()?;

        tracing::debug!(path = %self.path.display(), "Appended report to queue");
        Ok(())
    }

    /// Read all entries in file order, exactly as stored
    pub fn load_raw(&self) -> Result<Vec<Vec<u8>>> {
        let _guard = self.lock();
        self.read_entries()
    }

    /// Read all entries in file order as text.
    ///
    /// Lines that are not valid UTF-8 are left out; the retry worker drops
    /// them as corrupt.
    pub fn load(&self) -> Result<Vec<String>> {
        Ok(self
            .load_raw()?
            .into_iter()
            .filter_map(|entry| String::from_utf8(entry).ok())
            .collect())
    }

    /// Number of entries currently stored, including unreadable ones
    pub fn len(&self) -> Result<usize> {
        Ok(self.load_raw()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Rewrite the file after a pass over the first `keep.len()` entries.
    ///
    /// Entries whose flag is `false` are removed. Entries appended after the
    /// pass loaded the file are kept, after the retained ones. Deletes the
    /// file when nothing remains. Returns the number of entries left.
    pub fn compact(&self, keep: &[bool]) -> Result<usize> {
        let _guard = self.lock();

        let current = self.read_entries()?;
        let processed = keep.len().min(current.len());

        let remaining: Vec<&[u8]> = current[..processed]
            .iter()
            .zip(keep)
            .filter(|(_, keep)| **keep)
            .map(|(entry, _)| entry.as_slice())
            .chain(current[processed..].iter().map(Vec::as_slice))
            .collect();

        if remaining.is_empty() {
            match fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(0);
        }

        let tmp_path = self.path.with_extension("jsonl.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            for entry in &remaining {
                file.write_all(entry)?;
                file.write_all(b"\n")?;
            }
            file.sync_data()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        Ok(remaining.len())
    }

    /// Split the file into lines without decoding them
    fn read_entries(&self) -> Result<Vec<Vec<u8>>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        Ok(bytes
            .split(|b| *b == b'\n')
            .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
            .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
            .map(<[u8]>::to_vec)
            .collect())
    }
}
