//! Append-file transport
//!
//! Serializes each envelope as one newline-delimited JSON line and appends
//! it to a local file for offline processing or replay. Appends are
//! append-only and guarded by an exclusive scoped lock, so concurrent
//! callers never interleave partial lines. Here acceptance *is* delivery:
//! append failures surface synchronously as well as through the handler.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::debug;

use super::Reporter;
use crate::envelope::Envelope;
use crate::error::{BeaconError, Result};

pub(crate) struct AppendFileTransport {
    file: Mutex<Option<File>>,
    path: PathBuf,
    reporter: Arc<Reporter>,
}

impl AppendFileTransport {
    pub fn new(path: &Path, reporter: Arc<Reporter>) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        debug!(path = %path.display(), "file transport opened");

        Ok(Self {
            file: Mutex::new(Some(file)),
            path: path.to_path_buf(),
            reporter,
        })
    }

    /// Serialize and append one envelope as a single line
    pub fn accept(&self, envelope: &Envelope) -> Result<()> {
        let mut line = match serde_json::to_string(envelope) {
            Ok(line) => line,
            Err(e) => {
                let err = BeaconError::Serialization(e);
                self.reporter.report(&err);
                return Err(err);
            }
        };
        line.push('\n');

        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        let Some(file) = guard.as_mut() else {
            drop(guard);
            let err = BeaconError::Closed;
            self.reporter.report(&err);
            return Err(err);
        };

        // One write call per line keeps concurrent appends whole.
        if let Err(e) = file.write_all(line.as_bytes()) {
            drop(guard);
            let err = BeaconError::Io(e);
            self.reporter.report(&err);
            return Err(err);
        }

        Ok(())
    }

    /// Sync appended lines to disk
    pub fn flush(&self) {
        let guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = guard.as_ref() {
            if let Err(e) = file.sync_all() {
                drop(guard);
                self.reporter.report(&BeaconError::Io(e));
            }
        }
    }

    /// Sync, then release the file handle; later accepts fail
    pub fn close(&self) {
        let mut guard = self.file.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = guard.take() {
            drop(guard);
            if let Err(e) = file.sync_all() {
                self.reporter.report(&BeaconError::Io(e));
            }
            debug!(path = %self.path.display(), "file transport closed");
        }
    }
}
