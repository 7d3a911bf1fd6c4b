//! Whole-file JSON snapshots written through a temporary file and rename.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Snapshot target of one record store. A store without a path keeps
/// everything in memory.
#[derive(Debug, Default)]
pub struct Snapshot {
    path: Option<PathBuf>,
    write_lock: Mutex<()>,
}

impl Snapshot {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Records from the last snapshot, or none if there is no file yet.
    pub fn load<T: DeserializeOwned>(&self) -> io::Result<Vec<T>> {
        let Some(path) = &self.path else {
            return Ok(Vec::new());
        };
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let records: Vec<T> = serde_json::from_reader(reader)?;
        tracing::info!(count = records.len(), path = ?path, "Loaded snapshot");
        Ok(records)
    }

    /// Replace the snapshot with the records `collect` returns.
    ///
    /// `collect` runs under the write lock, so the last writer to finish
    /// always holds the newest state and an older collection can never
    /// overwrite a newer file.
    pub fn write_with<T, F>(&self, collect: F) -> io::Result<()>
    where
        T: Serialize,
        F: FnOnce() -> Vec<T>,
    {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let records = collect();

        let tmp = path.with_extension("tmp");
        let mut writer = BufWriter::new(File::create(&tmp)?);
        serde_json::to_writer(&mut writer, &records)?;
        writer.flush()?;
        std::fs::rename(&tmp, path)
    }
}
